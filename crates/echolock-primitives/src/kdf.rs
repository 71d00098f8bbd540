//! Key derivation: PBKDF2-HMAC-SHA-256 for password-based keys, HKDF-SHA-256
//! for domain-separated key splitting from existing key material.

use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;

use crate::kind::ErrorKind;

/// OWASP-recommended floor for PBKDF2-HMAC-SHA-256 as of 2023+. Configurable
/// upward via `PBKDF2_ITERATIONS` (see `echolock-server::config`), never
/// downward.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 600_000;

pub const MIN_SALT_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum KdfError {
    #[error("salt too short: need at least {MIN_SALT_LEN} bytes, got {0}")]
    SaltTooShort(usize),
    #[error("iteration count below floor: need at least {DEFAULT_PBKDF2_ITERATIONS}, got {0}")]
    IterationsTooLow(u32),
    #[error("HKDF expand failed: output length too large for the hash function")]
    HkdfExpandFailed,
}

impl KdfError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Input
    }
}

/// Derive a 32-byte key from a password using PBKDF2-HMAC-SHA-256.
pub fn kdf_password(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<[u8; 32], KdfError> {
    if salt.len() < MIN_SALT_LEN {
        return Err(KdfError::SaltTooShort(salt.len()));
    }
    if iterations < DEFAULT_PBKDF2_ITERATIONS {
        return Err(KdfError::IterationsTooLow(iterations));
    }

    let mut out = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    Ok(out)
}

/// Derive `len` bytes of key material from `ikm` using HKDF-SHA-256, bound
/// to a domain-separation `info` label. Used throughout the switch
/// lifecycle to split a message key into independent fragment-HMAC and
/// (in the passwordless path) fragment-encryption keys without ever
/// reusing the same bytes for two purposes.
pub fn hkdf_derive(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    len: usize,
) -> Result<Vec<u8>, KdfError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut out = vec![0u8; len];
    hk.expand(info, &mut out)
        .map_err(|_| KdfError::HkdfExpandFailed)?;
    Ok(out)
}
