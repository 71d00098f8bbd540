//! AES-256-GCM authenticated encryption.
//!
//! Every call generates a fresh random IV; callers never supply one. Tag
//! verification is handled by the `aes-gcm` crate's constant-time
//! comparison internally — we never compare tags ourselves.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Key, Nonce,
};
use thiserror::Error;

use crate::kind::ErrorKind;

pub const AEAD_KEY_LEN: usize = 32;
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum AeadError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("authentication failed: tag mismatch or tampered ciphertext")]
    AuthFailure,
    #[error("invalid key length: expected {AEAD_KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("invalid iv length: expected {IV_LEN} bytes, got {0}")]
    InvalidIvLength(usize),
}

impl AeadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AeadError::AuthFailure => ErrorKind::AuthFailure,
            AeadError::InvalidKeyLength(_) | AeadError::InvalidIvLength(_) => ErrorKind::Input,
            AeadError::EncryptionFailed(_) => ErrorKind::Fatal,
        }
    }
}

/// Encrypt `plaintext` under `key` with AES-256-GCM. `aad` is authenticated
/// but not encrypted (pass `None` when there is none). Returns
/// `(ciphertext, iv, tag)` with the tag split from the ciphertext so callers
/// can lay fields out explicitly (the fragment codec needs this — see
/// `echolock-fragment`).
pub fn aead_encrypt(
    key: &[u8],
    plaintext: &[u8],
    aad: Option<&[u8]>,
) -> Result<(Vec<u8>, [u8; IV_LEN], [u8; TAG_LEN]), AeadError> {
    if key.len() != AEAD_KEY_LEN {
        return Err(AeadError::InvalidKeyLength(key.len()));
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let payload = Payload {
        msg: plaintext,
        aad: aad.unwrap_or(&[]),
    };

    let mut sealed = cipher
        .encrypt(&nonce, payload)
        .map_err(|e| AeadError::EncryptionFailed(e.to_string()))?;

    // aes-gcm appends the 16-byte tag to the ciphertext; split it off so the
    // caller can store ciphertext and tag as distinct framed fields.
    let tag_start = sealed.len() - TAG_LEN;
    let tag_bytes = sealed.split_off(tag_start);

    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&nonce);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&tag_bytes);

    Ok((sealed, iv, tag))
}

/// Decrypt a ciphertext produced by [`aead_encrypt`]. Any tampering with
/// `ciphertext`, `iv`, `tag`, `aad` or a wrong `key` surfaces as
/// [`AeadError::AuthFailure`] — never a partial or garbage plaintext.
pub fn aead_decrypt(
    key: &[u8],
    ciphertext: &[u8],
    iv: &[u8],
    tag: &[u8],
    aad: Option<&[u8]>,
) -> Result<Vec<u8>, AeadError> {
    if key.len() != AEAD_KEY_LEN {
        return Err(AeadError::InvalidKeyLength(key.len()));
    }
    if iv.len() != IV_LEN {
        return Err(AeadError::InvalidIvLength(iv.len()));
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(iv);

    let mut sealed = Vec::with_capacity(ciphertext.len() + tag.len());
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);

    let payload = Payload {
        msg: &sealed,
        aad: aad.unwrap_or(&[]),
    };

    cipher
        .decrypt(nonce, payload)
        .map_err(|_| AeadError::AuthFailure)
}
