//! HMAC-SHA-256, with constant-time verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

pub const MAC_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA-256(key, msg).
pub fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; MAC_LEN] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(msg);
    let result = mac.finalize().into_bytes();
    let mut out = [0u8; MAC_LEN];
    out.copy_from_slice(&result);
    out
}

/// Verify a MAC in constant time. Never short-circuits on the first
/// mismatched byte.
pub fn verify_hmac(key: &[u8], msg: &[u8], expected: &[u8]) -> bool {
    if expected.len() != MAC_LEN {
        return false;
    }
    let computed = hmac_sha256(key, msg);
    computed.ct_eq(expected).into()
}
