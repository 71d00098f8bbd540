//! Share splitting and reconstruction.

use echolock_primitives::{kind::ErrorKind, mac};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroize;

use crate::gf256::{lagrange_interpolate, poly_eval};

/// Shares carry a fixed-size 32-byte payload: the message key.
pub const SHARE_LEN: usize = 32;

/// Threshold floor from the zero-share-attack mitigation: a `k < 3`
/// scheme plus HMAC authentication would still be information-theoretically
/// sound, but the floor keeps a single custodian from unilaterally holding
/// a usable quorum alongside one accomplice.
pub const MIN_THRESHOLD: u8 = 3;

#[derive(Error, Debug)]
pub enum ShareError {
    #[error("threshold must be at least {MIN_THRESHOLD}, got {0}")]
    ThresholdTooLow(u8),
    #[error("threshold {k} exceeds total share count {n}")]
    ThresholdExceedsTotal { k: u8, n: u8 },
    #[error("secret must be exactly {SHARE_LEN} bytes, got {0}")]
    InvalidSecretLength(usize),
    #[error("share {0} failed HMAC verification")]
    InvalidShare(u8),
    #[error("duplicate share index {0}")]
    DuplicateIndex(u8),
    #[error("insufficient shares: got {got}, need {needed}")]
    InsufficientShares { got: usize, needed: usize },
}

impl ShareError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShareError::ThresholdTooLow(_)
            | ShareError::ThresholdExceedsTotal { .. }
            | ShareError::InvalidSecretLength(_) => ErrorKind::Input,
            ShareError::InvalidShare(_) | ShareError::DuplicateIndex(_) => ErrorKind::AuthFailure,
            ShareError::InsufficientShares { .. } => ErrorKind::Quorum,
        }
    }
}

/// One share of a split secret, HMAC-bound to its own index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedShare {
    /// 1-based share index, 1..=n.
    pub index: u8,
    pub share_bytes: [u8; SHARE_LEN],
    pub hmac: [u8; mac::MAC_LEN],
}

impl AuthenticatedShare {
    fn mac_input(index: u8, share_bytes: &[u8; SHARE_LEN]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + SHARE_LEN);
        buf.push(index);
        buf.extend_from_slice(share_bytes);
        buf
    }

    fn new(index: u8, share_bytes: [u8; SHARE_LEN], hmac_key: &[u8]) -> Self {
        let hmac = mac::hmac_sha256(hmac_key, &Self::mac_input(index, &share_bytes));
        Self {
            index,
            share_bytes,
            hmac,
        }
    }

    fn verify(&self, hmac_key: &[u8]) -> bool {
        mac::verify_hmac(hmac_key, &Self::mac_input(self.index, &self.share_bytes), &self.hmac)
    }
}

impl Drop for AuthenticatedShare {
    fn drop(&mut self) {
        self.share_bytes.zeroize();
    }
}

/// Split `secret` (exactly [`SHARE_LEN`] bytes) into `n` authenticated
/// shares, any `k` of which reconstruct it. `3 <= k <= n <= 255`.
pub fn split(
    secret: &[u8],
    n: u8,
    k: u8,
    hmac_key: &[u8],
) -> Result<Vec<AuthenticatedShare>, ShareError> {
    if secret.len() != SHARE_LEN {
        return Err(ShareError::InvalidSecretLength(secret.len()));
    }
    if k < MIN_THRESHOLD {
        return Err(ShareError::ThresholdTooLow(k));
    }
    if k > n {
        return Err(ShareError::ThresholdExceedsTotal { k, n });
    }

    let mut rng = rand::thread_rng();
    let mut share_bytes: Vec<[u8; SHARE_LEN]> = vec![[0u8; SHARE_LEN]; n as usize];

    for byte_idx in 0..SHARE_LEN {
        let mut coefficients = vec![secret[byte_idx]];
        for _ in 1..k {
            let mut b = [0u8];
            rng.fill_bytes(&mut b);
            coefficients.push(b[0]);
        }

        for (i, bytes) in share_bytes.iter_mut().enumerate() {
            let x = (i + 1) as u8;
            bytes[byte_idx] = poly_eval(&coefficients, x);
        }
    }

    let shares = share_bytes
        .into_iter()
        .enumerate()
        .map(|(i, bytes)| AuthenticatedShare::new((i + 1) as u8, bytes, hmac_key))
        .collect();

    Ok(shares)
}

/// Reconstruct the secret from `shares`. Every supplied share's HMAC is
/// verified before use; the first failure aborts the whole call rather
/// than silently dropping the bad share — callers that want to tolerate
/// a few corrupted fragments must filter before calling `combine`.
pub fn combine(shares: &[AuthenticatedShare], hmac_key: &[u8], k: u8) -> Result<[u8; SHARE_LEN], ShareError> {
    let mut seen = [false; 256];
    for share in shares {
        if seen[share.index as usize] {
            return Err(ShareError::DuplicateIndex(share.index));
        }
        seen[share.index as usize] = true;

        if !share.verify(hmac_key) {
            return Err(ShareError::InvalidShare(share.index));
        }
    }

    if shares.len() < k as usize {
        return Err(ShareError::InsufficientShares {
            got: shares.len(),
            needed: k as usize,
        });
    }

    let mut secret = [0u8; SHARE_LEN];
    for byte_idx in 0..SHARE_LEN {
        let points: Vec<(u8, u8)> = shares
            .iter()
            .map(|s| (s.index, s.share_bytes[byte_idx]))
            .collect();
        secret[byte_idx] = lagrange_interpolate(&points);
    }

    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HMAC_KEY: &[u8] = b"shared-session-hmac-key";

    fn secret32(fill: u8) -> [u8; SHARE_LEN] {
        let mut s = [fill; SHARE_LEN];
        for (i, b) in s.iter_mut().enumerate() {
            *b = b.wrapping_add(i as u8);
        }
        s
    }

    #[test]
    fn split_then_combine_roundtrip_3_of_5() {
        let secret = secret32(7);
        let shares = split(&secret, 5, 3, HMAC_KEY).unwrap();
        assert_eq!(shares.len(), 5);

        let recovered = combine(&shares[0..3], HMAC_KEY, 3).unwrap();
        assert_eq!(recovered, secret);

        let recovered = combine(&shares[2..5], HMAC_KEY, 3).unwrap();
        assert_eq!(recovered, secret);

        let subset = vec![shares[0].clone(), shares[2].clone(), shares[4].clone()];
        let recovered = combine(&subset, HMAC_KEY, 3).unwrap();
        assert_eq!(recovered, secret);
    }

    #[test]
    fn combine_order_independent() {
        let secret = secret32(99);
        let shares = split(&secret, 5, 3, HMAC_KEY).unwrap();
        let mut reordered = vec![shares[4].clone(), shares[1].clone(), shares[0].clone()];
        reordered.reverse();
        let recovered = combine(&reordered, HMAC_KEY, 3).unwrap();
        assert_eq!(recovered, secret);
    }

    #[test]
    fn below_threshold_is_rejected_not_silently_wrong() {
        let secret = secret32(1);
        let shares = split(&secret, 5, 3, HMAC_KEY).unwrap();
        let err = combine(&shares[0..2], HMAC_KEY, 3).unwrap_err();
        assert!(matches!(
            err,
            ShareError::InsufficientShares { got: 2, needed: 3 }
        ));
    }

    #[test]
    fn hmac_binds_index_swap_invalidates() {
        let secret = secret32(3);
        let mut shares = split(&secret, 5, 3, HMAC_KEY).unwrap();
        let tmp = shares[0].index;
        shares[0].index = shares[1].index;
        shares[1].index = tmp;

        let err = combine(&shares[0..3], HMAC_KEY, 3).unwrap_err();
        assert!(matches!(err, ShareError::InvalidShare(_)));
    }

    #[test]
    fn duplicate_index_rejected() {
        let secret = secret32(5);
        let shares = split(&secret, 5, 3, HMAC_KEY).unwrap();
        let dup = vec![shares[0].clone(), shares[0].clone(), shares[1].clone()];
        let err = combine(&dup, HMAC_KEY, 3).unwrap_err();
        assert!(matches!(err, ShareError::DuplicateIndex(_)));
    }

    #[test]
    fn wrong_hmac_key_fails_verification() {
        let secret = secret32(11);
        let shares = split(&secret, 5, 3, HMAC_KEY).unwrap();
        let err = combine(&shares[0..3], b"wrong-key", 3).unwrap_err();
        assert!(matches!(err, ShareError::InvalidShare(_)));
    }

    #[test]
    fn rejects_threshold_below_floor() {
        let secret = secret32(1);
        assert!(matches!(
            split(&secret, 5, 2, HMAC_KEY),
            Err(ShareError::ThresholdTooLow(2))
        ));
    }

    #[test]
    fn rejects_threshold_exceeding_total() {
        let secret = secret32(1);
        assert!(matches!(
            split(&secret, 3, 4, HMAC_KEY),
            Err(ShareError::ThresholdExceedsTotal { k: 4, n: 3 })
        ));
    }

    #[test]
    fn rejects_wrong_secret_length() {
        assert!(matches!(
            split(b"too short", 5, 3, HMAC_KEY),
            Err(ShareError::InvalidSecretLength(9))
        ));
    }

    #[test]
    fn corrupted_fragment_isolated_when_threshold_still_met() {
        let secret = secret32(42);
        let mut shares = split(&secret, 5, 3, HMAC_KEY).unwrap();
        // simulate a release pipeline filtering out a share whose HMAC
        // no longer verifies before calling combine
        shares[1].share_bytes[0] ^= 0xFF;
        let good: Vec<AuthenticatedShare> = shares
            .into_iter()
            .filter(|s| s.verify(HMAC_KEY))
            .collect();
        assert_eq!(good.len(), 4);
        let recovered = combine(&good[0..3], HMAC_KEY, 3).unwrap();
        assert_eq!(recovered, secret);
    }
}
