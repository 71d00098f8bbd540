//! K-of-N authenticated secret sharing over GF(256).
//!
//! Splits a fixed-size secret (the message key, 32 bytes) into `N` shares
//! such that any `K` reconstruct it and any fewer yield no information.
//! Each share carries an HMAC binding its index to its bytes, so
//! reordering or corrupting a share in untrusted storage is detectable
//! without the HMAC key being required to forge a valid one.

mod gf256;
mod shamir;

pub use shamir::{combine, split, AuthenticatedShare, ShareError, MIN_THRESHOLD, SHARE_LEN};
