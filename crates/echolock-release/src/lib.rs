//! Release pipeline: turns a triggered switch's scattered, untrusted
//! fragments back into the original plaintext.
//!
//! The pipeline never exposes plaintext before the SealedMessage's own
//! AEAD tag has verified. Every intermediate step that can fail does so
//! by dropping the offending fragment rather than aborting the whole
//! run, as long as enough fragments survive to meet the threshold.

mod pipeline;

pub use pipeline::release;

use echolock_primitives::kind::ErrorKind;
use echolock_relay::RelayError;
use echolock_sharing::ShareError;
use thiserror::Error;

/// Key material needed to rederive the fragment-encryption key `K_f`
/// exactly as at creation time. Passwordless switches recover it from the
/// per-switch transport secret key; passworded switches require the
/// caller to supply the password again.
pub enum FragmentKeySource<'a> {
    Passwordless { transport_secret_key: &'a [u8] },
    Passworded { password: &'a [u8] },
}

/// Everything the pipeline needs to attempt a release. Constructed by the
/// switch lifecycle from its own stored record.
pub struct ReleaseRequest<'a> {
    pub switch_id: [u8; 16],
    pub k: u8,
    pub relays: Vec<String>,
    pub kdf_salt: Vec<u8>,
    pub kdf_iterations: u32,
    pub fragment_key: FragmentKeySource<'a>,
    pub sealed_ciphertext: Vec<u8>,
    pub sealed_iv: [u8; 12],
    pub sealed_tag: [u8; 16],
}

#[derive(Debug, Clone)]
pub enum ReleaseEvent {
    Started { switch_id: String },
    Attempt { recipient: String },
    Delivered { recipient: String, medium: String },
    Failed { reason: String },
}

#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("fragment retrieval failed: {0}")]
    Retrieval(#[from] RelayError),
    #[error("key derivation failed: {0}")]
    Kdf(#[from] echolock_primitives::kdf::KdfError),
    #[error("insufficient shares: got {got}, need {needed}")]
    InsufficientShares { got: usize, needed: usize },
    #[error("threshold combine failed: {0}")]
    Combine(ShareError),
    #[error("sealed message authentication failed: possible tampering or key mismatch")]
    MessageAuthFailure,
    #[error("delivery failed for {recipient}: {reason}")]
    DeliveryFailed { recipient: String, reason: String },
}

impl ReleaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReleaseError::Retrieval(e) => e.kind(),
            ReleaseError::Kdf(e) => e.kind(),
            ReleaseError::InsufficientShares { .. } => ErrorKind::Quorum,
            ReleaseError::Combine(e) => e.kind(),
            ReleaseError::MessageAuthFailure => ErrorKind::AuthFailure,
            ReleaseError::DeliveryFailed { .. } => ErrorKind::Transient,
        }
    }
}

/// External collaborator that hands plaintext to a recipient (email,
/// webhook, whatever the deployment wires up). The pipeline itself never
/// looks inside the plaintext.
pub trait Delivery {
    fn deliver(&self, recipient: &str, plaintext: &[u8]) -> Result<(), String>;
}

/// Delivery stand-in that only logs. Never wired in a real deployment;
/// exists so the pipeline can be exercised end-to-end without a real
/// mail/webhook collaborator.
pub struct LoggingDelivery;

impl Delivery for LoggingDelivery {
    fn deliver(&self, recipient: &str, plaintext: &[u8]) -> Result<(), String> {
        log::info!(
            "release delivered to {recipient} ({} plaintext bytes)",
            plaintext.len()
        );
        Ok(())
    }
}
