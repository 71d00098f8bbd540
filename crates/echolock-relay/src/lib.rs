//! Publication and retrieval of fragments against a pool of untrusted
//! Nostr relays.
//!
//! No single relay is authoritative: fragments are published in parallel
//! to every relay in the pool and a publish only counts as successful
//! once a minimum quorum of relays has acknowledged it. Retrieval
//! deduplicates by `(fragment_index, event_id)` and returns whatever
//! fragments happen to be retrievable; selection among them is the
//! release pipeline's job, not this crate's.

mod health;
mod publish;
mod query;

pub use health::{RelayHealth, RelayHealthTracker};
pub use publish::{publish_fragment, PublishOutcome, PublishResult};
pub use query::query_fragments;

use echolock_primitives::kind::ErrorKind;
use thiserror::Error;

/// Fragments live in Nostr's addressable/parameterized-replaceable range
/// (30000-39999). Picking a value in that range means relays naturally
/// treat `d`-tagged fragment events as replaceable per (pubkey, kind, d).
pub const FRAGMENT_EVENT_KIND: u16 = 37777;

/// Minimum number of relays that must accept a publish for it to count.
/// The pool itself is expected to hold >= 7 URLs (see `RelayHealthTracker`).
pub const DEFAULT_MIN_PUBLISH_QUORUM: usize = 5;

/// Consecutive publish/query failures before a relay is put into cooldown.
pub const DEFAULT_CIRCUIT_BREAKER_THRESHOLD: u32 = 10;

/// How long a relay stays in cooldown once tripped.
pub const DEFAULT_COOLDOWN_SECS: u64 = 600;

/// Per-relay request deadline.
pub const DEFAULT_RELAY_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("failed to connect to relay {0}: {1}")]
    ConnectFailed(String, String),
    #[error("failed to sign event: {0}")]
    SignFailed(String),
    #[error("publish quorum not met: {success}/{attempted}, need {needed}")]
    QuorumNotMet {
        success: usize,
        attempted: usize,
        needed: usize,
    },
    #[error("query failed: {0}")]
    QueryFailed(String),
}

impl RelayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::ConnectFailed(..) | RelayError::QueryFailed(_) => ErrorKind::Transient,
            RelayError::SignFailed(_) => ErrorKind::Permanent,
            RelayError::QuorumNotMet { .. } => ErrorKind::Quorum,
        }
    }
}

/// `d` tag value binding a fragment to its switch and index.
pub fn addressable_id(switch_id_hex: &str, fragment_index: u8) -> String {
    format!("{switch_id_hex}:{fragment_index}")
}
