//! Switch lifecycle: create, check-in, cancel, and the timer-driven
//! trigger/release scan.
//!
//! This is the layer that turns the crypto and transport primitives built
//! elsewhere in the workspace into the actual dead-man's-switch: every
//! operation here is authorization-agnostic (the caller has already
//! decided the owner is allowed to act) and concerns itself purely with
//! the state machine and the data it carries.

mod checkin;
mod create;
mod model;
mod store;
mod timer;

pub use create::{ChainAnchorRequest, CreateRequest};
pub use model::{
    AuditEntry, CheckInUrgency, FragmentEventRef, FragmentKeyScheme, FragmentMetadata,
    RecipientRef, SealedMessageRecord, Switch, SwitchStatus, SWITCH_ID_LEN,
};
pub use store::SwitchStore;
pub use timer::ReleaseReport;

use echolock_primitives::kind::ErrorKind;
use echolock_relay::RelayHealthTracker;
use echolock_release::ReleaseError;
use thiserror::Error;
use tokio::sync::Mutex;

pub type SwitchId = [u8; SWITCH_ID_LEN];

#[derive(Error, Debug)]
pub enum SwitchError {
    #[error("threshold invalid: k={k} n={n} (need 3 <= k <= n <= 255)")]
    InvalidThreshold { k: u8, n: u8 },
    #[error("at least one recipient is required")]
    EmptyRecipients,
    #[error("switch not found")]
    NotFound,
    #[error("switch is not armed")]
    NotArmed,
    #[error("manual release requires a triggered switch")]
    NotTriggered,
    #[error("check-in deadline already passed")]
    DeadlinePassed,
    #[error("key derivation failed: {0}")]
    Kdf(#[from] echolock_primitives::kdf::KdfError),
    #[error("encryption failed: {0}")]
    Aead(#[from] echolock_primitives::aead::AeadError),
    #[error("secret sharing failed: {0}")]
    Sharing(#[from] echolock_sharing::ShareError),
    #[error("fragment publication failed to meet quorum: {success}/{attempted}, need {needed}")]
    PublishQuorumNotMet {
        success: usize,
        attempted: usize,
        needed: usize,
    },
    #[error("two-phase commit failed: {0}")]
    Coordinator(#[from] echolock_coordinator::CoordinatorError),
    #[error("relay publish failed: {0}")]
    Relay(#[from] echolock_relay::RelayError),
    #[error("release pipeline failed: {0}")]
    Release(#[from] ReleaseError),
}

impl SwitchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SwitchError::InvalidThreshold { .. } | SwitchError::EmptyRecipients => {
                ErrorKind::Input
            }
            SwitchError::NotFound => ErrorKind::Input,
            SwitchError::NotArmed
            | SwitchError::DeadlinePassed
            | SwitchError::NotTriggered => ErrorKind::Permanent,
            SwitchError::Kdf(e) => e.kind(),
            SwitchError::Aead(e) => e.kind(),
            SwitchError::Sharing(e) => e.kind(),
            SwitchError::PublishQuorumNotMet { .. } => ErrorKind::Quorum,
            SwitchError::Coordinator(e) => e.kind(),
            SwitchError::Relay(e) => e.kind(),
            SwitchError::Release(e) => e.kind(),
        }
    }
}

/// Owns the switch registry and the shared relay health tracker. One
/// instance per running service; cheap to construct, holds no I/O
/// resources of its own.
pub struct SwitchLifecycle {
    pub store: SwitchStore,
    health: Mutex<RelayHealthTracker>,
}

impl Default for SwitchLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl SwitchLifecycle {
    pub fn new() -> Self {
        Self {
            store: SwitchStore::new(),
            health: Mutex::new(RelayHealthTracker::default()),
        }
    }
}
