//! The Switch aggregate and its satellite record types.

use nostr_sdk::Keys;

pub const SWITCH_ID_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchStatus {
    Armed,
    Triggered,
    Released,
    Cancelled,
}

impl SwitchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SwitchStatus::Released | SwitchStatus::Cancelled)
    }
}

/// An opaque reference to a recipient. The switch never stores anything
/// about a recipient beyond this id; delivery addressing is the external
/// collaborator's problem (see `echolock_release::Delivery`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientRef {
    pub id: String,
    pub label: Option<String>,
}

/// Urgency bucket for a check-in reminder, rescaled from blocks-remaining
/// (the Bitcoin-native unit used elsewhere in this workspace) to
/// wall-clock seconds, since a switch's deadline is a plain timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckInUrgency {
    None,
    Normal,
    Warning,
    Critical,
    Expired,
}

impl CheckInUrgency {
    pub fn from_seconds_remaining(seconds_remaining: i64) -> Self {
        if seconds_remaining <= 0 {
            CheckInUrgency::Expired
        } else if seconds_remaining <= 3600 {
            CheckInUrgency::Critical
        } else if seconds_remaining <= 86_400 {
            CheckInUrgency::Warning
        } else if seconds_remaining <= 7 * 86_400 {
            CheckInUrgency::Normal
        } else {
            CheckInUrgency::None
        }
    }
}

/// How the fragment-encryption key `K_f` is rederived at release time.
/// The passwordless variant is recoverable from the switch's own
/// transport key; the passworded variant requires the password to be
/// supplied again by whoever drives the release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKeyScheme {
    Passwordless,
    Passworded,
}

/// Per-fragment publication record: which relays accepted it and under
/// what event id, filled in as Phase 2 (or direct publish) completes.
#[derive(Debug, Clone)]
pub struct FragmentEventRef {
    pub index: u8,
    pub accepted_by: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FragmentMetadata {
    pub n: u8,
    pub k: u8,
    pub relays: Vec<String>,
    pub expiration: u64,
    pub bitcoin_txid: Option<String>,
    pub kdf_salt: Vec<u8>,
    pub kdf_iterations: u32,
    pub key_scheme: FragmentKeyScheme,
    pub events: Vec<FragmentEventRef>,
}

/// The sealed plaintext blob. Immutable once created.
#[derive(Debug, Clone)]
pub struct SealedMessageRecord {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; 12],
    pub auth_tag: [u8; 16],
}

#[derive(Debug, Clone)]
pub struct Switch {
    pub switch_id: [u8; SWITCH_ID_LEN],
    pub owner_id: String,
    pub title: String,
    pub status: SwitchStatus,
    pub check_in_interval: u64,
    pub expires_at: u64,
    pub created_at: u64,
    pub last_check_in_at: u64,
    pub check_in_count: u64,
    pub recipients: Vec<RecipientRef>,
    pub fragment_metadata: FragmentMetadata,
    pub sealed_message: SealedMessageRecord,
    pub transport_keys: Keys,
}

impl Switch {
    pub fn switch_id_hex(&self) -> String {
        hex::encode(self.switch_id)
    }

    pub fn check_in_urgency(&self, now: u64) -> CheckInUrgency {
        if self.status != SwitchStatus::Armed {
            return CheckInUrgency::Expired;
        }
        let seconds_remaining = self.expires_at as i64 - now as i64;
        CheckInUrgency::from_seconds_remaining(seconds_remaining)
    }
}

/// One entry in a switch's append-only audit trail.
#[derive(Debug, Clone)]
pub enum AuditEntry {
    Created { at: u64 },
    CheckedIn { at: u64, new_expiry: u64 },
    Cancelled { at: u64 },
    Triggered { at: u64 },
    ReleaseSucceeded { at: u64 },
    ReleaseFailed { at: u64, reason: String },
}
