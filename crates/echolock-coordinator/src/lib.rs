//! Two-phase commit coordinator.
//!
//! No fragment is ever published before a confirmed Bitcoin timelock
//! transaction exists. Phase 1 (broadcast + confirmation) must complete
//! before Phase 2 (fragment publication) is even attempted; the state
//! machine enforces this by refusing to run Phase 2 from anything but
//! `Phase1Confirmed`.

mod retry;
mod state;

pub use retry::{broadcast_with_retry, DEFAULT_BROADCAST_ATTEMPTS, DEFAULT_INITIAL_BACKOFF};
pub use state::{CommitState, StateHistoryEntry};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use echolock_chain::{validate_transaction, wait_for_confirmation, ChainConfig, ExplorerClient};
use echolock_primitives::kind::ErrorKind;
use echolock_relay::{publish_fragment, RelayHealthTracker, DEFAULT_MIN_PUBLISH_QUORUM};
use nostr_sdk::Keys;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("illegal transition: cannot run {attempted} from {current:?}")]
    IllegalTransition {
        current: CommitState,
        attempted: &'static str,
    },
    #[error("phase 1 broadcast failed: {0}")]
    PhaseOneBroadcast(String),
    #[error("phase 1 confirmation failed: {0}")]
    PhaseOneConfirmation(String),
    #[error("phase 2 publish quorum not met for fragment {fragment_index}: {success}/{attempted}")]
    PhaseTwoQuorum {
        fragment_index: u8,
        success: usize,
        attempted: usize,
    },
    #[error("phase 2 publish failed for fragment {fragment_index}: {reason}")]
    PhaseTwoPublish { fragment_index: u8, reason: String },
}

impl CoordinatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordinatorError::IllegalTransition { .. } => ErrorKind::Permanent,
            CoordinatorError::PhaseOneBroadcast(_) => ErrorKind::Permanent,
            CoordinatorError::PhaseOneConfirmation(_) => ErrorKind::Timeout,
            CoordinatorError::PhaseTwoQuorum { .. } => ErrorKind::Quorum,
            CoordinatorError::PhaseTwoPublish { .. } => ErrorKind::Transient,
        }
    }
}

/// One fragment to publish in Phase 2, already framed by the fragment
/// codec.
pub struct FragmentToPublish {
    pub index: u8,
    pub framed_bytes: Vec<u8>,
    pub expiration: u64,
}

pub struct TwoPhaseCoordinator {
    explorer: ExplorerClient,
    chain_config: ChainConfig,
    history: Vec<StateHistoryEntry>,
    state: CommitState,
    pub bitcoin_txid: Option<String>,
}

impl TwoPhaseCoordinator {
    pub fn new(explorer: ExplorerClient, chain_config: ChainConfig) -> Self {
        let mut coordinator = Self {
            explorer,
            chain_config,
            history: Vec::new(),
            state: CommitState::Pending,
            bitcoin_txid: None,
        };
        coordinator.record(CommitState::Pending);
        coordinator
    }

    pub fn state(&self) -> CommitState {
        self.state
    }

    pub fn history(&self) -> &[StateHistoryEntry] {
        &self.history
    }

    fn record(&mut self, state: CommitState) {
        self.state = state;
        self.history.push(StateHistoryEntry {
            state,
            at: now(),
        });
    }

    fn require_state(
        &self,
        expected: CommitState,
        attempted: &'static str,
    ) -> Result<(), CoordinatorError> {
        if self.state != expected {
            return Err(CoordinatorError::IllegalTransition {
                current: self.state,
                attempted,
            });
        }
        Ok(())
    }

    /// Run Phase 1: validate, broadcast with retry, wait for confirmation.
    pub async fn run_phase_one(&mut self, tx_hex: &str) -> Result<(), CoordinatorError> {
        self.require_state(CommitState::Pending, "phase1")?;

        if validate_transaction(tx_hex).is_err() {
            self.record(CommitState::Failed);
            return Err(CoordinatorError::PhaseOneBroadcast(
                "transaction failed local validation".into(),
            ));
        }

        self.record(CommitState::Phase1Broadcasting);

        let txid = match broadcast_with_retry(&self.explorer, tx_hex).await {
            Ok(txid) => txid,
            Err(e) => {
                self.record(CommitState::Failed);
                return Err(CoordinatorError::PhaseOneBroadcast(e.to_string()));
            }
        };
        self.bitcoin_txid = Some(txid.clone());
        self.record(CommitState::Phase1Waiting);

        let confirmation = wait_for_confirmation(
            &self.explorer,
            &txid,
            self.chain_config.confirmation_target,
            Duration::from_secs(self.chain_config.poll_interval_secs),
            Duration::from_secs(self.chain_config.max_wait_secs),
            Duration::from_secs(self.chain_config.dropped_threshold_secs),
        )
        .await;

        match confirmation {
            Ok(_) => {
                self.record(CommitState::Phase1Confirmed);
                Ok(())
            }
            Err(e) => {
                self.record(CommitState::Failed);
                Err(CoordinatorError::PhaseOneConfirmation(e.to_string()))
            }
        }
    }

    /// Run Phase 2: publish every fragment in index order, enforcing the
    /// publish quorum after each one. Only callable from
    /// `Phase1Confirmed`.
    pub async fn run_phase_two(
        &mut self,
        switch_id_hex: &str,
        fragments: &[FragmentToPublish],
        transport_key: &Keys,
        relays: &[String],
        health: &mut RelayHealthTracker,
        min_quorum: usize,
    ) -> Result<(), CoordinatorError> {
        self.require_state(CommitState::Phase1Confirmed, "phase2")?;
        self.record(CommitState::Phase2Publishing);

        for fragment in fragments {
            let result = publish_fragment(
                switch_id_hex,
                fragment.index,
                &fragment.framed_bytes,
                transport_key,
                relays,
                fragment.expiration,
                self.bitcoin_txid.as_deref(),
                health,
            )
            .await;

            let result = match result {
                Ok(r) => r,
                Err(e) => {
                    self.record(CommitState::Failed);
                    return Err(CoordinatorError::PhaseTwoPublish {
                        fragment_index: fragment.index,
                        reason: e.to_string(),
                    });
                }
            };

            if !result.meets_quorum(min_quorum) {
                self.record(CommitState::Failed);
                return Err(CoordinatorError::PhaseTwoQuorum {
                    fragment_index: fragment.index,
                    success: result.success_count,
                    attempted: result.attempted,
                });
            }
        }

        self.record(CommitState::Phase2Complete);
        self.record(CommitState::Committed);
        Ok(())
    }

    /// Best-effort rollback. The on-chain transaction, once broadcast,
    /// cannot be unbroadcast — this only moves local state to
    /// `RolledBack` and preserves the outstanding TXID for manual
    /// reconciliation. Refused once the commit has already succeeded or
    /// been rolled back.
    pub fn rollback(&mut self) -> Result<(), CoordinatorError> {
        if matches!(self.state, CommitState::Committed | CommitState::RolledBack) {
            return Err(CoordinatorError::IllegalTransition {
                current: self.state,
                attempted: "rollback",
            });
        }
        self.record(CommitState::RolledBack);
        Ok(())
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub const DEFAULT_MIN_QUORUM: usize = DEFAULT_MIN_PUBLISH_QUORUM;

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> TwoPhaseCoordinator {
        TwoPhaseCoordinator::new(
            ExplorerClient::new("https://explorer.invalid", 5),
            ChainConfig {
                explorer_base_url: "https://explorer.invalid".into(),
                network: echolock_chain::Network::Testnet,
                unsafe_mainnet: false,
                poll_interval_secs: 1,
                confirmation_target: 1,
                max_wait_secs: 1,
                dropped_threshold_secs: 1,
                max_monitor_secs: 1,
                explorer_timeout_secs: 1,
            },
        )
    }

    #[test]
    fn starts_in_pending() {
        let c = coordinator();
        assert_eq!(c.state(), CommitState::Pending);
        assert_eq!(c.history().len(), 1);
    }

    #[tokio::test]
    async fn phase_two_refused_before_phase_one_confirmed() {
        let mut c = coordinator();
        let mut health = RelayHealthTracker::default();
        let keys = Keys::generate();
        let err = c
            .run_phase_two("switch-id", &[], &keys, &[], &mut health, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn phase_one_rejects_invalid_transaction() {
        let mut c = coordinator();
        let err = c.run_phase_one("not-hex-at-all").await.unwrap_err();
        assert!(matches!(err, CoordinatorError::PhaseOneBroadcast(_)));
        assert_eq!(c.state(), CommitState::Failed);
    }

    #[test]
    fn rollback_from_failed_succeeds() {
        let mut c = coordinator();
        c.record(CommitState::Failed);
        assert!(c.rollback().is_ok());
        assert_eq!(c.state(), CommitState::RolledBack);
    }

    #[test]
    fn rollback_from_committed_refused() {
        let mut c = coordinator();
        c.record(CommitState::Committed);
        assert!(c.rollback().is_err());
    }

    #[test]
    fn rollback_is_idempotent_refusal_once_rolled_back() {
        let mut c = coordinator();
        c.record(CommitState::Failed);
        c.rollback().unwrap();
        assert!(c.rollback().is_err());
    }
}
