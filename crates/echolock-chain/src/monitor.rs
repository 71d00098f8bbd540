//! Transaction confirmation monitor.
//!
//! The monitor's whole purpose is to distinguish "not seen yet" from
//! "seen, then gone" — a transaction silently vanishing from the mempool
//! is the failure mode this crate exists to catch, not an edge case to
//! paper over.

use std::time::{Duration, Instant};

use crate::client::ExplorerClient;
use crate::ChainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatusKind {
    NotFound,
    Pending,
    Confirming,
    Confirmed,
    Dropped,
    Error,
}

#[derive(Debug, Clone)]
pub struct TxStatus {
    pub kind: TxStatusKind,
    pub confirmations: u32,
    pub block_height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ConfirmationData {
    pub txid: String,
    pub confirmations: u32,
    pub block_height: Option<u32>,
}

/// Confirmation depth for a transaction mined at `block_height`, given the
/// current chain `tip`. Unconfirmed, or confirmed but with the tip
/// temporarily unavailable, both report the floor rather than `None` —
/// the caller only needs a lower bound to compare against its target.
fn confirmation_depth(confirmed: bool, block_height: Option<u32>, tip: Option<u32>) -> u32 {
    match (confirmed, block_height, tip) {
        (true, Some(block_height), Some(tip)) => tip.saturating_sub(block_height) + 1,
        (true, Some(_), None) => 1,
        _ => 0,
    }
}

/// Poll the explorer for `txid` until `target` confirmations are reached
/// or `max_wait` elapses. Distinguishes a transaction that has never been
/// seen from one that was seen and then disappeared: the latter is
/// reported as [`ChainError::Dropped`], never silently retried forever.
pub async fn wait_for_confirmation(
    client: &ExplorerClient,
    txid: &str,
    target: u32,
    poll_interval: Duration,
    max_wait: Duration,
    dropped_threshold: Duration,
) -> Result<ConfirmationData, ChainError> {
    let start = Instant::now();
    let mut ever_seen = false;
    let mut last_seen_at = Instant::now();

    loop {
        if start.elapsed() >= max_wait {
            return Err(ChainError::ConfirmationTimeout(max_wait.as_secs()));
        }

        match client.get_tx(txid).await {
            Ok(info) => {
                ever_seen = true;
                last_seen_at = Instant::now();

                let tip = if info.status.confirmed && info.status.block_height.is_some() {
                    client.tip_height().await.ok()
                } else {
                    None
                };
                let confirmations = confirmation_depth(info.status.confirmed, info.status.block_height, tip);

                if info.status.confirmed && confirmations >= target {
                    return Ok(ConfirmationData {
                        txid: txid.to_string(),
                        confirmations,
                        block_height: info.status.block_height,
                    });
                }
            }
            Err(e) if e.kind() == echolock_primitives::kind::ErrorKind::Permanent => {
                if ever_seen && last_seen_at.elapsed() >= dropped_threshold {
                    return Err(ChainError::Dropped);
                }
                if !ever_seen && start.elapsed() >= dropped_threshold {
                    return Err(ChainError::Dropped);
                }
            }
            Err(_) => {
                // transient explorer error: keep polling until max_wait
            }
        }

        tokio::time::sleep(poll_interval).await;
    }
}
