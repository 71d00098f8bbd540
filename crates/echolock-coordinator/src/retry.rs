//! Broadcast retry with exponential backoff.

use std::time::Duration;

use echolock_chain::{ExplorerClient, ExplorerError};

pub const DEFAULT_BROADCAST_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Broadcast `tx_hex`, retrying transient explorer failures up to
/// `DEFAULT_BROADCAST_ATTEMPTS` times with `initial_delay * 2^attempt`
/// backoff. Certain explorer rejections (inputs already spent, already
/// in mempool, conflicting mempool entry) are non-retryable and fail on
/// the first attempt.
pub async fn broadcast_with_retry(
    explorer: &ExplorerClient,
    tx_hex: &str,
) -> Result<String, ExplorerError> {
    let mut attempt = 0u32;
    loop {
        match explorer.broadcast(tx_hex).await {
            Ok(txid) => return Ok(txid),
            Err(e) if e.is_non_retryable_broadcast_rejection() => return Err(e),
            Err(e) => {
                attempt += 1;
                if attempt >= DEFAULT_BROADCAST_ATTEMPTS {
                    return Err(e);
                }
                let delay = DEFAULT_INITIAL_BACKOFF * 2u32.pow(attempt - 1);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
