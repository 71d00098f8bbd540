//! `CheckIn` and `Cancel`.

use echolock_relay::publish_fragment;

use crate::model::{AuditEntry, SwitchStatus};
use crate::{SwitchError, SwitchId, SwitchLifecycle};

impl SwitchLifecycle {
    /// Reject unless the switch is `Armed` and its deadline hasn't
    /// already passed. Resets `expires_at` to `now + interval` and bumps
    /// the counter. The advisory lock makes this safe to race against a
    /// concurrent `TimerTick` scan: whichever acquires the lock first
    /// wins, and the loser observes the already-updated state.
    pub async fn check_in(&self, switch_id: SwitchId, now: u64) -> Result<(), SwitchError> {
        let outcome = self
            .store
            .with_lock(switch_id, |switch| {
                if switch.status != SwitchStatus::Armed {
                    return Err(SwitchError::NotArmed);
                }
                if now >= switch.expires_at {
                    return Err(SwitchError::DeadlinePassed);
                }
                switch.expires_at = now + switch.check_in_interval;
                switch.last_check_in_at = now;
                switch.check_in_count += 1;
                Ok(switch.expires_at)
            })
            .await
            .ok_or(SwitchError::NotFound)?;

        let new_expiry = outcome?;
        self.store
            .record_audit(switch_id, AuditEntry::CheckedIn { at: now, new_expiry })
            .await;
        Ok(())
    }

    /// Permitted only while `Armed`. Transitions to `Cancelled`, then
    /// makes a best-effort attempt to republish each fragment's
    /// addressable id with an already-past expiration, so relays honoring
    /// NIP-40 drop the real content immediately rather than waiting out
    /// the original expiration. Cancellation itself never depends on any
    /// relay's cooperation — the switch is `Cancelled` regardless.
    pub async fn cancel(&self, switch_id: SwitchId, now: u64) -> Result<(), SwitchError> {
        let outcome = self
            .store
            .with_lock(switch_id, |switch| {
                if switch.status != SwitchStatus::Armed {
                    return Err(SwitchError::NotArmed);
                }
                switch.status = SwitchStatus::Cancelled;
                Ok(())
            })
            .await
            .ok_or(SwitchError::NotFound)?;

        outcome?;
        self.store
            .record_audit(switch_id, AuditEntry::Cancelled { at: now })
            .await;

        self.publish_expiration_notices(switch_id, now).await;
        Ok(())
    }

    /// Best-effort republish of an already-expired stub under each
    /// fragment's addressable id. Every outcome, including a relay
    /// refusing or timing out, is swallowed — this is advisory cleanup,
    /// not part of the cancellation contract.
    async fn publish_expiration_notices(&self, switch_id: SwitchId, now: u64) {
        let Some(switch) = self.store.get(switch_id).await else {
            return;
        };
        if switch.fragment_metadata.relays.is_empty() {
            return;
        }

        let switch_id_hex = switch.switch_id_hex();
        let mut health = self.health.lock().await;
        for event in &switch.fragment_metadata.events {
            let _ = publish_fragment(
                &switch_id_hex,
                event.index,
                &[],
                &switch.transport_keys,
                &switch.fragment_metadata.relays,
                now,
                switch.fragment_metadata.bitcoin_txid.as_deref(),
                &mut health,
            )
            .await;
        }
    }
}
