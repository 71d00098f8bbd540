//! `TimerTick`: scan for switches whose deadline has passed and drive
//! the release pipeline for each one, one at a time, always awaited to
//! completion.

use echolock_release::{release, Delivery, FragmentKeySource, ReleaseRequest};

use crate::model::{AuditEntry, FragmentKeyScheme, SwitchStatus};
use crate::{SwitchError, SwitchId, SwitchLifecycle};

/// Outcome of attempting release for one triggered switch during a scan.
#[derive(Debug)]
pub enum ReleaseReport {
    Released { switch_id: SwitchId },
    StillArmed { switch_id: SwitchId },
    ReleaseFailed { switch_id: SwitchId, reason: String },
}

impl SwitchLifecycle {
    /// Scan every switch for `Armed ∧ now >= expires_at`, flip it to
    /// `Triggered` under its advisory lock (re-checking `expires_at`
    /// after acquiring the lock so a check-in that just landed always
    /// wins), then run the release pipeline for it before moving to the
    /// next candidate.
    ///
    /// `fragment_key_material` supplies the passworded-switch password,
    /// keyed by switch id hex; passwordless switches never consult it.
    pub async fn timer_tick(
        &self,
        now: u64,
        delivery: &dyn Delivery,
        passwords: &std::collections::HashMap<String, Vec<u8>>,
    ) -> Vec<ReleaseReport> {
        let mut reports = Vec::new();

        for switch_id in self.store.ids().await {
            let triggered = self
                .store
                .with_lock(switch_id, |switch| {
                    if switch.status == SwitchStatus::Armed && now >= switch.expires_at {
                        switch.status = SwitchStatus::Triggered;
                        true
                    } else {
                        false
                    }
                })
                .await
                .unwrap_or(false);

            if !triggered {
                reports.push(ReleaseReport::StillArmed { switch_id });
                continue;
            }

            self.store
                .record_audit(switch_id, AuditEntry::Triggered { at: now })
                .await;

            let report = self
                .release_one(switch_id, now, delivery, passwords)
                .await;
            reports.push(report);
        }

        reports
    }

    /// Admin-driven release, independent of the timer scan. Only valid
    /// against a `Triggered` switch — an `Armed` switch's owner still has
    /// the right to check in, so release cannot be forced early, and the
    /// terminal statuses have nothing left to release.
    pub async fn manual_release(
        &self,
        switch_id: SwitchId,
        now: u64,
        delivery: &dyn Delivery,
        passwords: &std::collections::HashMap<String, Vec<u8>>,
    ) -> Result<ReleaseReport, SwitchError> {
        let switch = self
            .store
            .get(switch_id)
            .await
            .ok_or(SwitchError::NotFound)?;
        if switch.status != SwitchStatus::Triggered {
            return Err(SwitchError::NotTriggered);
        }
        Ok(self.release_one(switch_id, now, delivery, passwords).await)
    }

    async fn release_one(
        &self,
        switch_id: SwitchId,
        now: u64,
        delivery: &dyn Delivery,
        passwords: &std::collections::HashMap<String, Vec<u8>>,
    ) -> ReleaseReport {
        let Some(switch) = self.store.get(switch_id).await else {
            return ReleaseReport::ReleaseFailed {
                switch_id,
                reason: "switch vanished between trigger and release".to_string(),
            };
        };

        let switch_id_hex = switch.switch_id_hex();
        let secret_key_bytes = switch.transport_keys.secret_key().secret_bytes();
        let password = passwords.get(&switch_id_hex);

        let fragment_key = match switch.fragment_metadata.key_scheme {
            FragmentKeyScheme::Passwordless => FragmentKeySource::Passwordless {
                transport_secret_key: &secret_key_bytes,
            },
            FragmentKeyScheme::Passworded => match password {
                Some(p) => FragmentKeySource::Passworded { password: p },
                None => {
                    let reason = "passworded switch has no password available for release".to_string();
                    self.store
                        .record_audit(
                            switch_id,
                            AuditEntry::ReleaseFailed {
                                at: now,
                                reason: reason.clone(),
                            },
                        )
                        .await;
                    return ReleaseReport::ReleaseFailed { switch_id, reason };
                }
            },
        };

        let request = ReleaseRequest {
            switch_id,
            k: switch.fragment_metadata.k,
            relays: switch.fragment_metadata.relays.clone(),
            kdf_salt: switch.fragment_metadata.kdf_salt.clone(),
            kdf_iterations: switch.fragment_metadata.kdf_iterations,
            fragment_key,
            sealed_ciphertext: switch.sealed_message.ciphertext.clone(),
            sealed_iv: switch.sealed_message.iv,
            sealed_tag: switch.sealed_message.auth_tag,
        };

        let recipients: Vec<String> = switch.recipients.iter().map(|r| r.id.clone()).collect();
        let mut health = self.health_lock().await;
        let outcome = release(&request, &recipients, &mut health, delivery).await;
        drop(health);

        match outcome {
            Ok(_events) => {
                self.store
                    .with_lock(switch_id, |s| s.status = SwitchStatus::Released)
                    .await;
                self.store
                    .record_audit(switch_id, AuditEntry::ReleaseSucceeded { at: now })
                    .await;
                ReleaseReport::Released { switch_id }
            }
            Err(e) => {
                // Left in `Triggered`: the spec treats release failure as
                // retryable, not terminal (see the lifecycle summary).
                let reason = e.to_string();
                self.store
                    .record_audit(
                        switch_id,
                        AuditEntry::ReleaseFailed {
                            at: now,
                            reason: reason.clone(),
                        },
                    )
                    .await;
                ReleaseReport::ReleaseFailed { switch_id, reason }
            }
        }
    }

    async fn health_lock(&self) -> tokio::sync::MutexGuard<'_, echolock_relay::RelayHealthTracker> {
        self.health.lock().await
    }
}
