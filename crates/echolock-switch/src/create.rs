//! `Create`: seal the message, split the key, publish the fragments.

use std::time::{SystemTime, UNIX_EPOCH};

use nostr_sdk::Keys;
use zeroize::Zeroize;

use echolock_chain::{ChainConfig, ExplorerClient};
use echolock_coordinator::{FragmentToPublish, TwoPhaseCoordinator};
use echolock_fragment::{encode, FragmentFields};
use echolock_primitives::{
    aead::aead_encrypt,
    kdf::{hkdf_derive, kdf_password, DEFAULT_PBKDF2_ITERATIONS},
    mac::hmac_sha256,
    random::secure_random,
};
use echolock_relay::publish_fragment;
use echolock_sharing::{split, MIN_THRESHOLD};

use crate::model::{
    FragmentEventRef, FragmentKeyScheme, FragmentMetadata, RecipientRef, SealedMessageRecord,
    Switch, SwitchStatus,
};
use crate::{SwitchError, SwitchId, SwitchLifecycle};

const FRAGMENT_KEY_INFO: &[u8] = b"ECHOLOCK-V1-FRAGMENT-KEY";
const SHARE_AUTH_INFO: &[u8] = b"share-auth-v1";
const FRAGMENT_EXPIRATION_BUFFER_SECS: u64 = 90 * 24 * 3600;
const SALT_LEN: usize = 16;

pub struct ChainAnchorRequest<'a> {
    pub tx_hex: &'a str,
    pub explorer: ExplorerClient,
    pub chain_config: ChainConfig,
}

pub struct CreateRequest<'a> {
    pub owner_id: String,
    pub title: String,
    pub plaintext: &'a [u8],
    pub interval_secs: u64,
    pub recipients: Vec<RecipientRef>,
    pub n: u8,
    pub k: u8,
    pub relays: Vec<String>,
    pub min_quorum: usize,
    pub password: Option<&'a [u8]>,
    pub chain_anchor: Option<ChainAnchorRequest<'a>>,
}

impl SwitchLifecycle {
    pub async fn create(&self, req: CreateRequest<'_>) -> Result<SwitchId, SwitchError> {
        if req.k < MIN_THRESHOLD || req.k > req.n {
            return Err(SwitchError::InvalidThreshold {
                k: req.k,
                n: req.n,
            });
        }
        if req.recipients.is_empty() {
            return Err(SwitchError::EmptyRecipients);
        }

        let switch_id: SwitchId = secure_random(16).try_into().expect("16 bytes");
        let mut message_key: [u8; 32] = secure_random(32).try_into().expect("32 bytes");
        let salt = secure_random(SALT_LEN);

        let (sealed_ciphertext, sealed_iv, sealed_tag) =
            aead_encrypt(&message_key, req.plaintext, None)?;

        let transport_keys = Keys::generate();

        let (key_scheme, mut fragment_key) = match req.password {
            Some(password) => (
                FragmentKeyScheme::Passworded,
                kdf_password(password, &salt, DEFAULT_PBKDF2_ITERATIONS)?,
            ),
            None => {
                let secret_bytes = transport_keys.secret_key().secret_bytes();
                let mut msg = Vec::with_capacity(secret_bytes.len() + FRAGMENT_KEY_INFO.len());
                msg.extend_from_slice(&secret_bytes);
                msg.extend_from_slice(FRAGMENT_KEY_INFO);
                (FragmentKeyScheme::Passwordless, hmac_sha256(&salt, &msg))
            }
        };

        let mut share_auth_key = hkdf_derive(&fragment_key, &salt, SHARE_AUTH_INFO, 32)?;
        let shares = split(&message_key, req.n, req.k, &share_auth_key)?;
        message_key.zeroize();

        let now = now();
        let expires_at = now + req.interval_secs;
        let fragment_expiration = expires_at + FRAGMENT_EXPIRATION_BUFFER_SECS;

        let mut framed = Vec::with_capacity(shares.len());
        for share in &shares {
            let mut blob = Vec::with_capacity(1 + 32 + 32);
            blob.push(share.index);
            blob.extend_from_slice(&share.share_bytes);
            blob.extend_from_slice(&share.hmac);

            let (ciphertext, iv, auth_tag) = aead_encrypt(&fragment_key, &blob, None)?;
            blob.zeroize();

            let bytes = encode(&FragmentFields {
                switch_id,
                fragment_index: share.index,
                ciphertext,
                iv,
                auth_tag,
                kdf_salt: salt.clone(),
                kdf_iterations: DEFAULT_PBKDF2_ITERATIONS,
                expiration: fragment_expiration,
                bitcoin_txid: None,
            });
            framed.push((share.index, bytes));
        }
        fragment_key.zeroize();
        share_auth_key.zeroize();

        let switch_id_hex = hex::encode(switch_id);
        let (bitcoin_txid, events) = self
            .publish_all(
                &switch_id_hex,
                &framed,
                &transport_keys,
                &req.relays,
                fragment_expiration,
                req.min_quorum,
                req.chain_anchor,
            )
            .await?;

        let switch = Switch {
            switch_id,
            owner_id: req.owner_id,
            title: req.title,
            status: SwitchStatus::Armed,
            check_in_interval: req.interval_secs,
            expires_at,
            created_at: now,
            last_check_in_at: now,
            check_in_count: 0,
            recipients: req.recipients,
            fragment_metadata: FragmentMetadata {
                n: req.n,
                k: req.k,
                relays: req.relays,
                expiration: fragment_expiration,
                bitcoin_txid,
                kdf_salt: salt,
                kdf_iterations: DEFAULT_PBKDF2_ITERATIONS,
                key_scheme,
                events,
            },
            sealed_message: SealedMessageRecord {
                ciphertext: sealed_ciphertext,
                iv: sealed_iv,
                auth_tag: sealed_tag,
            },
            transport_keys,
        };

        self.store.insert(switch).await;
        self.store
            .record_audit(switch_id, crate::model::AuditEntry::Created { at: now })
            .await;

        Ok(switch_id)
    }

    /// Publish every framed fragment either directly (no chain anchor) or
    /// via the two-phase coordinator (Bitcoin broadcast+confirm strictly
    /// first). Returns the anchoring TXID, if any, and the per-fragment
    /// acceptance record.
    async fn publish_all(
        &self,
        switch_id_hex: &str,
        framed: &[(u8, Vec<u8>)],
        transport_keys: &Keys,
        relays: &[String],
        expiration: u64,
        min_quorum: usize,
        chain_anchor: Option<ChainAnchorRequest<'_>>,
    ) -> Result<(Option<String>, Vec<FragmentEventRef>), SwitchError> {
        let mut health = self.health.lock().await;

        if let Some(anchor) = chain_anchor {
            let mut coordinator = TwoPhaseCoordinator::new(anchor.explorer, anchor.chain_config);
            coordinator.run_phase_one(anchor.tx_hex).await?;

            let fragments: Vec<FragmentToPublish> = framed
                .iter()
                .map(|(index, bytes)| FragmentToPublish {
                    index: *index,
                    framed_bytes: bytes.clone(),
                    expiration,
                })
                .collect();

            coordinator
                .run_phase_two(
                    switch_id_hex,
                    &fragments,
                    transport_keys,
                    relays,
                    &mut health,
                    min_quorum,
                )
                .await?;

            // Phase 2 already enforced per-fragment quorum; the relay
            // breakdown itself isn't retained by the coordinator, so the
            // event record only notes that every fragment cleared quorum.
            let events = framed
                .iter()
                .map(|(index, _)| FragmentEventRef {
                    index: *index,
                    accepted_by: Vec::new(),
                })
                .collect();

            return Ok((coordinator.bitcoin_txid.clone(), events));
        }

        let mut events = Vec::with_capacity(framed.len());
        for (index, bytes) in framed {
            let result = publish_fragment(
                switch_id_hex,
                *index,
                bytes,
                transport_keys,
                relays,
                expiration,
                None,
                &mut health,
            )
            .await?;

            if !result.meets_quorum(min_quorum) {
                return Err(SwitchError::PublishQuorumNotMet {
                    success: result.success_count,
                    attempted: result.attempted,
                    needed: min_quorum,
                });
            }

            let accepted_by = result
                .per_relay
                .iter()
                .filter(|(_, outcome)| matches!(outcome, echolock_relay::PublishOutcome::Ok))
                .map(|(url, _)| url.clone())
                .collect();

            events.push(FragmentEventRef {
                index: *index,
                accepted_by,
            });
        }

        Ok((None, events))
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
