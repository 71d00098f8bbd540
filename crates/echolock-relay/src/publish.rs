//! Parallel fan-out publication of a fragment to every relay in a pool.

use std::collections::HashMap;
use std::time::Duration;

use nostr_sdk::{Client, EventBuilder, Keys, Kind, Tag, TagKind};

use crate::health::RelayHealthTracker;
use crate::{addressable_id, RelayError, DEFAULT_RELAY_TIMEOUT_SECS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Ok,
    Failed(String),
}

/// Outcome of one `publish_fragment` call. Mixed per-relay outcomes are
/// never collapsed into a single verdict; `success_count >= quorum` is
/// the caller's signal, not an all-or-nothing boolean.
#[derive(Debug, Clone)]
pub struct PublishResult {
    pub success_count: usize,
    pub attempted: usize,
    pub per_relay: HashMap<String, PublishOutcome>,
}

impl PublishResult {
    pub fn meets_quorum(&self, quorum: usize) -> bool {
        self.success_count >= quorum
    }
}

/// Publish a fragment payload to every relay in `relays`, tagged so that
/// it is addressable as `(switch_id, fragment_index)` and discarded by
/// relays once `expiration` passes (NIP-40 honors this by convention,
/// not enforcement — an adversarial relay may retain it regardless).
pub async fn publish_fragment(
    switch_id_hex: &str,
    fragment_index: u8,
    fragment_bytes: &[u8],
    transport_key: &Keys,
    relays: &[String],
    expiration: u64,
    bitcoin_txid: Option<&str>,
    health: &mut RelayHealthTracker,
) -> Result<PublishResult, RelayError> {
    let content = hex::encode(fragment_bytes);

    let mut tags = vec![
        Tag::custom(
            TagKind::Custom("d".into()),
            vec![addressable_id(switch_id_hex, fragment_index)],
        ),
        Tag::custom(
            TagKind::Custom("fragment_index".into()),
            vec![fragment_index.to_string()],
        ),
        Tag::custom(
            TagKind::Custom("expiration".into()),
            vec![expiration.to_string()],
        ),
        Tag::custom(
            TagKind::Custom("version".into()),
            vec![echolock_fragment::CURRENT_VERSION.to_string()],
        ),
    ];
    if let Some(txid) = bitcoin_txid {
        tags.push(Tag::custom(
            TagKind::Custom("bitcoin".into()),
            vec![txid.to_string()],
        ));
    }

    let event = EventBuilder::new(Kind::Custom(crate::FRAGMENT_EVENT_KIND), content)
        .tags(tags)
        .sign_with_keys(transport_key)
        .map_err(|e| RelayError::SignFailed(e.to_string()))?;

    let eligible = health.eligible(relays);
    let attempted = eligible.len();
    let mut per_relay = HashMap::new();

    let publishes = eligible.into_iter().map(|relay_url| {
        let event = event.clone();
        let relay_url = relay_url.clone();
        async move {
            let outcome = publish_to_one(&relay_url, &event).await;
            (relay_url, outcome)
        }
    });

    let results = futures::future::join_all(publishes).await;

    let mut success_count = 0;
    for (relay_url, outcome) in results {
        match &outcome {
            PublishOutcome::Ok => {
                success_count += 1;
                health.record_success(&relay_url);
            }
            PublishOutcome::Failed(_) => {
                health.record_failure(&relay_url);
            }
        }
        per_relay.insert(relay_url, outcome);
    }

    Ok(PublishResult {
        success_count,
        attempted,
        per_relay,
    })
}

async fn publish_to_one(relay_url: &str, event: &nostr_sdk::Event) -> PublishOutcome {
    let client = Client::default();

    if let Err(e) = client.add_relay(relay_url).await {
        return PublishOutcome::Failed(format!("add_relay failed: {e}"));
    }
    client.connect().await;

    let send = tokio::time::timeout(
        Duration::from_secs(DEFAULT_RELAY_TIMEOUT_SECS),
        client.send_event(event),
    )
    .await;

    let outcome = match send {
        Ok(Ok(_)) => PublishOutcome::Ok,
        Ok(Err(e)) => PublishOutcome::Failed(e.to_string()),
        Err(_) => PublishOutcome::Failed("relay deadline exceeded".into()),
    };

    client.disconnect().await;
    outcome
}
