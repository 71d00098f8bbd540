//! Retrieval of all fragments published for a switch, deduplicated across
//! relays.

use std::collections::HashSet;
use std::time::Duration;

use nostr_sdk::{Client, Filter};

use crate::health::RelayHealthTracker;
use crate::{RelayError, DEFAULT_RELAY_TIMEOUT_SECS, FRAGMENT_EVENT_KIND};

/// One fragment event as retrieved from a relay, prior to framing
/// verification (left to `echolock_fragment::decode`).
#[derive(Debug, Clone)]
pub struct RetrievedFragment {
    pub event_id: String,
    pub fragment_index: Option<u8>,
    pub payload: Vec<u8>,
}

/// Query every relay in `relays` for fragments addressed to `switch_id_hex`,
/// deduplicating by `(fragment_index, event_id)`. Fragments are returned
/// in arrival order; the release pipeline performs selection.
pub async fn query_fragments(
    switch_id_hex: &str,
    relays: &[String],
    health: &mut RelayHealthTracker,
) -> Result<Vec<RetrievedFragment>, RelayError> {
    let eligible: Vec<String> = health
        .eligible(relays)
        .into_iter()
        .cloned()
        .collect();

    let mut seen: HashSet<(Option<u8>, String)> = HashSet::new();
    let mut out = Vec::new();

    for relay_url in eligible {
        match query_one(switch_id_hex, &relay_url).await {
            Ok(fragments) => {
                health.record_success(&relay_url);
                for frag in fragments {
                    let key = (frag.fragment_index, frag.event_id.clone());
                    if seen.insert(key) {
                        out.push(frag);
                    }
                }
            }
            Err(_) => {
                health.record_failure(&relay_url);
            }
        }
    }

    Ok(out)
}

async fn query_one(switch_id_hex: &str, relay_url: &str) -> Result<Vec<RetrievedFragment>, RelayError> {
    let client = Client::default();
    client
        .add_relay(relay_url)
        .await
        .map_err(|e| RelayError::ConnectFailed(relay_url.to_string(), e.to_string()))?;
    client.connect().await;

    // Relays don't support a "d = switch_id:*" prefix filter directly;
    // fetch by kind and filter the `d` tag prefix client-side.
    let filter = Filter::new().kind(nostr_sdk::Kind::Custom(FRAGMENT_EVENT_KIND));

    let events = tokio::time::timeout(
        Duration::from_secs(DEFAULT_RELAY_TIMEOUT_SECS),
        client.fetch_events(filter, Duration::from_secs(DEFAULT_RELAY_TIMEOUT_SECS)),
    )
    .await
    .map_err(|_| RelayError::QueryFailed("relay deadline exceeded".into()))?
    .map_err(|e| RelayError::QueryFailed(e.to_string()))?;

    let prefix = format!("{switch_id_hex}:");
    let mut out = Vec::new();
    for event in events.into_iter() {
        let d_tag = event
            .tags
            .iter()
            .find(|t| t.kind() == nostr_sdk::TagKind::Custom("d".into()))
            .and_then(|t| t.content());
        let Some(d_tag) = d_tag else { continue };
        if !d_tag.starts_with(&prefix) {
            continue;
        }

        let fragment_index = event
            .tags
            .iter()
            .find(|t| t.kind() == nostr_sdk::TagKind::Custom("fragment_index".into()))
            .and_then(|t| t.content())
            .and_then(|v| v.parse::<u8>().ok());

        let payload = hex::decode(event.content.as_bytes()).unwrap_or_default();

        out.push(RetrievedFragment {
            event_id: event.id.to_hex(),
            fragment_index,
            payload,
        });
    }

    client.disconnect().await;
    Ok(out)
}
