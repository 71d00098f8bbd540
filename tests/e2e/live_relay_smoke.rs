//! Live smoke test against public Nostr relays.
//!
//! Requires network access and is never run by default.
//! Run with: cargo test --test live_relay_smoke -- --ignored

use echolock_release::{release, FragmentKeySource, LoggingDelivery, ReleaseRequest};
use echolock_relay::RelayHealthTracker;
use echolock_switch::{CreateRequest, RecipientRef, SwitchLifecycle};

const PUBLIC_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.nostr.band",
];

/// Publish a switch's fragments to real public relays, then run the full
/// release pipeline against the same relays and recover the original
/// message. Exercises the network path `create()` deliberately skips in
/// every other test in this crate.
#[tokio::test]
#[ignore = "requires network access"]
async fn publish_and_release_round_trip_against_public_relays() {
    let lifecycle = SwitchLifecycle::new();

    let plaintext = b"live relay smoke test payload";
    let req = CreateRequest {
        owner_id: "smoke-test-owner".to_string(),
        title: "live relay smoke".to_string(),
        plaintext,
        interval_secs: 3600,
        recipients: vec![RecipientRef {
            id: "smoke-test-recipient".to_string(),
            label: None,
        }],
        n: 3,
        k: 2,
        relays: PUBLIC_RELAYS.iter().map(|s| s.to_string()).collect(),
        min_quorum: 1,
        password: None,
        chain_anchor: None,
    };

    let switch_id = lifecycle
        .create(req)
        .await
        .expect("create should publish to at least one public relay");

    let switch = lifecycle
        .store
        .get(switch_id)
        .await
        .expect("just-created switch must be in the store");

    let secret_key_bytes = switch.transport_keys.secret_key().secret_bytes();
    let request = ReleaseRequest {
        switch_id,
        k: switch.fragment_metadata.k,
        relays: switch.fragment_metadata.relays.clone(),
        kdf_salt: switch.fragment_metadata.kdf_salt.clone(),
        kdf_iterations: switch.fragment_metadata.kdf_iterations,
        fragment_key: FragmentKeySource::Passwordless {
            transport_secret_key: &secret_key_bytes,
        },
        sealed_ciphertext: switch.sealed_message.ciphertext.clone(),
        sealed_iv: switch.sealed_message.iv,
        sealed_tag: switch.sealed_message.auth_tag,
    };

    let mut health = RelayHealthTracker::default();
    let delivery = LoggingDelivery;
    let events = release(&request, &["smoke-test-recipient".to_string()], &mut health, &delivery)
        .await
        .expect("release should recover the sealed message from the public relays");

    assert!(!events.is_empty(), "release should report at least one delivery event");
    println!("✓ published and released a switch against public relays");
}

/// A switch with an unreachable relay set still surfaces a descriptive
/// quorum error rather than hanging or panicking.
#[tokio::test]
#[ignore = "requires network access"]
async fn unreachable_relay_surfaces_quorum_error_not_a_hang() {
    let lifecycle = SwitchLifecycle::new();

    let req = CreateRequest {
        owner_id: "smoke-test-owner".to_string(),
        title: "unreachable relay".to_string(),
        plaintext: b"never delivered",
        interval_secs: 3600,
        recipients: vec![RecipientRef {
            id: "recipient".to_string(),
            label: None,
        }],
        n: 3,
        k: 2,
        relays: vec!["wss://127.0.0.1:1".to_string()],
        min_quorum: 1,
        password: None,
        chain_anchor: None,
    };

    let result = lifecycle.create(req).await;
    assert!(result.is_err(), "an unreachable relay pool must not satisfy a nonzero quorum");
    println!("✓ unreachable relay pool fails fast with a quorum error");
}
