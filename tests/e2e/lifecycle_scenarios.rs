//! Cross-crate lifecycle scenarios that don't require real relay or
//! explorer network access. Full end-to-end release through real relays
//! is covered by `live_relay_smoke.rs`, gated behind `--ignored`.

use echolock_fragment::{decode, encode, FragmentFields};
use echolock_primitives::{
    aead::{aead_decrypt, aead_encrypt},
    kdf::{hkdf_derive, kdf_password, DEFAULT_PBKDF2_ITERATIONS},
    mac::{hmac_sha256, verify_hmac, MAC_LEN},
    random::secure_random,
};
use echolock_sharing::{combine, split, AuthenticatedShare, SHARE_LEN};
use echolock_release::LoggingDelivery;
use echolock_switch::{
    CreateRequest, FragmentKeyScheme, RecipientRef, SwitchError, SwitchLifecycle, SwitchStatus,
};

const SHARE_AUTH_INFO: &[u8] = b"share-auth-v1";
const FRAGMENT_KEY_INFO: &[u8] = b"ECHOLOCK-V1-FRAGMENT-KEY";

struct Sealed {
    switch_id: [u8; 16],
    message_key: [u8; 32],
    fragment_key: [u8; 32],
    share_auth_key: Vec<u8>,
    framed: Vec<(u8, Vec<u8>)>,
    sealed_ciphertext: Vec<u8>,
    sealed_iv: [u8; 12],
    sealed_tag: [u8; 16],
}

/// Build a sealed message plus `n` framed fragments, mirroring exactly
/// what `echolock-switch::create` does, for a passwordless switch.
fn seal(plaintext: &[u8], n: u8, k: u8, switch_id: [u8; 16]) -> Sealed {
    let message_key: [u8; 32] = secure_random(32).try_into().unwrap();
    let transport_secret: [u8; 32] = secure_random(32).try_into().unwrap();
    let salt = secure_random(16);

    let (sealed_ciphertext, sealed_iv, sealed_tag) =
        aead_encrypt(&message_key, plaintext, None).unwrap();

    let mut msg = Vec::new();
    msg.extend_from_slice(&transport_secret);
    msg.extend_from_slice(FRAGMENT_KEY_INFO);
    let fragment_key = hmac_sha256(&salt, &msg);

    let share_auth_key = hkdf_derive(&fragment_key, &salt, SHARE_AUTH_INFO, 32).unwrap();
    let shares = split(&message_key, n, k, &share_auth_key).unwrap();

    let framed = shares
        .iter()
        .map(|share| {
            let mut blob = Vec::with_capacity(1 + SHARE_LEN + MAC_LEN);
            blob.push(share.index);
            blob.extend_from_slice(&share.share_bytes);
            blob.extend_from_slice(&share.hmac);
            let (ciphertext, iv, auth_tag) = aead_encrypt(&fragment_key, &blob, None).unwrap();
            let bytes = encode(&FragmentFields {
                switch_id,
                fragment_index: share.index,
                ciphertext,
                iv,
                auth_tag,
                kdf_salt: salt.clone(),
                kdf_iterations: DEFAULT_PBKDF2_ITERATIONS,
                expiration: 9_999_999_999,
                bitcoin_txid: None,
            });
            (share.index, bytes)
        })
        .collect();

    Sealed {
        switch_id,
        message_key,
        fragment_key,
        share_auth_key,
        framed,
        sealed_ciphertext,
        sealed_iv,
        sealed_tag,
    }
}

/// Decode, decrypt, and HMAC-verify every fragment in `candidates`, then
/// combine the survivors. Mirrors `echolock-release`'s pipeline steps
/// 2-5 using only the public crate surface.
fn recover_message_key(
    sealed: &Sealed,
    candidates: &[Vec<u8>],
    k: u8,
) -> Result<[u8; 32], &'static str> {
    let mut shares = Vec::new();
    for bytes in candidates {
        let Ok(fragment) = decode(bytes) else { continue };
        let Ok(plain) = aead_decrypt(
            &sealed.fragment_key,
            &fragment.fields.ciphertext,
            &fragment.fields.iv,
            &fragment.fields.auth_tag,
            None,
        ) else {
            continue;
        };
        if plain.len() != 1 + SHARE_LEN + MAC_LEN {
            continue;
        }
        let idx = plain[0];
        let share_bytes = &plain[1..1 + SHARE_LEN];
        let hmac_bytes = &plain[1 + SHARE_LEN..];
        let mut hmac_input = vec![idx];
        hmac_input.extend_from_slice(share_bytes);
        if !verify_hmac(&sealed.share_auth_key, &hmac_input, hmac_bytes) {
            continue;
        }
        let mut sb = [0u8; SHARE_LEN];
        sb.copy_from_slice(share_bytes);
        let mut hm = [0u8; MAC_LEN];
        hm.copy_from_slice(hmac_bytes);
        shares.push(AuthenticatedShare {
            index: idx,
            share_bytes: sb,
            hmac: hm,
        });
    }

    if shares.len() < k as usize {
        return Err("insufficient shares");
    }
    combine(&shares, &sealed.share_auth_key, k).map_err(|_| "combine failed")
}

#[test]
fn happy_path_full_quorum_recovers_original_message() {
    let plaintext = b"the vault combination is 7-21-3";
    let sealed = seal(plaintext, 7, 4, [1u8; 16]);

    let candidates: Vec<Vec<u8>> = sealed.framed.iter().map(|(_, b)| b.clone()).collect();
    let recovered_key = recover_message_key(&sealed, &candidates, 4).unwrap();
    assert_eq!(recovered_key, sealed.message_key);

    let decrypted = aead_decrypt(
        &recovered_key,
        &sealed.sealed_ciphertext,
        &sealed.sealed_iv,
        &sealed.sealed_tag,
        None,
    )
    .unwrap();
    assert_eq!(decrypted, plaintext);
}

#[test]
fn quorum_with_losses_still_recovers() {
    let plaintext = b"backup keys are in the safe deposit box";
    let sealed = seal(plaintext, 7, 4, [2u8; 16]);

    // Three of seven relays "lost" their fragment; four survive, meeting K.
    let candidates: Vec<Vec<u8>> = sealed
        .framed
        .iter()
        .filter(|(idx, _)| *idx <= 4)
        .map(|(_, b)| b.clone())
        .collect();
    assert_eq!(candidates.len(), 4);

    let recovered_key = recover_message_key(&sealed, &candidates, 4).unwrap();
    assert_eq!(recovered_key, sealed.message_key);
}

#[test]
fn below_threshold_surfaces_insufficient_shares() {
    let sealed = seal(b"never recovered", 7, 5, [3u8; 16]);

    let candidates: Vec<Vec<u8>> = sealed
        .framed
        .iter()
        .filter(|(idx, _)| *idx <= 3)
        .map(|(_, b)| b.clone())
        .collect();
    assert_eq!(candidates.len(), 3);

    let result = recover_message_key(&sealed, &candidates, 5);
    assert_eq!(result, Err("insufficient shares"));
}

#[test]
fn tampered_fragment_ciphertext_is_discarded_not_fatal() {
    let plaintext = b"tamper resistance check";
    let mut sealed = seal(plaintext, 7, 4, [4u8; 16]);

    // Flip a byte in one fragment's on-wire bytes; it must fail to
    // decode/decrypt and be silently dropped rather than aborting
    // the whole recovery, as long as K others still verify.
    let corrupted_len = sealed.framed[0].1.len();
    sealed.framed[0].1[corrupted_len - 1] ^= 0xFF;

    let candidates: Vec<Vec<u8>> = sealed.framed.iter().map(|(_, b)| b.clone()).collect();
    let recovered_key = recover_message_key(&sealed, &candidates, 4).unwrap();
    assert_eq!(recovered_key, sealed.message_key);
}

#[test]
fn wrong_password_never_produces_the_original_key() {
    let message_key: [u8; 32] = secure_random(32).try_into().unwrap();
    let salt = secure_random(16);
    let right = kdf_password(b"correct horse battery staple", &salt, DEFAULT_PBKDF2_ITERATIONS).unwrap();
    let wrong = kdf_password(b"incorrect", &salt, DEFAULT_PBKDF2_ITERATIONS).unwrap();
    assert_ne!(right, wrong);

    let share_auth_key = hkdf_derive(&right, &salt, SHARE_AUTH_INFO, 32).unwrap();
    let shares = split(&message_key, 5, 3, &share_auth_key).unwrap();

    let wrong_share_auth_key = hkdf_derive(&wrong, &salt, SHARE_AUTH_INFO, 32).unwrap();
    for share in &shares[..3] {
        let mut hmac_input = vec![share.index];
        hmac_input.extend_from_slice(&share.share_bytes);
        assert!(!verify_hmac(&wrong_share_auth_key, &hmac_input, &share.hmac));
    }
}

/// A switch's own check-in resets its deadline, so a scan that would
/// otherwise trigger it leaves it armed.
#[tokio::test]
async fn check_in_saves_an_otherwise_expiring_switch() {
    let lifecycle = SwitchLifecycle::new();

    // `create` needs at least one reachable relay to meet the default
    // publish quorum, so this scenario builds the switch state directly
    // the way `echolock-switch`'s own unit tests do, rather than
    // round-tripping through real relay I/O.
    let switch_id = [9u8; 16];
    let req = CreateRequest {
        owner_id: "owner".to_string(),
        title: "test".to_string(),
        plaintext: b"payload",
        interval_secs: 100,
        recipients: vec![RecipientRef {
            id: "heir@example.com".to_string(),
            label: None,
        }],
        n: 5,
        k: 3,
        relays: vec![],
        min_quorum: 0,
        password: None,
        chain_anchor: None,
    };
    let created = lifecycle.create(req).await.unwrap();
    assert_ne!(created, switch_id); // random id, just documenting the shape

    let switch = lifecycle.store.get(created).await.unwrap();
    assert_eq!(switch.status, SwitchStatus::Armed);
    assert_eq!(switch.fragment_metadata.key_scheme, FragmentKeyScheme::Passwordless);

    let almost_expired = switch.expires_at - 1;
    lifecycle.check_in(created, almost_expired).await.unwrap();

    let refreshed = lifecycle.store.get(created).await.unwrap();
    assert!(refreshed.expires_at > switch.expires_at);
}

/// An admin-driven manual-release call is rejected against an armed
/// switch and only accepted once the switch has actually triggered.
#[tokio::test]
async fn manual_release_requires_a_triggered_switch() {
    let lifecycle = SwitchLifecycle::new();

    let req = CreateRequest {
        owner_id: "owner".to_string(),
        title: "test".to_string(),
        plaintext: b"payload",
        interval_secs: 100,
        recipients: vec![RecipientRef {
            id: "heir@example.com".to_string(),
            label: None,
        }],
        n: 5,
        k: 3,
        relays: vec![],
        min_quorum: 0,
        password: None,
        chain_anchor: None,
    };
    let switch_id = lifecycle.create(req).await.unwrap();
    let delivery = LoggingDelivery;

    let rejected = lifecycle
        .manual_release(switch_id, 0, &delivery, &Default::default())
        .await
        .unwrap_err();
    assert!(matches!(rejected, SwitchError::NotTriggered));

    let switch = lifecycle.store.get(switch_id).await.unwrap();
    let past_deadline = switch.expires_at;
    let reports = lifecycle.timer_tick(past_deadline, &delivery, &Default::default()).await;
    assert!(!reports.is_empty());

    let triggered_status = lifecycle.store.get(switch_id).await.unwrap().status;
    assert_eq!(triggered_status, SwitchStatus::Triggered);

    // Now manual release is accepted — it runs the pipeline rather than
    // being refused outright. With no relays to retrieve fragments from,
    // the pipeline itself still fails, but that's a different error path
    // than the `NotTriggered` authorization rejection above.
    let accepted = lifecycle
        .manual_release(switch_id, past_deadline, &delivery, &Default::default())
        .await
        .unwrap();
    assert!(!matches!(accepted, echolock_switch::ReleaseReport::StillArmed { .. }));
}
