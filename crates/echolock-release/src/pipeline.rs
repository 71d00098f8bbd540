//! The eight-step release pipeline (retrieve → verify framing → decrypt
//! shares → verify shares → combine → decrypt message → deliver →
//! zeroize).

use zeroize::Zeroize;

use echolock_primitives::{aead::aead_decrypt, kdf::hkdf_derive, kdf::kdf_password, mac};
use echolock_relay::{query_fragments, RelayHealthTracker};
use echolock_sharing::{combine, AuthenticatedShare};

use crate::{Delivery, FragmentKeySource, ReleaseError, ReleaseEvent, ReleaseRequest};

const FRAGMENT_KEY_INFO: &[u8] = b"ECHOLOCK-V1-FRAGMENT-KEY";
const SHARE_AUTH_INFO: &[u8] = b"share-auth-v1";

fn derive_fragment_key(
    source: &FragmentKeySource<'_>,
    salt: &[u8],
    iterations: u32,
) -> Result<[u8; 32], ReleaseError> {
    match source {
        FragmentKeySource::Passwordless {
            transport_secret_key,
        } => {
            let mut msg = Vec::with_capacity(transport_secret_key.len() + FRAGMENT_KEY_INFO.len());
            msg.extend_from_slice(transport_secret_key);
            msg.extend_from_slice(FRAGMENT_KEY_INFO);
            Ok(mac::hmac_sha256(salt, &msg))
        }
        FragmentKeySource::Passworded { password } => {
            kdf_password(password, salt, iterations).map_err(ReleaseError::from)
        }
    }
}

/// Run the full release pipeline for one switch against `recipients`,
/// handing reconstructed plaintext to `delivery`. Returns the ordered
/// event trail even on failure paths that occur after `Started`.
pub async fn release(
    req: &ReleaseRequest<'_>,
    recipients: &[String],
    health: &mut RelayHealthTracker,
    delivery: &dyn Delivery,
) -> Result<Vec<ReleaseEvent>, ReleaseError> {
    let switch_id_hex = hex::encode(req.switch_id);
    let mut events = vec![ReleaseEvent::Started {
        switch_id: switch_id_hex.clone(),
    }];

    let run = run_inner(req, recipients, health, delivery, &mut events).await;

    if let Err(ref e) = run {
        events.push(ReleaseEvent::Failed {
            reason: e.to_string(),
        });
    }

    run.map(|()| events)
}

async fn run_inner(
    req: &ReleaseRequest<'_>,
    recipients: &[String],
    health: &mut RelayHealthTracker,
    delivery: &dyn Delivery,
    events: &mut Vec<ReleaseEvent>,
) -> Result<(), ReleaseError> {
    let switch_id_hex = hex::encode(req.switch_id);

    // Step 1: retrieve.
    let retrieved = query_fragments(&switch_id_hex, &req.relays, health).await?;

    // Step 3 needs K_f up front to attempt decryption of every candidate.
    let mut fragment_key = derive_fragment_key(&req.fragment_key, &req.kdf_salt, req.kdf_iterations)?;
    let mut share_auth_key = hkdf_derive(&fragment_key, &req.kdf_salt, SHARE_AUTH_INFO, 32)?;

    let mut shares: Vec<AuthenticatedShare> = Vec::new();

    for candidate in &retrieved {
        // Step 2: verify framing.
        let fragment = match echolock_fragment::decode(&candidate.payload) {
            Ok(f) => f,
            Err(_) => continue,
        };

        // Step 3: decrypt the share.
        let plain = match aead_decrypt(
            &fragment_key,
            &fragment.fields.ciphertext,
            &fragment.fields.iv,
            &fragment.fields.auth_tag,
            None,
        ) {
            Ok(p) => p,
            Err(_) => continue,
        };

        if plain.len() != 1 + echolock_sharing::SHARE_LEN + mac::MAC_LEN {
            continue;
        }
        let embedded_index = plain[0];
        if embedded_index != fragment.fields.fragment_index {
            continue;
        }

        // Step 4: verify the embedded HMAC before trusting the share.
        let share_bytes_slice = &plain[1..1 + echolock_sharing::SHARE_LEN];
        let hmac_slice = &plain[1 + echolock_sharing::SHARE_LEN..];
        let mut hmac_input = Vec::with_capacity(1 + echolock_sharing::SHARE_LEN);
        hmac_input.push(embedded_index);
        hmac_input.extend_from_slice(share_bytes_slice);
        if !mac::verify_hmac(&share_auth_key, &hmac_input, hmac_slice) {
            continue;
        }

        let mut share_bytes = [0u8; echolock_sharing::SHARE_LEN];
        share_bytes.copy_from_slice(share_bytes_slice);
        let mut hmac = [0u8; mac::MAC_LEN];
        hmac.copy_from_slice(hmac_slice);

        shares.push(AuthenticatedShare {
            index: embedded_index,
            share_bytes,
            hmac,
        });
    }

    if shares.len() < req.k as usize {
        fragment_key.zeroize();
        share_auth_key.zeroize();
        return Err(ReleaseError::InsufficientShares {
            got: shares.len(),
            needed: req.k as usize,
        });
    }

    // Step 5: threshold combine.
    let mut message_key = combine(&shares, &share_auth_key, req.k).map_err(ReleaseError::Combine)?;
    fragment_key.zeroize();
    share_auth_key.zeroize();

    // Step 6: decrypt the sealed message. Any tag failure here is fatal.
    let plaintext = aead_decrypt(
        &message_key,
        &req.sealed_ciphertext,
        &req.sealed_iv,
        &req.sealed_tag,
        None,
    )
    .map_err(|_| ReleaseError::MessageAuthFailure);
    message_key.zeroize();
    let mut plaintext = plaintext?;

    // Step 7: deliver.
    for recipient in recipients {
        events.push(ReleaseEvent::Attempt {
            recipient: recipient.clone(),
        });
        match delivery.deliver(recipient, &plaintext) {
            Ok(()) => events.push(ReleaseEvent::Delivered {
                recipient: recipient.clone(),
                medium: "logging".to_string(),
            }),
            Err(reason) => {
                plaintext.zeroize();
                return Err(ReleaseError::DeliveryFailed {
                    recipient: recipient.clone(),
                    reason,
                });
            }
        }
    }

    // Step 8: zeroize.
    plaintext.zeroize();
    Ok(())
}
