//! Versioned, self-describing codec for the payload stored at a relay.
//!
//! Historically the ciphertext, IV, auth tag, KDF salt and iteration count
//! were stored as separate items. Desynchronizing any two of them (an IV
//! paired with the wrong ciphertext) still passed the AEAD tag check but
//! produced garbage plaintext. Framing every field into one hashed payload
//! turns that failure mode into a detectable, typed error at decode time.

use sha2::{Digest, Sha256};
use thiserror::Error;

use echolock_primitives::kind::ErrorKind;

pub const CURRENT_VERSION: u8 = 1;
pub const SWITCH_ID_LEN: usize = 16;
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const TXID_LEN: usize = 32;
pub const HASH_LEN: usize = 32;
pub const MIN_SALT_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum FragmentError {
    #[error("unsupported fragment version: {0}")]
    UnsupportedVersion(u8),
    #[error("payload truncated: missing field {0}")]
    MissingField(&'static str),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("integrity hash mismatch")]
    IntegrityFailure,
}

impl FragmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FragmentError::UnsupportedVersion(_) => ErrorKind::Permanent,
            FragmentError::MissingField(_) | FragmentError::MalformedPayload(_) => {
                ErrorKind::Permanent
            }
            FragmentError::IntegrityFailure => ErrorKind::AuthFailure,
        }
    }
}

/// The fields that make up one fragment, before framing. One fragment
/// encrypts exactly one authenticated share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentFields {
    pub switch_id: [u8; SWITCH_ID_LEN],
    pub fragment_index: u8,
    pub ciphertext: Vec<u8>,
    pub iv: [u8; IV_LEN],
    pub auth_tag: [u8; TAG_LEN],
    pub kdf_salt: Vec<u8>,
    pub kdf_iterations: u32,
    pub expiration: u64,
    pub bitcoin_txid: Option<[u8; TXID_LEN]>,
}

/// A decoded, integrity-verified fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub version: u8,
    pub fields: FragmentFields,
    pub integrity_hash: [u8; HASH_LEN],
}

fn hash_input(version: u8, fields: &FragmentFields) -> Vec<u8> {
    let mut buf = Vec::with_capacity(
        1 + SWITCH_ID_LEN + 1 + 4 + fields.ciphertext.len() + IV_LEN + TAG_LEN + 4 + fields.kdf_salt.len() + 4 + 8 + 1 + TXID_LEN,
    );
    buf.push(version);
    buf.extend_from_slice(&fields.switch_id);
    buf.push(fields.fragment_index);
    buf.extend_from_slice(&(fields.ciphertext.len() as u32).to_le_bytes());
    buf.extend_from_slice(&fields.ciphertext);
    buf.extend_from_slice(&fields.iv);
    buf.extend_from_slice(&fields.auth_tag);
    buf.extend_from_slice(&(fields.kdf_salt.len() as u32).to_le_bytes());
    buf.extend_from_slice(&fields.kdf_salt);
    buf.extend_from_slice(&fields.kdf_iterations.to_le_bytes());
    buf.extend_from_slice(&fields.expiration.to_le_bytes());
    match fields.bitcoin_txid {
        Some(txid) => {
            buf.push(1);
            buf.extend_from_slice(&txid);
        }
        None => {
            buf.push(0);
            buf.extend_from_slice(&[0u8; TXID_LEN]);
        }
    }
    buf
}

/// Build the on-wire payload: every field in a fixed order, followed by
/// `SHA-256` over everything preceding it. Encoding is deterministic.
pub fn encode(fields: &FragmentFields) -> Vec<u8> {
    let body = hash_input(CURRENT_VERSION, fields);
    let hash = Sha256::digest(&body);

    let mut out = body;
    out.extend_from_slice(&hash);
    out
}

/// Parse and verify a fragment payload. Rejects an unknown version,
/// truncated input, malformed length fields, or a mismatched integrity
/// hash without ever exposing partial plaintext from a later stage.
pub fn decode(bytes: &[u8]) -> Result<Fragment, FragmentError> {
    let mut cursor = 0usize;

    let version = read_u8(bytes, &mut cursor, "version")?;
    if version != CURRENT_VERSION {
        return Err(FragmentError::UnsupportedVersion(version));
    }

    let switch_id = read_array::<SWITCH_ID_LEN>(bytes, &mut cursor, "switch_id")?;
    let fragment_index = read_u8(bytes, &mut cursor, "fragment_index")?;
    let ciphertext = read_vec(bytes, &mut cursor, "ciphertext")?;
    let iv = read_array::<IV_LEN>(bytes, &mut cursor, "iv")?;
    let auth_tag = read_array::<TAG_LEN>(bytes, &mut cursor, "auth_tag")?;
    let kdf_salt = read_vec(bytes, &mut cursor, "kdf_salt")?;
    if kdf_salt.len() < MIN_SALT_LEN {
        return Err(FragmentError::MalformedPayload(format!(
            "kdf_salt shorter than {MIN_SALT_LEN} bytes"
        )));
    }
    let kdf_iterations = read_u32(bytes, &mut cursor, "kdf_iterations")?;
    let expiration = read_u64(bytes, &mut cursor, "expiration")?;
    let txid_present = read_u8(bytes, &mut cursor, "bitcoin_txid_flag")?;
    let txid_bytes = read_array::<TXID_LEN>(bytes, &mut cursor, "bitcoin_txid")?;
    let bitcoin_txid = match txid_present {
        0 => None,
        1 => Some(txid_bytes),
        other => {
            return Err(FragmentError::MalformedPayload(format!(
                "bitcoin_txid_flag must be 0 or 1, got {other}"
            )))
        }
    };

    let integrity_hash = read_array::<HASH_LEN>(bytes, &mut cursor, "integrity_hash")?;

    if cursor != bytes.len() {
        return Err(FragmentError::MalformedPayload(
            "trailing bytes after integrity_hash".into(),
        ));
    }

    let fields = FragmentFields {
        switch_id,
        fragment_index,
        ciphertext,
        iv,
        auth_tag,
        kdf_salt,
        kdf_iterations,
        expiration,
        bitcoin_txid,
    };

    let expected = Sha256::digest(hash_input(version, &fields));
    if expected.as_slice() != integrity_hash {
        return Err(FragmentError::IntegrityFailure);
    }

    Ok(Fragment {
        version,
        fields,
        integrity_hash,
    })
}

fn read_u8(bytes: &[u8], cursor: &mut usize, field: &'static str) -> Result<u8, FragmentError> {
    let b = *bytes.get(*cursor).ok_or(FragmentError::MissingField(field))?;
    *cursor += 1;
    Ok(b)
}

fn read_array<const N: usize>(
    bytes: &[u8],
    cursor: &mut usize,
    field: &'static str,
) -> Result<[u8; N], FragmentError> {
    let slice = bytes
        .get(*cursor..*cursor + N)
        .ok_or(FragmentError::MissingField(field))?;
    *cursor += N;
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    Ok(out)
}

fn read_u32(bytes: &[u8], cursor: &mut usize, field: &'static str) -> Result<u32, FragmentError> {
    Ok(u32::from_le_bytes(read_array::<4>(bytes, cursor, field)?))
}

fn read_u64(bytes: &[u8], cursor: &mut usize, field: &'static str) -> Result<u64, FragmentError> {
    Ok(u64::from_le_bytes(read_array::<8>(bytes, cursor, field)?))
}

fn read_vec(bytes: &[u8], cursor: &mut usize, field: &'static str) -> Result<Vec<u8>, FragmentError> {
    let len = read_u32(bytes, cursor, field)? as usize;
    let slice = bytes
        .get(*cursor..*cursor + len)
        .ok_or(FragmentError::MissingField(field))?;
    *cursor += len;
    Ok(slice.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fields() -> FragmentFields {
        FragmentFields {
            switch_id: [7u8; SWITCH_ID_LEN],
            fragment_index: 2,
            ciphertext: vec![1, 2, 3, 4, 5],
            iv: [9u8; IV_LEN],
            auth_tag: [8u8; TAG_LEN],
            kdf_salt: vec![3u8; 16],
            kdf_iterations: 600_000,
            expiration: 1_893_456_000,
            bitcoin_txid: Some([5u8; TXID_LEN]),
        }
    }

    #[test]
    fn roundtrip() {
        let fields = sample_fields();
        let encoded = encode(&fields);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.version, CURRENT_VERSION);
        assert_eq!(decoded.fields, fields);
    }

    #[test]
    fn roundtrip_without_bitcoin_txid() {
        let mut fields = sample_fields();
        fields.bitcoin_txid = None;
        let encoded = encode(&fields);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.fields.bitcoin_txid, None);
    }

    #[test]
    fn flipping_any_byte_causes_integrity_failure() {
        let fields = sample_fields();
        let encoded = encode(&fields);

        for i in 0..encoded.len() {
            let mut tampered = encoded.clone();
            tampered[i] ^= 0x01;
            let result = decode(&tampered);
            assert!(
                result.is_err(),
                "byte {i} flip should have been rejected, got {:?}",
                result
            );
        }
    }

    #[test]
    fn rejects_unsupported_version() {
        let fields = sample_fields();
        let mut encoded = encode(&fields);
        encoded[0] = 99;
        // version check happens before the hash is recomputed
        assert!(matches!(
            decode(&encoded),
            Err(FragmentError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn rejects_truncated_payload() {
        let fields = sample_fields();
        let encoded = encode(&fields);
        let truncated = &encoded[..encoded.len() - 40];
        assert!(matches!(
            decode(truncated),
            Err(FragmentError::MissingField(_)) | Err(FragmentError::MalformedPayload(_))
        ));
    }

    #[test]
    fn rejects_short_kdf_salt() {
        let mut fields = sample_fields();
        fields.kdf_salt = vec![1u8; 4];
        let encoded = encode(&fields);
        assert!(matches!(
            decode(&encoded),
            Err(FragmentError::MalformedPayload(_))
        ));
    }

    #[test]
    fn rejects_trailing_garbage() {
        let fields = sample_fields();
        let mut encoded = encode(&fields);
        encoded.push(0xFF);
        assert!(matches!(
            decode(&encoded),
            Err(FragmentError::MalformedPayload(_))
        ));
    }

    #[test]
    fn encoding_is_deterministic() {
        let fields = sample_fields();
        assert_eq!(encode(&fields), encode(&fields));
    }
}
