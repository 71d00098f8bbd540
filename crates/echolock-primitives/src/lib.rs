//! Cryptographic primitives for the echolock release engine.
//!
//! Every higher layer (sharing, fragment codec, coordinator, release
//! pipeline) builds exclusively on the operations exposed here. No other
//! crate in the workspace is permitted to reach for a raw AEAD, KDF or MAC
//! construction directly — this is the only place key material is touched
//! at the byte level.

pub mod aead;
pub mod kdf;
pub mod kind;
pub mod mac;
pub mod memory;
pub mod random;

pub use aead::{aead_decrypt, aead_encrypt, AeadError, AEAD_KEY_LEN, IV_LEN, TAG_LEN};
pub use kdf::{hkdf_derive, kdf_password, KdfError, DEFAULT_PBKDF2_ITERATIONS};
pub use kind::ErrorKind;
pub use mac::{hmac_sha256, verify_hmac, MAC_LEN};
pub use random::secure_random;
