//! Per-session secure channels with authenticated symmetric encryption.

use dashmap::DashMap;
use log::debug;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::core::error::{ProtocolError, ProtocolResult};

/// Algorithm tag carried in the payload envelope
pub const ALGORITHM_TAG: &str = "aes-256-gcm";

const KEY_LEN: usize = 32;

/// A per-session symmetric key. The raw bytes are exposed only through
/// [`ChannelKey::as_bytes`] for the external distribution mechanism;
/// the channel itself keeps its own copy.
#[derive(Clone)]
pub struct ChannelKey([u8; KEY_LEN]);

impl ChannelKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        write!(f, "ChannelKey(..)")
    }
}

/// Wire envelope for an encrypted payload.
///
/// Field names and hex encoding are the interoperability contract;
/// the ciphertext carries the GCM tag appended to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub ciphertext: String,
    pub nonce: String,
    pub algorithm: String,
    pub sensitivity_level: u32,
    /// Effective strength used: max(configured, sensitivity).
    /// Informational; peers that omit it still parse.
    #[serde(default)]
    pub strength: u32,
}

/// Generates per-session keys and performs authenticated
/// encryption/decryption of JSON payloads.
///
/// Every encryption call draws a fresh random nonce, so nonces never
/// repeat for a given key by construction.
pub struct SecureChannel {
    keys: DashMap<String, ChannelKey>,
    rng: SystemRandom,
    configured_strength: u32,
}

impl SecureChannel {
    pub fn new(configured_strength: u32) -> Self {
        Self {
            keys: DashMap::new(),
            rng: SystemRandom::new(),
            configured_strength,
        }
    }

    /// Generate a fresh random 256-bit key scoped to the session.
    ///
    /// Re-provisioning a session replaces its key, invalidating any
    /// envelope produced under the old one.
    pub fn provision(&self, session_id: &str) -> ProtocolResult<ChannelKey> {
        let mut key_bytes = [0u8; KEY_LEN];
        self.rng
            .fill(&mut key_bytes)
            .map_err(|_| ProtocolError::CryptoError("key generation failed".to_string()))?;

        let key = ChannelKey(key_bytes);
        self.keys.insert(session_id.to_string(), key.clone());
        debug!("Provisioned channel key for session {}", session_id);
        Ok(key)
    }

    /// Whether a channel key is bound to the session
    pub fn is_provisioned(&self, session_id: &str) -> bool {
        self.keys.contains_key(session_id)
    }

    /// Discard a session's key. Envelopes for that session can no
    /// longer be decrypted.
    pub fn close(&self, session_id: &str) {
        self.keys.remove(session_id);
    }

    /// Encrypt a payload at the requested sensitivity level.
    ///
    /// The effective strength is `max(configured, sensitivity)` so a
    /// high-sensitivity payload can never be weakened by a lower
    /// configured default.
    pub fn encrypt(
        &self,
        session_id: &str,
        payload: &JsonValue,
        sensitivity_level: u32,
    ) -> ProtocolResult<Envelope> {
        let key = self.key_for(session_id)?;
        let strength = self.configured_strength.max(sensitivity_level);

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| ProtocolError::CryptoError("nonce generation failed".to_string()))?;

        let sealing_key = Self::aead_key(&key)?;
        let mut in_out = serde_json::to_vec(payload)?;
        sealing_key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| ProtocolError::CryptoError("encryption failed".to_string()))?;

        debug!(
            "Encrypted payload for session {} at sensitivity {} (strength {})",
            session_id, sensitivity_level, strength
        );

        Ok(Envelope {
            ciphertext: hex::encode(in_out),
            nonce: hex::encode(nonce_bytes),
            algorithm: ALGORITHM_TAG.to_string(),
            sensitivity_level,
            strength,
        })
    }

    /// Decrypt an envelope previously produced for the session.
    /// Fails with `AuthenticationFailed` if the tag does not verify.
    pub fn decrypt(&self, session_id: &str, envelope: &Envelope) -> ProtocolResult<JsonValue> {
        if envelope.algorithm != ALGORITHM_TAG {
            return Err(ProtocolError::CryptoError(format!(
                "unsupported algorithm '{}'",
                envelope.algorithm
            )));
        }

        let key = self.key_for(session_id)?;
        let nonce_bytes: [u8; NONCE_LEN] = hex::decode(&envelope.nonce)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| ProtocolError::CryptoError("malformed nonce".to_string()))?;
        let mut in_out = hex::decode(&envelope.ciphertext)
            .map_err(|_| ProtocolError::CryptoError("malformed ciphertext".to_string()))?;

        let opening_key = Self::aead_key(&key)?;
        let plaintext = opening_key
            .open_in_place(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| {
                ProtocolError::AuthenticationFailed(format!(
                    "tag verification failed for session {session_id}"
                ))
            })?;

        Ok(serde_json::from_slice(plaintext)?)
    }

    fn key_for(&self, session_id: &str) -> ProtocolResult<ChannelKey> {
        self.keys
            .get(session_id)
            .map(|k| k.clone())
            .ok_or_else(|| ProtocolError::ChannelNotProvisioned(session_id.to_string()))
    }

    fn aead_key(key: &ChannelKey) -> ProtocolResult<LessSafeKey> {
        let unbound = UnboundKey::new(&AES_256_GCM, key.as_bytes())
            .map_err(|_| ProtocolError::CryptoError("invalid key material".to_string()))?;
        Ok(LessSafeKey::new(unbound))
    }
}
