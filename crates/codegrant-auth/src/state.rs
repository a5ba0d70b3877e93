//! State protection for the OAuth `state` parameter.
//!
//! [`StateCodec`] turns [`AuthProperties`] into an opaque, URL-safe string and
//! back. The cryptography is delegated to an injected [`DataProtector`]; the
//! shipped [`AesGcmProtector`] uses AES-256-GCM with a random nonce prepended
//! to the ciphertext and the protector's purpose bound as associated data.

use std::sync::Arc;

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use base64::{
    Engine,
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD},
};
use rand::RngCore;

use crate::error::ProtectionError;
use crate::properties::AuthProperties;

/// Nonce size for AES-256-GCM (96 bits)
const NONCE_SIZE: usize = 12;

/// Key size for AES-256 (256 bits)
pub const KEY_SIZE: usize = 32;

/// Authenticated encryption over byte strings.
///
/// `unprotect` must fail on any modification of a value produced by
/// `protect`.
pub trait DataProtector: Send + Sync {
    /// Encrypts and authenticates `plaintext`.
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, ProtectionError>;

    /// Verifies and decrypts a value produced by [`protect`](Self::protect).
    fn unprotect(&self, protected: &[u8]) -> Result<Vec<u8>, ProtectionError>;
}

/// AES-256-GCM data protector.
#[derive(Clone)]
pub struct AesGcmProtector {
    cipher: Aes256Gcm,
    purpose: String,
}

impl AesGcmProtector {
    /// Creates a protector from raw key bytes.
    ///
    /// `purpose` is bound to every payload; values protected under one
    /// purpose do not unprotect under another.
    #[must_use]
    pub fn new(key: &[u8; KEY_SIZE], purpose: impl Into<String>) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
            purpose: purpose.into(),
        }
    }

    /// Creates a protector with a random key.
    ///
    /// Values protected by it cannot be read after a restart or by another
    /// instance, so challenges in flight at that moment fail their callback.
    #[must_use]
    pub fn ephemeral(purpose: impl Into<String>) -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        Self::new(&key, purpose)
    }

    /// Creates a protector from a hex (64 characters) or base64 key string.
    pub fn from_key_str(key_str: &str, purpose: impl Into<String>) -> Result<Self, ProtectionError> {
        let key = parse_key(key_str)?;
        Ok(Self::new(&key, purpose))
    }
}

impl DataProtector for AesGcmProtector {
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, ProtectionError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: self.purpose.as_bytes(),
                },
            )
            .map_err(|_| ProtectionError::ProtectFailed)?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend(ciphertext);
        Ok(combined)
    }

    fn unprotect(&self, protected: &[u8]) -> Result<Vec<u8>, ProtectionError> {
        if protected.len() <= NONCE_SIZE {
            return Err(ProtectionError::UnprotectFailed);
        }

        let (nonce_bytes, ciphertext) = protected.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: self.purpose.as_bytes(),
                },
            )
            .map_err(|_| ProtectionError::UnprotectFailed)
    }
}

fn parse_key(key_str: &str) -> Result<[u8; KEY_SIZE], ProtectionError> {
    let key_str = key_str.trim();

    // Try hex first
    if key_str.len() == KEY_SIZE * 2
        && let Ok(bytes) = hex::decode(key_str)
    {
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&bytes);
        return Ok(key);
    }

    let bytes = BASE64
        .decode(key_str)
        .map_err(|e| ProtectionError::InvalidKey(format!("Invalid base64 key: {e}")))?;

    if bytes.len() != KEY_SIZE {
        return Err(ProtectionError::InvalidKey(format!(
            "Key must be {} bytes, got {}",
            KEY_SIZE,
            bytes.len()
        )));
    }

    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Protects [`AuthProperties`] into the `state` query value.
#[derive(Clone)]
pub struct StateCodec {
    protector: Arc<dyn DataProtector>,
}

impl StateCodec {
    /// Creates a codec over the given protector.
    #[must_use]
    pub fn new(protector: Arc<dyn DataProtector>) -> Self {
        Self { protector }
    }

    /// Serializes and protects the properties into a base64url string.
    pub fn protect(&self, properties: &AuthProperties) -> Result<String, ProtectionError> {
        let payload =
            serde_json::to_vec(properties).map_err(|_| ProtectionError::ProtectFailed)?;
        let protected = self.protector.protect(&payload)?;
        Ok(URL_SAFE_NO_PAD.encode(protected))
    }

    /// Recovers properties from a protected string.
    ///
    /// Returns `None` for anything that was not produced by
    /// [`protect`](Self::protect) with the same key and purpose.
    pub fn unprotect(&self, protected: &str) -> Option<AuthProperties> {
        let bytes = URL_SAFE_NO_PAD.decode(protected).ok()?;
        let payload = self.protector.unprotect(&bytes).ok()?;
        serde_json::from_slice(&payload).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::AuthenticationToken;

    const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn codec(purpose: &str) -> StateCodec {
        StateCodec::new(Arc::new(
            AesGcmProtector::from_key_str(TEST_KEY, purpose).unwrap(),
        ))
    }

    fn sample_properties() -> AuthProperties {
        let mut props = AuthProperties::new()
            .with_redirect_uri("https://app.example.com/dashboard?tab=1")
            .with_item(".xsrf", "abc")
            .with_item("unicode", "ключ🔐");
        props
            .tokens
            .push(AuthenticationToken::new("access_token", "tok"));
        props
    }

    #[test]
    fn test_roundtrip() {
        let codec = codec("state");
        for props in [AuthProperties::new(), sample_properties()] {
            let protected = codec.protect(&props).unwrap();
            assert_eq!(codec.unprotect(&protected), Some(props));
        }
    }

    #[test]
    fn test_output_is_url_safe() {
        let protected = codec("state").protect(&sample_properties()).unwrap();
        assert!(
            protected
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_protect_is_not_reproducible() {
        let codec = codec("state");
        let props = sample_properties();
        assert_ne!(codec.protect(&props).unwrap(), codec.protect(&props).unwrap());
    }

    #[test]
    fn test_any_bit_flip_is_detected() {
        let codec = codec("state");
        let protected = codec.protect(&sample_properties()).unwrap();
        let bytes = URL_SAFE_NO_PAD.decode(&protected).unwrap();

        for index in 0..bytes.len() {
            for bit in 0..8 {
                let mut tampered = bytes.clone();
                tampered[index] ^= 1 << bit;
                let encoded = URL_SAFE_NO_PAD.encode(&tampered);
                assert!(
                    codec.unprotect(&encoded).is_none(),
                    "flip of byte {index} bit {bit} was not detected"
                );
            }
        }
    }

    #[test]
    fn test_truncated_and_garbage_input() {
        let codec = codec("state");
        let protected = codec.protect(&sample_properties()).unwrap();

        assert!(codec.unprotect("").is_none());
        assert!(codec.unprotect("not base64 at all!").is_none());
        assert!(codec.unprotect(&protected[..protected.len() / 2]).is_none());
        assert!(codec.unprotect("AAAA").is_none());
    }

    #[test]
    fn test_purpose_is_bound() {
        let protected = codec("scheme-a").protect(&sample_properties()).unwrap();
        assert!(codec("scheme-b").unprotect(&protected).is_none());
    }

    #[test]
    fn test_wrong_key_fails() {
        let protected = codec("state").protect(&sample_properties()).unwrap();
        let other = StateCodec::new(Arc::new(AesGcmProtector::ephemeral("state")));
        assert!(other.unprotect(&protected).is_none());
    }

    #[test]
    fn test_parse_key_formats() {
        assert!(parse_key(TEST_KEY).is_ok());
        assert!(parse_key(&BASE64.encode([7u8; KEY_SIZE])).is_ok());
        assert!(matches!(
            parse_key(&BASE64.encode([7u8; 16])),
            Err(ProtectionError::InvalidKey(_))
        ));
        assert!(matches!(
            parse_key("not-a-key!"),
            Err(ProtectionError::InvalidKey(_))
        ));
    }
}
