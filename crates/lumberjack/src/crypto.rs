// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Public-key authenticated encryption of batch payloads (NaCl box).
//!
//! The session is derived once from our secret key and the collector's public
//! key. Every sealed message carries a fresh 24-byte random nonce drawn from
//! the OS random source; nonces are not secret and travel as their own frame.

use std::fmt;

use bytes::Bytes;
use crypto_box::aead::generic_array::GenericArray;
use crypto_box::aead::{Aead, AeadCore, OsRng};
use crypto_box::{PublicKey, SalsaBox, SecretKey};

use crate::errors::{ConfigError, CryptoError};

pub const KEY_BYTES: usize = crypto_box::KEY_SIZE;
pub const NONCE_BYTES: usize = 24;

/// Peer public key and our secret key, fixed for the life of the process.
#[derive(Clone)]
pub struct KeyMaterial {
    their_public: PublicKey,
    our_secret: SecretKey,
}

impl KeyMaterial {
    #[must_use]
    pub fn new(their_public: [u8; KEY_BYTES], our_secret: [u8; KEY_BYTES]) -> Self {
        Self {
            their_public: PublicKey::from(their_public),
            our_secret: SecretKey::from(our_secret),
        }
    }

    /// Builds key material from raw bytes, generating a secret key when none
    /// is given.
    pub fn from_slices(their_public: &[u8], our_secret: Option<&[u8]>) -> Result<Self, ConfigError> {
        let their_public = to_key(their_public, "public key")?;
        let our_secret = match our_secret {
            Some(secret) => SecretKey::from(to_key(secret, "secret key")?),
            None => {
                tracing::info!("No secret key given; generating one");
                SecretKey::generate(&mut OsRng)
            }
        };
        Ok(Self {
            their_public: PublicKey::from(their_public),
            our_secret,
        })
    }

    /// Generates a fresh key pair, returned as `(secret, public)` bytes.
    #[must_use]
    pub fn generate_keypair() -> ([u8; KEY_BYTES], [u8; KEY_BYTES]) {
        let secret = SecretKey::generate(&mut OsRng);
        let public = secret.public_key();
        (secret.to_bytes(), *public.as_bytes())
    }

    /// Our public key, which the collector needs to open our messages.
    #[must_use]
    pub fn our_public(&self) -> [u8; KEY_BYTES] {
        *self.our_secret.public_key().as_bytes()
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("their_public", self.their_public.as_bytes())
            .field("our_secret", &"<redacted>")
            .finish()
    }
}

fn to_key(bytes: &[u8], what: &str) -> Result<[u8; KEY_BYTES], ConfigError> {
    bytes.try_into().map_err(|_| {
        ConfigError::InvalidKey(format!(
            "{what} must be {KEY_BYTES} bytes, got {}",
            bytes.len()
        ))
    })
}

/// A nonce and the ciphertext it sealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub nonce: Bytes,
    pub ciphertext: Bytes,
}

/// Encryption session shared by all messages of the process.
pub struct BoxSession {
    cipher: SalsaBox,
}

impl BoxSession {
    #[must_use]
    pub fn new(keys: &KeyMaterial) -> Self {
        Self {
            cipher: SalsaBox::new(&keys.their_public, &keys.our_secret),
        }
    }

    /// Encrypts `plaintext` under a newly generated nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Sealed, CryptoError> {
        let nonce = SalsaBox::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::Seal)?;
        Ok(Sealed {
            nonce: Bytes::copy_from_slice(nonce.as_slice()),
            ciphertext: Bytes::from(ciphertext),
        })
    }

    /// Decrypts and authenticates a message sealed by the peer.
    pub fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if nonce.len() != NONCE_BYTES {
            return Err(CryptoError::NonceLength {
                expected: NONCE_BYTES,
                actual: nonce.len(),
            });
        }
        self.cipher
            .decrypt(GenericArray::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Open)
    }
}

impl fmt::Debug for BoxSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoxSession")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Forwarder-side and collector-side sessions for one key pair each.
    fn session_pair() -> (BoxSession, BoxSession) {
        let (forwarder_secret, forwarder_public) = KeyMaterial::generate_keypair();
        let (collector_secret, collector_public) = KeyMaterial::generate_keypair();
        let forwarder = BoxSession::new(&KeyMaterial::new(collector_public, forwarder_secret));
        let collector = BoxSession::new(&KeyMaterial::new(forwarder_public, collector_secret));
        (forwarder, collector)
    }

    #[test]
    fn test_collector_opens_what_forwarder_seals() {
        let (forwarder, collector) = session_pair();
        let sealed = forwarder.seal(b"[{\"text\":\"hello\"}]").unwrap();

        assert_eq!(sealed.nonce.len(), NONCE_BYTES);
        assert_eq!(
            collector.open(&sealed.nonce, &sealed.ciphertext).unwrap(),
            b"[{\"text\":\"hello\"}]"
        );
    }

    #[test]
    fn test_nonces_are_unique() {
        let (forwarder, _) = session_pair();
        let nonces: HashSet<Bytes> = (0..2_000)
            .map(|_| forwarder.seal(b"same plaintext").unwrap().nonce)
            .collect();
        assert_eq!(nonces.len(), 2_000);
    }

    #[test]
    fn test_tampered_ciphertext_is_rejected() {
        let (forwarder, collector) = session_pair();
        let sealed = forwarder.seal(b"payload").unwrap();
        let mut tampered = sealed.ciphertext.to_vec();
        tampered[0] ^= 0xff;

        assert!(matches!(
            collector.open(&sealed.nonce, &tampered),
            Err(CryptoError::Open)
        ));
    }

    #[test]
    fn test_wrong_nonce_length() {
        let (_, collector) = session_pair();
        assert!(matches!(
            collector.open(&[0u8; 12], b"whatever"),
            Err(CryptoError::NonceLength {
                expected: 24,
                actual: 12
            })
        ));
    }

    #[test]
    fn test_from_slices_validates_lengths() {
        let (_, public) = KeyMaterial::generate_keypair();
        assert!(KeyMaterial::from_slices(&public, None).is_ok());
        assert!(matches!(
            KeyMaterial::from_slices(&public[..31], None),
            Err(ConfigError::InvalidKey(_))
        ));
        assert!(matches!(
            KeyMaterial::from_slices(&public, Some(&[1u8; 16])),
            Err(ConfigError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_our_public_matches_secret() {
        let (secret, public) = KeyMaterial::generate_keypair();
        let keys = KeyMaterial::new([7u8; KEY_BYTES], secret);
        assert_eq!(keys.our_public(), public);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let (secret, public) = KeyMaterial::generate_keypair();
        let keys = KeyMaterial::new(public, secret);
        assert!(format!("{keys:?}").contains("<redacted>"));
    }
}
