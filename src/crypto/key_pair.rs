//! Schnorr signature key pairs on secp256k1.
//!
//! Used by hosts and tests to produce the signatures and public keys that
//! `CHECKSIG`/`CHECKMULTISIG` consume through [`super::Secp256k1Crypto`].

use crate::crypto::{PUBLIC_KEY_LEN, SIGNATURE_LEN};
use k256::schnorr::signature::{Signer, Verifier};
use k256::schnorr::{Signature, SigningKey, VerifyingKey};
use rand_core::OsRng;

/// Private key for signing script messages.
///
/// Generated using cryptographically secure randomness from the OS.
#[derive(Clone)]
pub struct PrivateKey {
    key: SigningKey,
}

/// Public key for signature verification.
///
/// Serialized as the 32-byte x-only coordinate, the form scripts push.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    key: VerifyingKey,
}

impl PrivateKey {
    /// Generates a new random private key using OS-provided entropy.
    pub fn new() -> Self {
        let mut rng = OsRng;
        Self {
            key: SigningKey::random(&mut rng),
        }
    }

    /// Creates a private key from raw bytes.
    ///
    /// Returns `None` if the bytes do not represent a valid scalar for secp256k1.
    pub fn from_bytes(bytes: &[u8; 32]) -> Option<Self> {
        SigningKey::from_bytes(bytes).ok().map(|key| Self { key })
    }

    /// Derives the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: *self.key.verifying_key(),
        }
    }

    /// Signs arbitrary data, producing a 64-byte Schnorr signature.
    pub fn sign(&self, data: &[u8]) -> [u8; SIGNATURE_LEN] {
        let signature: Signature = self.key.sign(data);
        signature.to_bytes()
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PublicKey {
    /// Parses a 32-byte x-only public key.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != PUBLIC_KEY_LEN {
            return None;
        }
        VerifyingKey::from_bytes(bytes).ok().map(|key| Self { key })
    }

    /// Returns the 32-byte x-only encoding.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.key.to_bytes().into()
    }

    /// Verifies a Schnorr signature against the given data.
    ///
    /// Returns `false` for malformed signatures as well as invalid ones.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        Signature::try_from(signature)
            .map(|sig| self.key.verify(data, &sig).is_ok())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: [u8; 32] = [
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
        0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x1a, 0x1b, 0x1c, 0x1d, 0x1e,
        0x1f, 0x20,
    ];

    #[test]
    fn test_sign_verify_success() {
        let private = PrivateKey::new();
        let public = private.public_key();

        let data = b"Hello World";
        let signature = private.sign(data);
        assert!(public.verify(data, &signature));
    }

    #[test]
    fn test_sign_verify_wrong_key() {
        let private = PrivateKey::new();
        let other = PrivateKey::new().public_key();

        let data = b"Hello World";
        let signature = private.sign(data);
        assert!(!other.verify(data, &signature));
    }

    #[test]
    fn test_verify_tampered_data() {
        let private = PrivateKey::new();
        let public = private.public_key();

        let signature = private.sign(b"Hello World");
        assert!(!public.verify(b"Hello World!", &signature));
    }

    #[test]
    fn test_verify_empty_data() {
        let private = PrivateKey::new();
        let signature = private.sign(b"");
        assert!(private.public_key().verify(b"", &signature));
    }

    #[test]
    fn test_verify_truncated_signature() {
        let private = PrivateKey::new();
        let signature = private.sign(b"data");
        assert!(!private.public_key().verify(b"data", &signature[..63]));
    }

    #[test]
    fn from_bytes_with_zero_key_fails() {
        assert!(PrivateKey::from_bytes(&[0u8; 32]).is_none());
    }

    #[test]
    fn from_bytes_produces_deterministic_key() {
        let key1 = PrivateKey::from_bytes(&SEED).unwrap();
        let key2 = PrivateKey::from_bytes(&SEED).unwrap();
        assert_eq!(key1.public_key(), key2.public_key());
    }

    #[test]
    fn public_key_bytes_round_trip() {
        let public = PrivateKey::from_bytes(&SEED).unwrap().public_key();
        let parsed = PublicKey::from_bytes(&public.to_bytes()).unwrap();
        assert_eq!(parsed, public);
    }

    #[test]
    fn public_key_rejects_wrong_length() {
        assert!(PublicKey::from_bytes(&[2u8; 33]).is_none());
        assert!(PublicKey::from_bytes(&[]).is_none());
    }
}
