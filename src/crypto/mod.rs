//! Hashing and signature capabilities consumed by the VM.
//!
//! The engine never calls a concrete primitive for `HASH160`, `HASH256`,
//! `CHECKSIG` and `CHECKMULTISIG`; it goes through [`Crypto`] so hosts can
//! plug in their own scheme. [`Secp256k1Crypto`] is the default: SHA-256 and
//! RIPEMD-160 digests with BIP-340 Schnorr signatures over secp256k1.

pub mod key_pair;

use k256::schnorr::signature::Verifier;
use k256::schnorr::{Signature, VerifyingKey};
use ripemd::Ripemd160;
use script_vm_derive::Error;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Length of an x-only Schnorr public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length of a Schnorr signature.
pub const SIGNATURE_LEN: usize = 64;

/// Malformed inputs to [`Crypto::verify_signature`].
///
/// The engine maps any of these to a `false` verification result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("public key must be {expected} bytes, got {actual}")]
    PublicKeyLength { expected: usize, actual: usize },

    #[error("public key is not a valid curve point")]
    InvalidPublicKey,

    #[error("signature must be {expected} bytes, got {actual}")]
    SignatureLength { expected: usize, actual: usize },

    #[error("signature encoding is invalid")]
    InvalidSignature,
}

/// Hash and signature primitives required by the engine.
pub trait Crypto {
    /// 20-byte digest used for script hashes and `HASH160`.
    fn hash160(&self, data: &[u8]) -> [u8; 20];

    /// 32-byte digest used by `HASH256`.
    fn hash256(&self, data: &[u8]) -> [u8; 32];

    /// Checks `signature` over `message` under `public_key`.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not verify and
    /// `Err` when either input cannot be decoded.
    fn verify_signature(
        &self,
        message: &[u8],
        signature: &[u8],
        public_key: &[u8],
    ) -> Result<bool, CryptoError>;
}

/// Default [`Crypto`]: `RIPEMD160(SHA256(x))`, `SHA256(SHA256(x))` and Schnorr.
#[derive(Debug, Default, Clone, Copy)]
pub struct Secp256k1Crypto;

impl Crypto for Secp256k1Crypto {
    fn hash160(&self, data: &[u8]) -> [u8; 20] {
        Ripemd160::digest(sha256(data)).into()
    }

    fn hash256(&self, data: &[u8]) -> [u8; 32] {
        sha256(&sha256(data))
    }

    fn verify_signature(
        &self,
        message: &[u8],
        signature: &[u8],
        public_key: &[u8],
    ) -> Result<bool, CryptoError> {
        if public_key.len() != PUBLIC_KEY_LEN {
            return Err(CryptoError::PublicKeyLength {
                expected: PUBLIC_KEY_LEN,
                actual: public_key.len(),
            });
        }
        if signature.len() != SIGNATURE_LEN {
            return Err(CryptoError::SignatureLength {
                expected: SIGNATURE_LEN,
                actual: signature.len(),
            });
        }
        let key = VerifyingKey::from_bytes(public_key).map_err(|_| CryptoError::InvalidPublicKey)?;
        let signature = Signature::try_from(signature).map_err(|_| CryptoError::InvalidSignature)?;
        Ok(key.verify(message, &signature).is_ok())
    }
}

/// Single SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Single SHA-1.
pub fn sha1(data: &[u8]) -> [u8; 20] {
    Sha1::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key_pair::PrivateKey;

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sha1_known_vector() {
        assert_eq!(
            hex::encode(sha1(b"abc")),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn hash160_is_ripemd_of_sha256() {
        let expected: [u8; 20] = Ripemd160::digest(sha256(b"script")).into();
        assert_eq!(Secp256k1Crypto.hash160(b"script"), expected);
    }

    #[test]
    fn hash256_is_double_sha256() {
        assert_eq!(Secp256k1Crypto.hash256(b""), sha256(&sha256(b"")));
    }

    #[test]
    fn verify_accepts_valid_signature() {
        let private = PrivateKey::new();
        let public = private.public_key().to_bytes();
        let sig = private.sign(b"message");
        assert_eq!(
            Secp256k1Crypto.verify_signature(b"message", &sig, &public),
            Ok(true)
        );
    }

    #[test]
    fn verify_rejects_wrong_message() {
        let private = PrivateKey::new();
        let public = private.public_key().to_bytes();
        let sig = private.sign(b"message");
        assert_eq!(
            Secp256k1Crypto.verify_signature(b"other", &sig, &public),
            Ok(false)
        );
    }

    #[test]
    fn verify_reports_malformed_inputs() {
        let private = PrivateKey::new();
        let public = private.public_key().to_bytes();
        let sig = private.sign(b"message");

        assert_eq!(
            Secp256k1Crypto.verify_signature(b"message", &sig, &public[..31]),
            Err(CryptoError::PublicKeyLength {
                expected: 32,
                actual: 31
            })
        );
        assert_eq!(
            Secp256k1Crypto.verify_signature(b"message", &sig[..10], &public),
            Err(CryptoError::SignatureLength {
                expected: 64,
                actual: 10
            })
        );
    }

    #[test]
    fn error_messages_name_lengths() {
        let err = CryptoError::SignatureLength {
            expected: 64,
            actual: 3,
        };
        assert_eq!(err.to_string(), "signature must be 64 bytes, got 3");
    }
}
