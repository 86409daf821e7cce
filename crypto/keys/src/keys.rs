// Copyright (c) 2024 Tessera Foundation

use crate::KeyError;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Length in bytes of an encoded public key.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length in bytes of an encoded signature.
pub const SIGNATURE_LEN: usize = 64;

/// An Ed25519 public key identifying a signer.
///
/// Stored as raw bytes; point validity is only checked when a signature is
/// verified, so an invalid key simply never verifies anything.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey([u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    /// Wrap raw key bytes.
    pub const fn from_bytes(bytes: [u8; PUBLIC_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a key from a slice, checking the length.
    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let raw: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|_| KeyError::LengthMismatch {
            expected: PUBLIC_KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(raw))
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Decode the key into a curve point.
    pub(crate) fn to_verifying_key(self) -> Result<VerifyingKey, KeyError> {
        VerifyingKey::from_bytes(&self.0).map_err(|_| KeyError::InvalidPoint)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0[0..8]))
    }
}

impl FromStr for PublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidHex)?;
        Self::try_from_slice(&bytes)
    }
}

/// An Ed25519 signing key together with its public half.
#[derive(Clone)]
pub struct SigningKeyPair {
    signing_key: SigningKey,
}

impl SigningKeyPair {
    /// Derive a key pair from a 32-byte secret seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// The public key of this pair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message, returning the 64-byte signature encoding.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_hex_roundtrip() {
        let key = SigningKeyPair::from_seed(&[7u8; 32]).public_key();
        let parsed: PublicKey = key.to_string().parse().unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_public_key_rejects_bad_length() {
        assert_eq!(
            PublicKey::try_from_slice(&[0u8; 31]),
            Err(KeyError::LengthMismatch {
                expected: 32,
                actual: 31
            })
        );
        assert_eq!("zz".parse::<PublicKey>(), Err(KeyError::InvalidHex));
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = SigningKeyPair::from_seed(&[1u8; 32]);
        let b = SigningKeyPair::from_seed(&[1u8; 32]);
        let c = SigningKeyPair::from_seed(&[2u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
        assert_ne!(a.public_key(), c.public_key());
        assert_eq!(a.sign(b"msg"), b.sign(b"msg"));
        assert_eq!(a.sign(b"msg").len(), SIGNATURE_LEN);
    }

    #[test]
    fn test_public_key_serde() {
        let key = SigningKeyPair::from_seed(&[3u8; 32]).public_key();
        let bytes = bincode::serialize(&key).unwrap();
        assert_eq!(bytes.len(), PUBLIC_KEY_LEN);
        let decoded: PublicKey = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, key);
    }
}
