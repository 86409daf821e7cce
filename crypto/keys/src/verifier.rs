// Copyright (c) 2024 Tessera Foundation

//! Pass/fail signature verification.

use crate::PublicKey;
use ed25519_dalek::Signature;

/// Checks a signature made by `key` over `message`.
///
/// Implementations must be deterministic: every node has to reach the same
/// answer for the same inputs.
pub trait SignatureVerifier: Send + Sync {
    /// Returns true iff `signature` is a valid signature of `message` by `key`.
    fn verify(&self, key: &PublicKey, message: &[u8], signature: &[u8]) -> bool;
}

/// Strict Ed25519 verification.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, key: &PublicKey, message: &[u8], signature: &[u8]) -> bool {
        let Ok(verifying_key) = key.to_verifying_key() else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        verifying_key.verify_strict(message, &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SigningKeyPair;

    #[test]
    fn test_verify_accepts_valid_signature() {
        let pair = SigningKeyPair::from_seed(&[9u8; 32]);
        let sig = pair.sign(b"block header");
        assert!(Ed25519Verifier.verify(&pair.public_key(), b"block header", &sig));
    }

    #[test]
    fn test_verify_rejects_wrong_key_or_message() {
        let pair = SigningKeyPair::from_seed(&[9u8; 32]);
        let other = SigningKeyPair::from_seed(&[10u8; 32]);
        let sig = pair.sign(b"block header");

        assert!(!Ed25519Verifier.verify(&other.public_key(), b"block header", &sig));
        assert!(!Ed25519Verifier.verify(&pair.public_key(), b"other header", &sig));
    }

    #[test]
    fn test_verify_rejects_malformed_signature() {
        let pair = SigningKeyPair::from_seed(&[9u8; 32]);
        assert!(!Ed25519Verifier.verify(&pair.public_key(), b"m", &[]));
        assert!(!Ed25519Verifier.verify(&pair.public_key(), b"m", &[0u8; 63]));
    }
}
