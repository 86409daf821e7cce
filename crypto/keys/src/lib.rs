// Copyright (c) 2024 Tessera Foundation

//! Ed25519 identities used by the Tessera admin-key governance layer.
//!
//! Block signers and admin operators are identified by a 32-byte Ed25519
//! public key. Chain-state code never touches curve arithmetic directly: it
//! asks a [`SignatureVerifier`] for a pass/fail answer, so tests and
//! alternative signature schemes can be swapped in at that seam.

#![deny(missing_docs)]

mod error;
mod keys;
mod verifier;

pub use error::KeyError;
pub use keys::{PublicKey, SigningKeyPair, PUBLIC_KEY_LEN, SIGNATURE_LEN};
pub use verifier::{Ed25519Verifier, SignatureVerifier};
