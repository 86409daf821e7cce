// Copyright (c) 2024 Tessera Foundation

//! Output locks and input unlock data.

use crate::{AdminOp, AdminThread};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tsr_crypto_keys::PublicKey;

/// Maximum number of keys a multisig lock may name.
pub const MAX_MULTISIG_KEYS: usize = 20;

/// The condition under which an output may be spent.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockScript {
    /// Spendable with one signature by `key`.
    PayToKey(PublicKey),
    /// Spendable with `required` signatures from distinct `keys`.
    MultiSig {
        /// Signature threshold.
        required: u8,
        /// Candidate signers.
        keys: Vec<PublicKey>,
    },
    /// The current output of an admin thread.
    AdminThread(AdminThread),
    /// A key operation record. Never spendable.
    AdminOp(AdminOp),
    /// Arbitrary data. Never spendable.
    NullData(Vec<u8>),
}

impl LockScript {
    /// Whether outputs with this lock enter the spendable set at all.
    pub fn is_spendable(&self) -> bool {
        !matches!(self, LockScript::AdminOp(_) | LockScript::NullData(_))
    }

    /// The admin thread, if this is a thread output.
    pub fn admin_thread(&self) -> Option<AdminThread> {
        match self {
            LockScript::AdminThread(thread) => Some(*thread),
            _ => None,
        }
    }

    /// Whether this output is part of the governance layer.
    pub fn is_admin(&self) -> bool {
        matches!(self, LockScript::AdminThread(_) | LockScript::AdminOp(_))
    }

    /// Signature operations charged for creating this output.
    pub fn sig_op_count(&self) -> usize {
        match self {
            LockScript::PayToKey(_) | LockScript::AdminThread(_) => 1,
            LockScript::MultiSig { keys, .. } => keys.len(),
            LockScript::AdminOp(_) | LockScript::NullData(_) => 0,
        }
    }

    pub(crate) fn hash_into(&self, hasher: &mut Sha256) {
        match self {
            LockScript::PayToKey(key) => {
                hasher.update([0u8]);
                hasher.update(key.as_bytes());
            }
            LockScript::MultiSig { required, keys } => {
                hasher.update([1u8, *required]);
                hasher.update((keys.len() as u32).to_le_bytes());
                for key in keys {
                    hasher.update(key.as_bytes());
                }
            }
            LockScript::AdminThread(thread) => {
                hasher.update([2u8, *thread as u8]);
            }
            LockScript::AdminOp(op) => {
                let tag = match op {
                    AdminOp::AddKey { .. } => 0u8,
                    AdminOp::RevokeKey { .. } => 1u8,
                };
                hasher.update([3u8, tag, op.role() as u8]);
                hasher.update(op.key().as_bytes());
            }
            LockScript::NullData(data) => {
                hasher.update([4u8]);
                hasher.update((data.len() as u32).to_le_bytes());
                hasher.update(data);
            }
        }
    }
}

/// A signature over a transaction's signing hash, tagged with its signer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeySignature {
    /// Claimed signer.
    pub key: PublicKey,
    /// Signature bytes.
    pub signature: Vec<u8>,
}

/// Data supplied by an input to satisfy the lock it spends.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unlock {
    /// Free-form coinbase data. Starts with the little-endian block height.
    Coinbase(Vec<u8>),
    /// Signatures for a key, multisig or admin-thread lock.
    Signatures(Vec<KeySignature>),
}

impl Unlock {
    /// Signature operations charged for this unlock.
    pub fn sig_op_count(&self) -> usize {
        match self {
            Unlock::Coinbase(_) => 0,
            Unlock::Signatures(signatures) => signatures.len(),
        }
    }

    /// The signatures carried, empty for coinbase data.
    pub fn signatures(&self) -> &[KeySignature] {
        match self {
            Unlock::Coinbase(_) => &[],
            Unlock::Signatures(signatures) => signatures,
        }
    }
}
