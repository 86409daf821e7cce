// Copyright (c) 2024 Tessera Foundation

use crate::{Amount, AdminThread, Hash256, LockScript, TxHash, Unlock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Lock times below this are block heights, at or above are Unix times.
pub const LOCK_TIME_THRESHOLD: u32 = 500_000_000;

/// Input sequence number that opts out of lock-time enforcement.
pub const MAX_TX_IN_SEQUENCE: u32 = u32::MAX;

/// Reference to an output of an earlier transaction.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    /// Hash of the transaction holding the output.
    pub tx_hash: TxHash,
    /// Index of the output in that transaction.
    pub index: u32,
}

impl OutPoint {
    /// Create an outpoint.
    pub fn new(tx_hash: TxHash, index: u32) -> Self {
        Self { tx_hash, index }
    }

    /// The outpoint a coinbase input refers to.
    pub const fn null() -> Self {
        Self {
            tx_hash: Hash256::ZERO,
            index: u32::MAX,
        }
    }

    /// True for the coinbase outpoint.
    pub fn is_null(&self) -> bool {
        self.index == u32::MAX && self.tx_hash.is_zero()
    }

    /// Fixed-width key encoding (hash || big-endian index), so keys of one
    /// transaction sort together.
    pub fn to_key_bytes(&self) -> [u8; 36] {
        let mut bytes = [0u8; 36];
        bytes[..32].copy_from_slice(self.tx_hash.as_bytes());
        bytes[32..].copy_from_slice(&self.index.to_be_bytes());
        bytes
    }
}

impl fmt::Debug for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.tx_hash, self.index)
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.index)
    }
}

/// A transaction input.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxIn {
    /// The output being spent.
    pub previous_output: OutPoint,
    /// Data satisfying the spent output's lock.
    pub unlock: Unlock,
    /// Sequence number, see [`MAX_TX_IN_SEQUENCE`].
    pub sequence: u32,
}

/// A transaction output.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxOut {
    /// Value in atomic units.
    pub value: Amount,
    /// Spending condition.
    pub lock: LockScript,
}

impl TxOut {
    /// Create an output.
    pub fn new(value: Amount, lock: LockScript) -> Self {
        Self { value, lock }
    }
}

/// A transaction.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transaction {
    /// Format version.
    pub version: u32,
    /// Inputs, in order.
    pub inputs: Vec<TxIn>,
    /// Outputs, in order.
    pub outputs: Vec<TxOut>,
    /// Earliest height or time at which the transaction is final.
    pub lock_time: u32,
}

impl Transaction {
    /// Hash of the full transaction, unlock data included.
    pub fn hash(&self) -> TxHash {
        let mut hasher = Sha256::new();
        self.hash_body_into(&mut hasher);
        for input in &self.inputs {
            match &input.unlock {
                Unlock::Coinbase(data) => {
                    hasher.update([0u8]);
                    hasher.update((data.len() as u32).to_le_bytes());
                    hasher.update(data);
                }
                Unlock::Signatures(signatures) => {
                    hasher.update([1u8]);
                    hasher.update((signatures.len() as u32).to_le_bytes());
                    for sig in signatures {
                        hasher.update(sig.key.as_bytes());
                        hasher.update((sig.signature.len() as u32).to_le_bytes());
                        hasher.update(&sig.signature);
                    }
                }
            }
        }
        Hash256::from_hasher(hasher)
    }

    /// Hash that input signatures commit to.
    ///
    /// Excludes unlock data so that signatures do not sign themselves.
    pub fn signing_hash(&self) -> Hash256 {
        let mut hasher = Sha256::new();
        hasher.update(b"tessera-tx-v1");
        self.hash_body_into(&mut hasher);
        Hash256::from_hasher(hasher)
    }

    fn hash_body_into(&self, hasher: &mut Sha256) {
        hasher.update(self.version.to_le_bytes());
        hasher.update((self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            hasher.update(input.previous_output.tx_hash.as_bytes());
            hasher.update(input.previous_output.index.to_le_bytes());
            hasher.update(input.sequence.to_le_bytes());
        }
        hasher.update((self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            hasher.update(output.value.to_le_bytes());
            output.lock.hash_into(hasher);
        }
        hasher.update(self.lock_time.to_le_bytes());
    }

    /// A coinbase has exactly one input, spending the null outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    /// The admin thread this transaction advances, if any.
    ///
    /// Only the first output is considered; misplaced thread outputs are a
    /// structural error reported by validation.
    pub fn admin_thread(&self) -> Option<AdminThread> {
        self.outputs.first().and_then(|out| out.lock.admin_thread())
    }

    /// Whether any output belongs to the governance layer.
    pub fn has_admin_outputs(&self) -> bool {
        self.outputs.iter().any(|out| out.lock.is_admin())
    }

    /// Encoded size in bytes.
    ///
    /// Encoding an in-memory value cannot fail; should it ever, the size is
    /// reported as unbounded so that size limits reject it.
    pub fn serialized_size(&self) -> usize {
        bincode::serialized_size(self)
            .ok()
            .and_then(|size| usize::try_from(size).ok())
            .unwrap_or(usize::MAX)
    }

    /// Signature operations charged for this transaction.
    pub fn sig_op_count(&self) -> usize {
        let inputs: usize = self.inputs.iter().map(|i| i.unlock.sig_op_count()).sum();
        let outputs: usize = self.outputs.iter().map(|o| o.lock.sig_op_count()).sum();
        inputs + outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeySignature;
    use tsr_crypto_keys::PublicKey;

    fn spend() -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_output: OutPoint::new(Hash256([5u8; 32]), 0),
                unlock: Unlock::Signatures(vec![]),
                sequence: MAX_TX_IN_SEQUENCE,
            }],
            outputs: vec![TxOut::new(
                10,
                LockScript::PayToKey(PublicKey::from_bytes([1u8; 32])),
            )],
            lock_time: 0,
        }
    }

    #[test]
    fn test_signing_hash_ignores_signatures() {
        let unsigned = spend();
        let mut signed = unsigned.clone();
        signed.inputs[0].unlock = Unlock::Signatures(vec![KeySignature {
            key: PublicKey::from_bytes([1u8; 32]),
            signature: vec![7u8; 64],
        }]);

        assert_eq!(unsigned.signing_hash(), signed.signing_hash());
        assert_ne!(unsigned.hash(), signed.hash());
    }

    #[test]
    fn test_hash_commits_to_outputs() {
        let a = spend();
        let mut b = spend();
        b.outputs[0].value = 11;
        assert_ne!(a.hash(), b.hash());
        assert_ne!(a.signing_hash(), b.signing_hash());
    }

    #[test]
    fn test_coinbase_detection() {
        let mut tx = spend();
        assert!(!tx.is_coinbase());
        tx.inputs[0].previous_output = OutPoint::null();
        assert!(tx.is_coinbase());
        tx.inputs.push(tx.inputs[0].clone());
        assert!(!tx.is_coinbase());
    }

    #[test]
    fn test_outpoint_key_bytes_sort_by_tx() {
        let h = Hash256([9u8; 32]);
        let a = OutPoint::new(h, 1).to_key_bytes();
        let b = OutPoint::new(h, 256).to_key_bytes();
        assert!(a < b);
        assert_eq!(&a[..32], h.as_bytes());
    }

    #[test]
    fn test_sig_op_count() {
        let mut tx = spend();
        assert_eq!(tx.sig_op_count(), 1);
        tx.outputs.push(TxOut::new(
            1,
            LockScript::MultiSig {
                required: 2,
                keys: vec![PublicKey::from_bytes([1u8; 32]); 3],
            },
        ));
        tx.outputs.push(TxOut::new(0, LockScript::NullData(vec![1, 2])));
        assert_eq!(tx.sig_op_count(), 4);
    }
}
