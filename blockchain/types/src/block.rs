// Copyright (c) 2024 Tessera Foundation

use crate::{compute_merkle_root, BlockHash, Hash256, Transaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tsr_crypto_keys::PublicKey;

/// Block header.
///
/// The block's height is not part of the header; the chain engine assigns it
/// from the parent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block format version.
    pub version: u32,

    /// Hash of the parent block.
    pub prev_block: BlockHash,

    /// Merkle root of the block's transactions.
    pub merkle_root: Hash256,

    /// Time the block was produced. Only whole seconds are valid.
    pub timestamp: DateTime<Utc>,

    /// Compact encoding of the proof-of-work target.
    pub bits: u32,

    /// Proof-of-work nonce.
    pub nonce: u64,

    /// Total encoded size of the block's transactions.
    pub size: u32,

    /// Key of the validator that signed this block.
    pub validating_key: PublicKey,

    /// Signature by `validating_key` over [`BlockHeader::hash`].
    pub signature: Vec<u8>,
}

impl BlockHeader {
    /// Hash identifying the block. Covers every field but the signature.
    pub fn hash(&self) -> BlockHash {
        let mut hasher = Sha256::new();
        hasher.update(self.version.to_le_bytes());
        hasher.update(self.prev_block.as_bytes());
        hasher.update(self.merkle_root.as_bytes());
        hasher.update(self.timestamp.timestamp().to_le_bytes());
        hasher.update(self.timestamp.timestamp_subsec_nanos().to_le_bytes());
        hasher.update(self.bits.to_le_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hasher.update(self.size.to_le_bytes());
        hasher.update(self.validating_key.as_bytes());
        Hash256::from_hasher(hasher)
    }
}

/// A block: header plus ordered transactions, the first being the coinbase.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Transactions, coinbase first.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The block's hash.
    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    /// The merkle root the header should carry.
    pub fn compute_merkle_root(&self) -> Hash256 {
        compute_merkle_root(&self.transactions)
    }

    /// Sum of encoded transaction sizes, the value `header.size` declares.
    pub fn transactions_size(&self) -> usize {
        self.transactions
            .iter()
            .map(Transaction::serialized_size)
            .fold(0usize, usize::saturating_add)
    }

    /// Encoded size of the whole block.
    pub fn serialized_size(&self) -> usize {
        bincode::serialized_size(self)
            .ok()
            .and_then(|size| usize::try_from(size).ok())
            .unwrap_or(usize::MAX)
    }

    /// The coinbase transaction, if the block has any transactions.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn header() -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_block: Hash256::ZERO,
            merkle_root: Hash256([1u8; 32]),
            timestamp: Utc.timestamp_opt(1_704_067_200, 0).unwrap(),
            bits: 0x207f_ffff,
            nonce: 0,
            size: 0,
            validating_key: PublicKey::from_bytes([2u8; 32]),
            signature: vec![],
        }
    }

    #[test]
    fn test_hash_excludes_signature() {
        let a = header();
        let mut b = header();
        b.signature = vec![1, 2, 3];
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_covers_nonce_and_time() {
        let a = header();
        let mut b = header();
        b.nonce = 1;
        assert_ne!(a.hash(), b.hash());

        let mut c = header();
        c.timestamp = Utc.timestamp_opt(1_704_067_200, 5).unwrap();
        assert_ne!(a.hash(), c.hash());
    }
}
