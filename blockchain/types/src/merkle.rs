// Copyright (c) 2024 Tessera Foundation

use crate::{Hash256, Transaction};
use sha2::{Digest, Sha256};

/// Merkle root over the hashes of `transactions`.
///
/// Levels with an odd number of entries pair the last entry with itself. An
/// empty list has the zero root.
pub fn compute_merkle_root(transactions: &[Transaction]) -> Hash256 {
    let mut level: Vec<Hash256> = transactions.iter().map(Transaction::hash).collect();
    if level.is_empty() {
        return Hash256::ZERO;
    }

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                let mut hasher = Sha256::new();
                hasher.update(left.as_bytes());
                hasher.update(right.as_bytes());
                Hash256::from_hasher(hasher)
            })
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LockScript, OutPoint, TxIn, TxOut, Unlock};

    fn coinbase(tag: u8) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_output: OutPoint::null(),
                unlock: Unlock::Coinbase(vec![tag, tag]),
                sequence: u32::MAX,
            }],
            outputs: vec![TxOut::new(1, LockScript::NullData(vec![]))],
            lock_time: 0,
        }
    }

    #[test]
    fn test_single_transaction_root_is_its_hash() {
        let tx = coinbase(1);
        assert_eq!(compute_merkle_root(&[tx.clone()]), tx.hash());
    }

    #[test]
    fn test_odd_level_duplicates_last() {
        let txs = vec![coinbase(1), coinbase(2), coinbase(3)];
        let mut padded = txs.clone();
        padded.push(coinbase(3));
        assert_eq!(compute_merkle_root(&txs), compute_merkle_root(&padded));
    }

    #[test]
    fn test_order_matters() {
        let a = vec![coinbase(1), coinbase(2)];
        let b = vec![coinbase(2), coinbase(1)];
        assert_ne!(compute_merkle_root(&a), compute_merkle_root(&b));
        assert_eq!(compute_merkle_root(&[]), Hash256::ZERO);
    }
}
