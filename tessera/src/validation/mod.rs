// Copyright (c) 2024 Tessera Foundation

//! Block and transaction validation.
//!
//! Checks run in three stages of increasing cost and context:
//!
//! * [`sanity`]: everything that depends on the block alone,
//! * [`context`]: rules that need the block's position in the index,
//! * [`connect`]: rules that need the unspent output set.

pub mod connect;
pub mod context;
pub mod sanity;

pub use connect::check_connect_block;
pub use context::{check_block_context, check_checkpoint_bounds};
pub use sanity::{check_block_sanity, check_transaction_sanity};

use chrono::{DateTime, Utc};
use tsr_blockchain_types::{Block, Transaction, Unlock, LOCK_TIME_THRESHOLD, MAX_TX_IN_SEQUENCE};

/// Whether `tx` may be included in a block at `height` with time
/// `block_time`.
pub fn is_finalized_tx(tx: &Transaction, height: u64, block_time: DateTime<Utc>) -> bool {
    if tx.lock_time == 0 {
        return true;
    }

    let lock_time = u64::from(tx.lock_time);
    let bound = if tx.lock_time < LOCK_TIME_THRESHOLD {
        height
    } else {
        block_time.timestamp().max(0) as u64
    };
    if lock_time < bound {
        return true;
    }

    tx.inputs
        .iter()
        .all(|input| input.sequence == MAX_TX_IN_SEQUENCE)
}

/// The height encoded at the start of the block's coinbase data.
pub fn coinbase_height(block: &Block) -> Option<u64> {
    let coinbase = block.transactions.first()?;
    match &coinbase.inputs.first()?.unlock {
        Unlock::Coinbase(data) => {
            let prefix: [u8; 8] = data.get(..8)?.try_into().ok()?;
            Some(u64::from_le_bytes(prefix))
        }
        Unlock::Signatures(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tsr_blockchain_types::{Hash256, LockScript, OutPoint, TxIn, TxOut};
    use tsr_crypto_keys::PublicKey;

    fn locked(lock_time: u32, sequence: u32) -> Transaction {
        Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_output: OutPoint::new(Hash256([1u8; 32]), 0),
                unlock: Unlock::Signatures(vec![]),
                sequence,
            }],
            outputs: vec![TxOut::new(1, LockScript::PayToKey(PublicKey::default()))],
            lock_time,
        }
    }

    #[test]
    fn test_height_lock() {
        let time = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert!(is_finalized_tx(&locked(0, 0), 1, time));
        assert!(is_finalized_tx(&locked(10, 0), 11, time));
        assert!(!is_finalized_tx(&locked(10, 0), 10, time));
        assert!(is_finalized_tx(&locked(10, MAX_TX_IN_SEQUENCE), 10, time));
    }

    #[test]
    fn test_time_lock() {
        let lock = 1_700_000_000u32;
        let before = Utc.timestamp_opt(i64::from(lock), 0).unwrap();
        let after = Utc.timestamp_opt(i64::from(lock) + 1, 0).unwrap();
        assert!(!is_finalized_tx(&locked(lock, 0), 1_000_000, before));
        assert!(is_finalized_tx(&locked(lock, 0), 1, after));
    }

    #[test]
    fn test_coinbase_height() {
        let block = crate::params::ChainParams::regtest().genesis_block();
        assert_eq!(coinbase_height(&block), Some(0));

        let mut short = block.clone();
        short.transactions[0].inputs[0].unlock = Unlock::Coinbase(vec![1, 2, 3]);
        assert_eq!(coinbase_height(&short), None);
    }
}
