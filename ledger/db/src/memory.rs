// Copyright (c) 2024 Tessera Foundation

//! In-memory chain state.

use crate::{ChainStore, SpentOutput, StoreError, StoredNode, UtxoEntry, WriteBatch, WriteOp};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tsr_blockchain_types::{AdminKeySets, Block, BlockHash, OutPoint};

#[derive(Default)]
struct Tables {
    best_tip: Option<BlockHash>,
    blocks: HashMap<BlockHash, Block>,
    nodes: HashMap<BlockHash, StoredNode>,
    utxos: BTreeMap<OutPoint, UtxoEntry>,
    spend_journals: HashMap<BlockHash, Vec<SpentOutput>>,
    admin_snapshots: HashMap<BlockHash, AdminKeySets>,
}

/// A [`ChainStore`] held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChainStore for MemoryStore {
    fn best_tip(&self) -> Result<Option<BlockHash>, StoreError> {
        Ok(self.tables.read().best_tip)
    }

    fn block(&self, hash: &BlockHash) -> Result<Option<Block>, StoreError> {
        Ok(self.tables.read().blocks.get(hash).cloned())
    }

    fn node(&self, hash: &BlockHash) -> Result<Option<StoredNode>, StoreError> {
        Ok(self.tables.read().nodes.get(hash).cloned())
    }

    fn nodes(&self) -> Result<Vec<StoredNode>, StoreError> {
        Ok(self.tables.read().nodes.values().cloned().collect())
    }

    fn utxo(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, StoreError> {
        Ok(self.tables.read().utxos.get(outpoint).cloned())
    }

    fn utxo_set(&self) -> Result<BTreeMap<OutPoint, UtxoEntry>, StoreError> {
        Ok(self.tables.read().utxos.clone())
    }

    fn spend_journal(&self, hash: &BlockHash) -> Result<Option<Vec<SpentOutput>>, StoreError> {
        Ok(self.tables.read().spend_journals.get(hash).cloned())
    }

    fn admin_snapshot(&self, hash: &BlockHash) -> Result<Option<AdminKeySets>, StoreError> {
        Ok(self.tables.read().admin_snapshots.get(hash).cloned())
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut tables = self.tables.write();

        // The only operation that can fail is a status update of an unknown
        // node, so check those before touching anything.
        for (i, op) in batch.ops().iter().enumerate() {
            if let WriteOp::SetStatus(hash, _) = op {
                let added_earlier = batch.ops()[..i]
                    .iter()
                    .any(|prev| matches!(prev, WriteOp::PutNode(node) if node.hash == *hash));
                if !added_earlier && !tables.nodes.contains_key(hash) {
                    return Err(StoreError::NodeNotFound(*hash));
                }
            }
        }

        for op in batch.into_ops() {
            match op {
                WriteOp::PutBlock(block) => {
                    tables.blocks.insert(block.hash(), block);
                }
                WriteOp::PutNode(node) => {
                    tables.nodes.insert(node.hash, node);
                }
                WriteOp::SetStatus(hash, status) => {
                    if let Some(node) = tables.nodes.get_mut(&hash) {
                        node.status = status;
                    }
                }
                WriteOp::PutUtxo(outpoint, entry) => {
                    tables.utxos.insert(outpoint, entry);
                }
                WriteOp::DeleteUtxo(outpoint) => {
                    tables.utxos.remove(&outpoint);
                }
                WriteOp::PutSpendJournal(hash, spent) => {
                    tables.spend_journals.insert(hash, spent);
                }
                WriteOp::DeleteSpendJournal(hash) => {
                    tables.spend_journals.remove(&hash);
                }
                WriteOp::PutAdminSnapshot(hash, keys) => {
                    tables.admin_snapshots.insert(hash, keys);
                }
                WriteOp::SetBestTip(hash) => {
                    tables.best_tip = Some(hash);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::BlockStatus;
    use chrono::{TimeZone, Utc};
    use tsr_blockchain_types::{BlockHeader, Hash256, LockScript, TxOut};
    use tsr_crypto_keys::PublicKey;

    pub fn test_node(tag: u8) -> StoredNode {
        let header = BlockHeader {
            version: 1,
            prev_block: Hash256::ZERO,
            merkle_root: Hash256([tag; 32]),
            timestamp: Utc.timestamp_opt(1_704_067_200 + tag as i64, 0).unwrap(),
            bits: 0x207f_ffff,
            nonce: 0,
            size: 0,
            validating_key: PublicKey::from_bytes([tag; 32]),
            signature: vec![],
        };
        StoredNode {
            hash: header.hash(),
            header,
            height: tag as u64,
            status: BlockStatus::Unvalidated,
        }
    }

    pub fn test_entry(value: i64) -> UtxoEntry {
        UtxoEntry {
            output: TxOut::new(value, LockScript::PayToKey(PublicKey::from_bytes([1u8; 32]))),
            height: 1,
            is_coinbase: false,
        }
    }

    /// Exercise the contract every store must meet.
    pub fn exercise_store<S: ChainStore>(store: &S) {
        assert_eq!(store.best_tip().unwrap(), None);

        let node = test_node(1);
        let outpoint = OutPoint::new(Hash256([7u8; 32]), 0);

        let mut batch = WriteBatch::new();
        batch.put_node(node.clone());
        batch.set_status(node.hash, BlockStatus::Valid);
        batch.put_utxo(outpoint, test_entry(50));
        batch.put_spend_journal(node.hash, vec![]);
        batch.set_best_tip(node.hash);
        store.commit(batch).unwrap();

        assert_eq!(store.best_tip().unwrap(), Some(node.hash));
        assert_eq!(
            store.node(&node.hash).unwrap().unwrap().status,
            BlockStatus::Valid
        );
        assert_eq!(store.utxo(&outpoint).unwrap(), Some(test_entry(50)));
        assert_eq!(store.spend_journal(&node.hash).unwrap(), Some(vec![]));
        assert_eq!(store.nodes().unwrap().len(), 1);

        // A failing batch leaves everything as it was.
        let missing = test_node(2);
        let mut batch = WriteBatch::new();
        batch.delete_utxo(outpoint);
        batch.set_best_tip(missing.hash);
        batch.set_status(missing.hash, BlockStatus::Invalid);
        assert!(store.commit(batch).is_err());
        assert_eq!(store.best_tip().unwrap(), Some(node.hash));
        assert_eq!(store.utxo(&outpoint).unwrap(), Some(test_entry(50)));

        let mut batch = WriteBatch::new();
        batch.delete_utxo(outpoint);
        batch.delete_spend_journal(node.hash);
        store.commit(batch).unwrap();
        assert!(store.utxo_set().unwrap().is_empty());
        assert_eq!(store.spend_journal(&node.hash).unwrap(), None);
    }

    #[test]
    fn test_memory_store_contract() {
        exercise_store(&MemoryStore::new());
    }
}
