// Copyright (c) 2024 Tessera Foundation

//! LMDB-backed chain state.

use crate::{
    block_store::BlockStore, utxo_store::UtxoStore, ChainStore, SpentOutput, StoreError,
    StoredNode, UtxoEntry, WriteBatch, WriteOp,
};
use lmdb::{Environment, EnvironmentFlags, Transaction};
use std::{collections::BTreeMap, fs, path::Path};
use tracing::{debug, info};
use tsr_blockchain_types::{AdminKeySets, Block, BlockHash, OutPoint};

/// Maximum size of the memory map.
pub const MAX_LMDB_FILE_SIZE: usize = 1 << 30; // 1 GB

/// Number of named databases the store opens.
const MAX_DBS: u32 = 8;

const DATA_FILE_NAME: &str = "chain.mdb";

/// A [`ChainStore`] persisted in an LMDB environment.
///
/// Each [`WriteBatch`] is applied inside a single read-write transaction, so
/// a crash mid-commit leaves the previous state intact.
pub struct LmdbStore {
    env: Environment,
    block_store: BlockStore,
    utxo_store: UtxoStore,
}

impl LmdbStore {
    /// Open the store in `path`, creating it if it does not exist.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(path)?;
        let env = Environment::new()
            .set_flags(EnvironmentFlags::NO_SUB_DIR)
            .set_max_dbs(MAX_DBS)
            .set_map_size(MAX_LMDB_FILE_SIZE)
            .open(path.join(DATA_FILE_NAME).as_ref())?;

        BlockStore::create(&env)?;
        UtxoStore::create(&env)?;

        let store = Self {
            block_store: BlockStore::new(&env)?,
            utxo_store: UtxoStore::new(&env)?,
            env,
        };
        info!(path = %path.display(), "Opened chain store");
        Ok(store)
    }
}

impl ChainStore for LmdbStore {
    fn best_tip(&self) -> Result<Option<BlockHash>, StoreError> {
        let db_transaction = self.env.begin_ro_txn()?;
        self.block_store.best_tip(&db_transaction)
    }

    fn block(&self, hash: &BlockHash) -> Result<Option<Block>, StoreError> {
        let db_transaction = self.env.begin_ro_txn()?;
        self.block_store.get_block(hash, &db_transaction)
    }

    fn node(&self, hash: &BlockHash) -> Result<Option<StoredNode>, StoreError> {
        let db_transaction = self.env.begin_ro_txn()?;
        self.block_store.get_node(hash, &db_transaction)
    }

    fn nodes(&self) -> Result<Vec<StoredNode>, StoreError> {
        let db_transaction = self.env.begin_ro_txn()?;
        self.block_store.get_all_nodes(&db_transaction)
    }

    fn utxo(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, StoreError> {
        let db_transaction = self.env.begin_ro_txn()?;
        self.utxo_store.get(outpoint, &db_transaction)
    }

    fn utxo_set(&self) -> Result<BTreeMap<OutPoint, UtxoEntry>, StoreError> {
        let db_transaction = self.env.begin_ro_txn()?;
        self.utxo_store.get_all(&db_transaction)
    }

    fn spend_journal(&self, hash: &BlockHash) -> Result<Option<Vec<SpentOutput>>, StoreError> {
        let db_transaction = self.env.begin_ro_txn()?;
        self.block_store.get_spend_journal(hash, &db_transaction)
    }

    fn admin_snapshot(&self, hash: &BlockHash) -> Result<Option<AdminKeySets>, StoreError> {
        let db_transaction = self.env.begin_ro_txn()?;
        self.block_store.get_admin_snapshot(hash, &db_transaction)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let num_ops = batch.len();
        let mut db_transaction = self.env.begin_rw_txn()?;

        // Any error drops `db_transaction` uncommitted, aborting the batch.
        for op in batch.into_ops() {
            match op {
                WriteOp::PutBlock(block) => self.block_store.put_block(&block, &mut db_transaction)?,
                WriteOp::PutNode(node) => self.block_store.put_node(&node, &mut db_transaction)?,
                WriteOp::SetStatus(hash, status) => {
                    self.block_store
                        .set_status(&hash, status, &mut db_transaction)?
                }
                WriteOp::PutUtxo(outpoint, entry) => {
                    self.utxo_store.put(&outpoint, &entry, &mut db_transaction)?
                }
                WriteOp::DeleteUtxo(outpoint) => {
                    self.utxo_store.delete(&outpoint, &mut db_transaction)?
                }
                WriteOp::PutSpendJournal(hash, spent) => {
                    self.block_store
                        .put_spend_journal(&hash, &spent, &mut db_transaction)?
                }
                WriteOp::DeleteSpendJournal(hash) => {
                    self.block_store
                        .delete_spend_journal(&hash, &mut db_transaction)?
                }
                WriteOp::PutAdminSnapshot(hash, keys) => {
                    self.block_store
                        .put_admin_snapshot(&hash, &keys, &mut db_transaction)?
                }
                WriteOp::SetBestTip(hash) => {
                    self.block_store.set_best_tip(&hash, &mut db_transaction)?
                }
            }
        }

        db_transaction.commit()?;
        debug!(num_ops, "Committed write batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{memory::tests::exercise_store, memory::tests::test_entry, BlockStatus};
    use tempfile::tempdir;
    use tsr_blockchain_types::Hash256;

    #[test]
    fn test_lmdb_store_contract() {
        let dir = tempdir().unwrap();
        let store = LmdbStore::open(dir.path()).unwrap();
        exercise_store(&store);
    }

    #[test]
    fn test_lmdb_store_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let node = crate::memory::tests::test_node(3);
        let outpoint = OutPoint::new(Hash256([4u8; 32]), 2);

        {
            let store = LmdbStore::open(dir.path()).unwrap();
            let mut batch = WriteBatch::new();
            batch.put_node(node.clone());
            batch.put_utxo(outpoint, test_entry(25));
            batch.put_admin_snapshot(node.hash, AdminKeySets::default());
            batch.set_best_tip(node.hash);
            store.commit(batch).unwrap();
        }

        let store = LmdbStore::open(dir.path()).unwrap();
        assert_eq!(store.best_tip().unwrap(), Some(node.hash));
        assert_eq!(store.nodes().unwrap(), vec![node.clone()]);
        assert_eq!(
            store.node(&node.hash).unwrap().unwrap().status,
            BlockStatus::Unvalidated
        );
        assert_eq!(store.utxo_set().unwrap().len(), 1);
        assert_eq!(store.utxo(&outpoint).unwrap(), Some(test_entry(25)));
        assert_eq!(
            store.admin_snapshot(&node.hash).unwrap(),
            Some(AdminKeySets::default())
        );
    }
}
