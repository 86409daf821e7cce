// Copyright (c) 2024 Tessera Foundation

//! Blocks, chain nodes, spend journals and admin snapshots, all keyed by
//! block hash, plus the best-tip pointer.

use crate::{BlockStatus, SpentOutput, StoreError, StoredNode};
use lmdb::{Cursor, Database, DatabaseFlags, Environment, RwTransaction, Transaction, WriteFlags};
use serde::{de::DeserializeOwned, Serialize};
use tsr_blockchain_types::{AdminKeySets, Block, BlockHash, Hash256};

// LMDB Database names.
pub const BLOCKS_DB_NAME: &str = "block_store:blocks";
pub const NODES_DB_NAME: &str = "block_store:nodes";
pub const SPEND_JOURNAL_DB_NAME: &str = "block_store:spend_journal";
pub const ADMIN_SNAPSHOTS_DB_NAME: &str = "block_store:admin_snapshots";
pub const META_DB_NAME: &str = "block_store:meta";

// Keys used by the `meta` database.
pub const BEST_TIP_KEY: &str = "best_tip";

#[derive(Clone)]
pub struct BlockStore {
    /// `hash -> encode(&block)`
    blocks: Database,

    /// `hash -> encode(&stored_node)`
    nodes: Database,

    /// `hash -> encode(&Vec<SpentOutput>)`, only for blocks on the best chain.
    spend_journal: Database,

    /// `hash -> encode(&admin_key_sets)`, only where the sets changed.
    admin_snapshots: Database,

    /// * `BEST_TIP_KEY` --> hash of the best chain tip.
    meta: Database,
}

impl BlockStore {
    /// Opens an existing BlockStore.
    pub fn new(env: &Environment) -> Result<Self, StoreError> {
        Ok(BlockStore {
            blocks: env.open_db(Some(BLOCKS_DB_NAME))?,
            nodes: env.open_db(Some(NODES_DB_NAME))?,
            spend_journal: env.open_db(Some(SPEND_JOURNAL_DB_NAME))?,
            admin_snapshots: env.open_db(Some(ADMIN_SNAPSHOTS_DB_NAME))?,
            meta: env.open_db(Some(META_DB_NAME))?,
        })
    }

    // Creates a fresh BlockStore on disk.
    pub fn create(env: &Environment) -> Result<(), StoreError> {
        for name in [
            BLOCKS_DB_NAME,
            NODES_DB_NAME,
            SPEND_JOURNAL_DB_NAME,
            ADMIN_SNAPSHOTS_DB_NAME,
            META_DB_NAME,
        ] {
            env.create_db(Some(name), DatabaseFlags::empty())?;
        }
        Ok(())
    }

    pub fn best_tip<T: Transaction>(&self, db_transaction: &T) -> Result<Option<BlockHash>, StoreError> {
        match db_transaction.get(self.meta, &BEST_TIP_KEY) {
            Ok(bytes) => {
                let raw: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| StoreError::Corrupt("best tip is not 32 bytes".into()))?;
                Ok(Some(Hash256(raw)))
            }
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_best_tip(
        &self,
        hash: &BlockHash,
        db_transaction: &mut RwTransaction,
    ) -> Result<(), StoreError> {
        db_transaction.put(self.meta, &BEST_TIP_KEY, hash, WriteFlags::empty())?;
        Ok(())
    }

    pub fn get_block<T: Transaction>(
        &self,
        hash: &BlockHash,
        db_transaction: &T,
    ) -> Result<Option<Block>, StoreError> {
        get_value(self.blocks, hash, db_transaction)
    }

    pub fn put_block(&self, block: &Block, db_transaction: &mut RwTransaction) -> Result<(), StoreError> {
        put_value(self.blocks, &block.hash(), block, db_transaction)
    }

    pub fn get_node<T: Transaction>(
        &self,
        hash: &BlockHash,
        db_transaction: &T,
    ) -> Result<Option<StoredNode>, StoreError> {
        get_value(self.nodes, hash, db_transaction)
    }

    pub fn put_node(&self, node: &StoredNode, db_transaction: &mut RwTransaction) -> Result<(), StoreError> {
        put_value(self.nodes, &node.hash, node, db_transaction)
    }

    pub fn set_status(
        &self,
        hash: &BlockHash,
        status: BlockStatus,
        db_transaction: &mut RwTransaction,
    ) -> Result<(), StoreError> {
        let mut node = self
            .get_node(hash, &*db_transaction)?
            .ok_or(StoreError::NodeNotFound(*hash))?;
        node.status = status;
        self.put_node(&node, db_transaction)
    }

    pub fn get_all_nodes<T: Transaction>(&self, db_transaction: &T) -> Result<Vec<StoredNode>, StoreError> {
        let mut nodes = Vec::new();
        let mut cursor = db_transaction.open_ro_cursor(self.nodes)?;
        for item in cursor.iter_start() {
            let (_key, value) = item?;
            nodes.push(bincode::deserialize(value)?);
        }
        Ok(nodes)
    }

    pub fn get_spend_journal<T: Transaction>(
        &self,
        hash: &BlockHash,
        db_transaction: &T,
    ) -> Result<Option<Vec<SpentOutput>>, StoreError> {
        get_value(self.spend_journal, hash, db_transaction)
    }

    pub fn put_spend_journal(
        &self,
        hash: &BlockHash,
        spent: &[SpentOutput],
        db_transaction: &mut RwTransaction,
    ) -> Result<(), StoreError> {
        put_value(self.spend_journal, hash, spent, db_transaction)
    }

    pub fn delete_spend_journal(
        &self,
        hash: &BlockHash,
        db_transaction: &mut RwTransaction,
    ) -> Result<(), StoreError> {
        match db_transaction.del(self.spend_journal, hash, None) {
            Ok(()) | Err(lmdb::Error::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_admin_snapshot<T: Transaction>(
        &self,
        hash: &BlockHash,
        db_transaction: &T,
    ) -> Result<Option<AdminKeySets>, StoreError> {
        get_value(self.admin_snapshots, hash, db_transaction)
    }

    pub fn put_admin_snapshot(
        &self,
        hash: &BlockHash,
        keys: &AdminKeySets,
        db_transaction: &mut RwTransaction,
    ) -> Result<(), StoreError> {
        put_value(self.admin_snapshots, hash, keys, db_transaction)
    }
}

fn get_value<V: DeserializeOwned, T: Transaction>(
    db: Database,
    hash: &BlockHash,
    db_transaction: &T,
) -> Result<Option<V>, StoreError> {
    match db_transaction.get(db, hash) {
        Ok(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
        Err(lmdb::Error::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn put_value<V: Serialize + ?Sized>(
    db: Database,
    hash: &BlockHash,
    value: &V,
    db_transaction: &mut RwTransaction,
) -> Result<(), StoreError> {
    let bytes = bincode::serialize(value)?;
    db_transaction.put(db, hash, &bytes, WriteFlags::empty())?;
    Ok(())
}
