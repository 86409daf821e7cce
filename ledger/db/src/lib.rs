// Copyright (c) 2024 Tessera Foundation

//! Persistent chain state.
//!
//! The chain engine reads through [`ChainStore`] and writes only by
//! committing a [`WriteBatch`], which every implementation applies
//! all-or-nothing. Two implementations are provided: [`MemoryStore`] for
//! tests and ephemeral nodes, and [`LmdbStore`] for disk.

#![deny(missing_docs)]

mod block_store;
mod error;
mod lmdb_store;
mod memory;
mod types;
mod utxo_store;

pub use crate::{
    error::StoreError,
    lmdb_store::LmdbStore,
    memory::MemoryStore,
    types::{BlockStatus, SpentOutput, StoredNode, UtxoEntry, WriteBatch, WriteOp},
};

use std::collections::BTreeMap;
use tsr_blockchain_types::{AdminKeySets, Block, BlockHash, OutPoint};

/// Read access to chain state plus atomic batch commit.
pub trait ChainStore: Send + Sync {
    /// Hash of the best chain tip, or `None` for an empty store.
    fn best_tip(&self) -> Result<Option<BlockHash>, StoreError>;

    /// A stored block by hash.
    fn block(&self, hash: &BlockHash) -> Result<Option<Block>, StoreError>;

    /// A stored chain node by hash.
    fn node(&self, hash: &BlockHash) -> Result<Option<StoredNode>, StoreError>;

    /// Every stored chain node, in no particular order.
    fn nodes(&self) -> Result<Vec<StoredNode>, StoreError>;

    /// An unspent output of the best chain.
    fn utxo(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, StoreError>;

    /// The whole unspent output set of the best chain.
    fn utxo_set(&self) -> Result<BTreeMap<OutPoint, UtxoEntry>, StoreError>;

    /// Outputs spent by a connected block, in spend order.
    fn spend_journal(&self, hash: &BlockHash) -> Result<Option<Vec<SpentOutput>>, StoreError>;

    /// The admin key sets recorded for a block, if they differ from its
    /// parent's.
    fn admin_snapshot(&self, hash: &BlockHash) -> Result<Option<AdminKeySets>, StoreError>;

    /// Apply every operation of `batch`, or none of them.
    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}
