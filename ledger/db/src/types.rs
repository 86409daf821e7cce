// Copyright (c) 2024 Tessera Foundation

use serde::{Deserialize, Serialize};
use tsr_blockchain_types::{AdminKeySets, Block, BlockHash, BlockHeader, OutPoint, TxOut};

/// An unspent output with the metadata needed to validate spending it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    /// The output itself.
    pub output: TxOut,
    /// Height of the block that created it.
    pub height: u64,
    /// Whether it was created by a coinbase and so subject to maturity.
    pub is_coinbase: bool,
}

/// An output consumed by a connected block, kept so the block can be
/// disconnected again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpentOutput {
    /// The spent outpoint.
    pub outpoint: OutPoint,
    /// Its entry just before it was spent.
    pub entry: UtxoEntry,
}

/// How far a chain node has been validated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockStatus {
    /// Passed structural and header-context checks; not yet connected.
    Unvalidated,
    /// Connected to a chain at least once.
    Valid,
    /// Failed connection, or descends from a block that did.
    Invalid,
}

impl BlockStatus {
    /// Whether the node may still become part of the best chain.
    pub fn is_usable(&self) -> bool {
        !matches!(self, BlockStatus::Invalid)
    }
}

/// The persisted form of a chain node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredNode {
    /// Block hash.
    pub hash: BlockHash,
    /// Block header.
    pub header: BlockHeader,
    /// Height assigned by the engine.
    pub height: u64,
    /// Validation status.
    pub status: BlockStatus,
}

/// One write in a [`WriteBatch`].
#[derive(Clone, Debug)]
pub enum WriteOp {
    /// Store a full block.
    PutBlock(Block),
    /// Store a chain node.
    PutNode(StoredNode),
    /// Update the status of a stored node.
    SetStatus(BlockHash, BlockStatus),
    /// Add or replace an unspent output.
    PutUtxo(OutPoint, UtxoEntry),
    /// Remove an unspent output.
    DeleteUtxo(OutPoint),
    /// Record the outputs a connected block spent.
    PutSpendJournal(BlockHash, Vec<SpentOutput>),
    /// Drop the journal of a disconnected block.
    DeleteSpendJournal(BlockHash),
    /// Record a block's admin key sets.
    PutAdminSnapshot(BlockHash, AdminKeySets),
    /// Move the best chain tip.
    SetBestTip(BlockHash),
}

/// An ordered list of writes committed atomically.
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// An empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation.
    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    /// Store a full block.
    pub fn put_block(&mut self, block: Block) {
        self.push(WriteOp::PutBlock(block));
    }

    /// Store a chain node.
    pub fn put_node(&mut self, node: StoredNode) {
        self.push(WriteOp::PutNode(node));
    }

    /// Update a node's status.
    pub fn set_status(&mut self, hash: BlockHash, status: BlockStatus) {
        self.push(WriteOp::SetStatus(hash, status));
    }

    /// Add or replace an unspent output.
    pub fn put_utxo(&mut self, outpoint: OutPoint, entry: UtxoEntry) {
        self.push(WriteOp::PutUtxo(outpoint, entry));
    }

    /// Remove an unspent output.
    pub fn delete_utxo(&mut self, outpoint: OutPoint) {
        self.push(WriteOp::DeleteUtxo(outpoint));
    }

    /// Record a block's spend journal.
    pub fn put_spend_journal(&mut self, hash: BlockHash, spent: Vec<SpentOutput>) {
        self.push(WriteOp::PutSpendJournal(hash, spent));
    }

    /// Drop a block's spend journal.
    pub fn delete_spend_journal(&mut self, hash: BlockHash) {
        self.push(WriteOp::DeleteSpendJournal(hash));
    }

    /// Record a block's admin key sets.
    pub fn put_admin_snapshot(&mut self, hash: BlockHash, keys: AdminKeySets) {
        self.push(WriteOp::PutAdminSnapshot(hash, keys));
    }

    /// Move the best tip.
    pub fn set_best_tip(&mut self, hash: BlockHash) {
        self.push(WriteOp::SetBestTip(hash));
    }

    /// Append every operation of `other`, keeping its order.
    pub fn extend(&mut self, other: WriteBatch) {
        self.ops.extend(other.ops);
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True if there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The operations, in order.
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Consume the batch, yielding its operations in order.
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}
