// Copyright (c) 2024 Tessera Foundation

//! The chain engine.
//!
//! [`Chain`] owns the block index, the orphan pool and the view of the best
//! chain. Blocks are processed one at a time under the write side of a
//! reader-writer lock. Store commits and the best-state swap both happen
//! under that write guard, so queries holding the read side see the index,
//! the UTXO set and the tip at one point in time. Readers that only need the
//! tip take an [`Arc<BestState>`] snapshot instead.

mod index;
mod orphans;
mod selector;

pub use index::{BlockIndex, ChainNode, NodeId};
pub use orphans::OrphanPool;

use crate::{
    admin::apply_block_admin_ops,
    error::{assertion, rule_error, ChainError, ErrorCode, RuleError},
    params::{ChainParams, Checkpoint},
    time::Clock,
    utxo::UtxoViewpoint,
    validation::{
        check_block_context, check_block_sanity, check_checkpoint_bounds,
        context::latest_checkpoint_node,
    },
};
use bitflags::bitflags;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tsr_blockchain_types::{AdminKeySets, Block, BlockHash, OutPoint};
use tsr_consensus_pow::U256;
use tsr_crypto_keys::SignatureVerifier;
use tsr_ledger_db::{BlockStatus, ChainStore, StoredNode, UtxoEntry, WriteBatch};

bitflags! {
    /// Modifiers for [`Chain::process_block`].
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BehaviorFlags: u32 {
        /// The block is already known to be valid, for example because it
        /// sits below a checkpoint. Skips context and connect checks other
        /// than the coinbase height and checkpoint rules.
        const FAST_ADD = 1 << 0;
        /// Skip the hash-below-target check.
        const NO_POW_CHECK = 1 << 1;
    }
}

impl BehaviorFlags {
    /// No modifiers.
    pub const NONE: Self = Self::empty();
}

/// Tuning for the orphan pool.
#[derive(Clone, Copy, Debug)]
pub struct ChainOptions {
    pub max_orphans: usize,
    pub orphan_expiry: Duration,
}

impl Default for ChainOptions {
    fn default() -> Self {
        Self {
            max_orphans: 100,
            orphan_expiry: Duration::hours(1),
        }
    }
}

/// What happened to a processed block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockOutcome {
    /// The block was accepted.
    Accepted {
        /// It is now part of the best chain.
        main_chain: bool,
        /// Its parent is unknown and it waits in the orphan pool.
        orphan: bool,
    },
    /// The block broke a consensus rule.
    Rejected(RuleError),
}

impl BlockOutcome {
    pub fn is_main_chain(&self) -> bool {
        matches!(self, BlockOutcome::Accepted { main_chain: true, .. })
    }

    pub fn is_orphan(&self) -> bool {
        matches!(self, BlockOutcome::Accepted { orphan: true, .. })
    }

    /// The rule broken, if the block was rejected.
    pub fn rejection(&self) -> Option<&RuleError> {
        match self {
            BlockOutcome::Rejected(err) => Some(err),
            BlockOutcome::Accepted { .. } => None,
        }
    }
}

/// The tip of the best chain at one moment.
#[derive(Clone, Debug)]
pub struct BestState {
    pub hash: BlockHash,
    pub height: u64,
    pub bits: u32,
    /// Encoded size of the tip block.
    pub block_size: usize,
    pub num_txs: usize,
    pub total_work: U256,
    pub timestamp: DateTime<Utc>,
    /// Median time of the tip and its recent ancestors.
    pub median_time: DateTime<Utc>,
    /// Admin key sets in force after the tip.
    pub admin_keys: Arc<AdminKeySets>,
}

impl BestState {
    fn new(node: &ChainNode, block: &Block, median_time: DateTime<Utc>) -> Self {
        Self {
            hash: node.hash,
            height: node.height,
            bits: node.header.bits,
            block_size: block.serialized_size(),
            num_txs: block.transactions.len(),
            total_work: node.work_sum,
            timestamp: node.header.timestamp,
            median_time,
            admin_keys: Arc::clone(&node.admin_keys),
        }
    }
}

struct ChainInner {
    index: BlockIndex,
    orphans: OrphanPool,
}

/// Block validation and best-chain selection over a [`ChainStore`].
pub struct Chain {
    params: Arc<ChainParams>,
    store: Arc<dyn ChainStore>,
    verifier: Arc<dyn SignatureVerifier>,
    clock: Arc<dyn Clock>,
    inner: RwLock<ChainInner>,
    best: RwLock<Arc<BestState>>,
}

impl Chain {
    /// Open the chain stored in `store`, writing the genesis block first if
    /// the store is empty.
    pub fn new(
        params: Arc<ChainParams>,
        store: Arc<dyn ChainStore>,
        verifier: Arc<dyn SignatureVerifier>,
        clock: Arc<dyn Clock>,
        options: ChainOptions,
    ) -> Result<Self, ChainError> {
        if store.best_tip()?.is_none() {
            Self::write_genesis(&params, store.as_ref())?;
        }

        let index = Self::load_index(&params, store.as_ref())?;
        let tip = index
            .tip()
            .ok_or_else(|| assertion("block index has no tip"))?;
        let tip_node = index.node(tip);
        let tip_block = store
            .block(&tip_node.hash)?
            .ok_or_else(|| assertion(format!("best tip {:?} has no stored block", tip_node.hash)))?;
        let best = BestState::new(
            tip_node,
            &tip_block,
            index.median_time_past(tip, params.median_time_blocks),
        );
        info!(
            network = %params.network,
            height = best.height,
            tip = ?best.hash,
            blocks = index.len(),
            "Loaded chain state"
        );

        Ok(Self {
            params,
            store,
            verifier,
            clock,
            inner: RwLock::new(ChainInner {
                index,
                orphans: OrphanPool::new(options.max_orphans, options.orphan_expiry),
            }),
            best: RwLock::new(Arc::new(best)),
        })
    }

    fn write_genesis(params: &ChainParams, store: &dyn ChainStore) -> Result<(), ChainError> {
        let genesis = params.genesis_block();
        let hash = genesis.hash();

        let mut view = UtxoViewpoint::new(store);
        let journal = view.connect_block(&genesis, 0)?;

        let mut batch = WriteBatch::new();
        batch.put_node(StoredNode {
            hash,
            header: genesis.header.clone(),
            height: 0,
            status: BlockStatus::Valid,
        });
        view.write_to(&mut batch);
        batch.put_spend_journal(hash, journal);
        batch.put_admin_snapshot(hash, params.genesis_admin_keys.clone());
        batch.set_best_tip(hash);
        batch.put_block(genesis);
        store.commit(batch)?;

        info!(network = %params.network, genesis = ?hash, "Initialized chain state with genesis");
        Ok(())
    }

    fn load_index(params: &ChainParams, store: &dyn ChainStore) -> Result<BlockIndex, ChainError> {
        let mut nodes = store.nodes()?;
        nodes.sort_by_key(|node| node.height);

        let mut index = BlockIndex::new();
        for stored in nodes {
            let parent = match stored.height {
                0 => None,
                _ => Some(index.lookup(&stored.header.prev_block).ok_or_else(|| {
                    assertion(format!("stored block {:?} has no known parent", stored.hash))
                })?),
            };
            let admin_keys = match (store.admin_snapshot(&stored.hash)?, parent) {
                (Some(keys), _) => Arc::new(keys),
                (None, Some(parent)) => Arc::clone(&index.node(parent).admin_keys),
                (None, None) => {
                    return Err(assertion(format!(
                        "root block {:?} has no admin key snapshot",
                        stored.hash
                    )))
                }
            };
            let id = index.insert(stored.header, parent, stored.status, admin_keys);
            if index.node(id).height != stored.height {
                return Err(assertion(format!(
                    "stored height {} of block {:?} does not match its ancestry",
                    stored.height, stored.hash
                )));
            }
        }

        let genesis = params.genesis_hash();
        if index.lookup(&genesis).map(|id| index.node(id).height) != Some(0) {
            return Err(assertion(format!(
                "store does not contain the {} genesis block {genesis:?}",
                params.network
            )));
        }

        let tip_hash = store
            .best_tip()?
            .ok_or_else(|| assertion("store has no best tip"))?;
        let tip = index
            .lookup(&tip_hash)
            .ok_or_else(|| assertion(format!("best tip {tip_hash:?} is not a stored block")))?;
        index.set_tip(tip);
        Ok(index)
    }

    /// Validate `block` and add it to the chain.
    ///
    /// Rule violations are reported as [`BlockOutcome::Rejected`]; an `Err`
    /// means the engine itself failed and the block was not processed.
    pub fn process_block(&self, block: Block, flags: BehaviorFlags) -> Result<BlockOutcome, ChainError> {
        let hash = block.hash();
        let mut inner = self.inner.write();
        match self.process_block_locked(&mut inner, block, flags) {
            Err(ChainError::Rule(err)) => {
                debug!(block = ?hash, code = %err.code, %err, "Rejected block");
                Ok(BlockOutcome::Rejected(err))
            }
            other => other,
        }
    }

    fn process_block_locked(
        &self,
        inner: &mut ChainInner,
        block: Block,
        flags: BehaviorFlags,
    ) -> Result<BlockOutcome, ChainError> {
        let hash = block.hash();
        if inner.index.contains(&hash) || inner.orphans.contains(&hash) {
            return Err(rule_error(
                ErrorCode::DuplicateBlock,
                format!("already have block {hash:?}"),
            )
            .into());
        }

        let now = self.clock.now();
        check_block_sanity(&block, &self.params, now, self.verifier.as_ref(), flags)?;
        check_checkpoint_bounds(&block, &self.params, &inner.index, flags)?;

        if !inner.index.contains(&block.header.prev_block) {
            debug!(
                block = ?hash,
                parent = ?block.header.prev_block,
                "Adding orphan block"
            );
            inner.orphans.add(block, now);
            return Ok(BlockOutcome::Accepted {
                main_chain: false,
                orphan: true,
            });
        }

        let main_chain = self.maybe_accept_block(inner, block, flags)?;
        self.process_orphans(inner, hash, flags, now)?;
        Ok(BlockOutcome::Accepted {
            main_chain,
            orphan: false,
        })
    }

    /// Accept every orphan that descends from `hash`.
    fn process_orphans(
        &self,
        inner: &mut ChainInner,
        hash: BlockHash,
        flags: BehaviorFlags,
        now: DateTime<Utc>,
    ) -> Result<(), ChainError> {
        let mut parents = vec![hash];
        while let Some(parent) = parents.pop() {
            for orphan in inner.orphans.take_children(&parent, now) {
                let orphan_hash = orphan.hash();
                match self.maybe_accept_block(inner, orphan, flags) {
                    Ok(_) => parents.push(orphan_hash),
                    Err(ChainError::Rule(err)) => {
                        warn!(
                            block = ?orphan_hash,
                            code = %err.code,
                            %err,
                            "Dropping invalid orphan block"
                        );
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(())
    }

    /// Check `block` against its parent, add it to the index and let the
    /// selector decide whether it becomes part of the best chain.
    fn maybe_accept_block(
        &self,
        inner: &mut ChainInner,
        block: Block,
        flags: BehaviorFlags,
    ) -> Result<bool, ChainError> {
        let hash = block.hash();
        let parent_id = inner
            .index
            .lookup(&block.header.prev_block)
            .ok_or_else(|| assertion(format!("parent of {hash:?} is not indexed")))?;
        let parent = inner.index.node(parent_id);
        if !parent.status.is_usable() {
            return Err(rule_error(
                ErrorCode::InvalidAncestorBlock,
                format!("block {hash:?} extends invalid block {:?}", parent.hash),
            )
            .into());
        }

        check_block_context(&block, &self.params, &inner.index, parent_id, flags)?;

        let verifier = if flags.contains(BehaviorFlags::FAST_ADD) {
            None
        } else {
            Some(self.verifier.as_ref())
        };
        let admin_keys = apply_block_admin_ops(&parent.admin_keys, &block, &self.params, verifier)?;
        let keys_changed = !Arc::ptr_eq(&admin_keys, &parent.admin_keys);

        let node_id = inner.index.insert(
            block.header.clone(),
            Some(parent_id),
            BlockStatus::Unvalidated,
            Arc::clone(&admin_keys),
        );

        let mut pending = WriteBatch::new();
        pending.put_block(block.clone());
        pending.put_node(inner.index.node(node_id).to_stored());
        if keys_changed {
            pending.put_admin_snapshot(hash, (*admin_keys).clone());
        }

        let result = self.connect_best_chain(inner, node_id, &block, flags, pending);
        if matches!(result, Err(ChainError::Store(_) | ChainError::Assertion(_))) {
            inner.index.remove_newest(node_id);
        }
        result
    }

    /// The network parameters.
    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// A snapshot of the best chain tip.
    pub fn best_snapshot(&self) -> Arc<BestState> {
        Arc::clone(&self.best.read())
    }

    /// Admin key sets in force at the best chain tip.
    pub fn admin_key_sets(&self) -> Arc<AdminKeySets> {
        Arc::clone(&self.best.read().admin_keys)
    }

    /// An unspent output of the best chain.
    pub fn fetch_utxo(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, ChainError> {
        let _inner = self.inner.read();
        Ok(self.store.utxo(outpoint)?)
    }

    /// Unspent outputs together with the best tip they belong to.
    pub fn fetch_utxos(
        &self,
        outpoints: &[OutPoint],
    ) -> Result<(Arc<BestState>, Vec<Option<UtxoEntry>>), ChainError> {
        let _inner = self.inner.read();
        let entries = outpoints
            .iter()
            .map(|outpoint| self.store.utxo(outpoint))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((self.best_snapshot(), entries))
    }

    /// Whether the block is indexed or waiting as an orphan.
    pub fn have_block(&self, hash: &BlockHash) -> bool {
        let inner = self.inner.read();
        inner.index.contains(hash) || inner.orphans.contains(hash)
    }

    pub fn is_known_orphan(&self, hash: &BlockHash) -> bool {
        self.inner.read().orphans.contains(hash)
    }

    /// The earliest missing ancestor's child for an orphan chain ending at
    /// `hash`: the block whose parent should be requested.
    pub fn orphan_root(&self, hash: &BlockHash) -> BlockHash {
        self.inner.read().orphans.root_of(hash)
    }

    /// A stored block, on any branch.
    pub fn block_by_hash(&self, hash: &BlockHash) -> Result<Option<Block>, ChainError> {
        Ok(self.store.block(hash)?)
    }

    /// Validation status of an indexed block.
    pub fn block_status(&self, hash: &BlockHash) -> Option<BlockStatus> {
        let inner = self.inner.read();
        inner.index.lookup(hash).map(|id| inner.index.node(id).status)
    }

    /// Hash of the best-chain block at `height`.
    pub fn main_chain_hash(&self, height: u64) -> Option<BlockHash> {
        let inner = self.inner.read();
        inner
            .index
            .main_chain_node(height)
            .map(|id| inner.index.node(id).hash)
    }

    /// The most recent checkpoint the best chain has passed.
    pub fn latest_checkpoint(&self) -> Option<Checkpoint> {
        let inner = self.inner.read();
        latest_checkpoint_node(&inner.index, &self.params).map(|id| {
            let node = inner.index.node(id);
            Checkpoint {
                height: node.height,
                hash: node.hash,
            }
        })
    }

    /// Bits required of the next block on the best chain.
    pub fn calc_next_required_bits(&self) -> Result<u32, ChainError> {
        let inner = self.inner.read();
        let tip = inner
            .index
            .tip()
            .ok_or_else(|| assertion("block index has no tip"))?;
        Ok(inner.index.next_required_bits(tip, &self.params))
    }
}
