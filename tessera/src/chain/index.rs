// Copyright (c) 2024 Tessera Foundation

//! In-memory index of every known block header.
//!
//! Nodes live in an arena and refer to their parent by position, so walking
//! towards genesis never touches the store. A node is always inserted after
//! its parent.

use crate::params::ChainParams;
use chrono::{DateTime, Utc};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tsr_blockchain_types::{AdminKeySets, BlockHash, BlockHeader};
use tsr_consensus_pow::{calc_work, hash_to_value, is_retarget_height, retarget, U256};
use tsr_ledger_db::{BlockStatus, StoredNode};

/// Position of a node in the index.
pub type NodeId = usize;

/// One known block.
#[derive(Clone, Debug)]
pub struct ChainNode {
    pub hash: BlockHash,
    pub parent: Option<NodeId>,
    pub height: u64,
    pub header: BlockHeader,
    /// Cumulative work of the chain ending here.
    pub work_sum: U256,
    pub status: BlockStatus,
    /// Admin key sets in force after this block.
    pub admin_keys: Arc<AdminKeySets>,
}

impl ChainNode {
    /// The persisted form of this node.
    pub fn to_stored(&self) -> StoredNode {
        StoredNode {
            hash: self.hash,
            header: self.header.clone(),
            height: self.height,
            status: self.status,
        }
    }

    /// Whether a chain ending here should replace one ending at `other`.
    ///
    /// More work wins; equal work goes to the numerically lower hash so that
    /// every node settles on the same tip whatever order blocks arrive in.
    pub fn is_better_than(&self, other: &ChainNode) -> bool {
        if self.work_sum != other.work_sum {
            return self.work_sum > other.work_sum;
        }
        hash_to_value(self.hash.as_bytes()) < hash_to_value(other.hash.as_bytes())
    }
}

/// Every known block, plus the current main chain.
#[derive(Debug, Default)]
pub struct BlockIndex {
    nodes: Vec<ChainNode>,
    by_hash: HashMap<BlockHash, NodeId>,
    main_chain: Vec<NodeId>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node under `parent`, deriving its height and work.
    pub fn insert(
        &mut self,
        header: BlockHeader,
        parent: Option<NodeId>,
        status: BlockStatus,
        admin_keys: Arc<AdminKeySets>,
    ) -> NodeId {
        let (height, parent_work) = match parent {
            Some(id) => (self.nodes[id].height + 1, self.nodes[id].work_sum),
            None => (0, U256::zero()),
        };
        let hash = header.hash();
        let id = self.nodes.len();
        self.nodes.push(ChainNode {
            hash,
            parent,
            height,
            work_sum: parent_work.saturating_add(calc_work(header.bits)),
            header,
            status,
            admin_keys,
        });
        self.by_hash.insert(hash, id);
        id
    }

    /// Drop the most recently inserted node. Used to undo an insert whose
    /// persistence failed.
    pub fn remove_newest(&mut self, id: NodeId) {
        if id + 1 == self.nodes.len() && !self.main_chain.contains(&id) {
            if let Some(node) = self.nodes.pop() {
                self.by_hash.remove(&node.hash);
            }
        }
    }

    pub fn lookup(&self, hash: &BlockHash) -> Option<NodeId> {
        self.by_hash.get(hash).copied()
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn node(&self, id: NodeId) -> &ChainNode {
        &self.nodes[id]
    }

    pub fn set_status(&mut self, id: NodeId, status: BlockStatus) {
        self.nodes[id].status = status;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Tip of the main chain.
    pub fn tip(&self) -> Option<NodeId> {
        self.main_chain.last().copied()
    }

    /// The main-chain node at `height`.
    pub fn main_chain_node(&self, height: u64) -> Option<NodeId> {
        usize::try_from(height)
            .ok()
            .and_then(|h| self.main_chain.get(h))
            .copied()
    }

    pub fn is_in_main_chain(&self, id: NodeId) -> bool {
        self.main_chain_node(self.nodes[id].height) == Some(id)
    }

    /// Make `id` the main-chain tip.
    pub fn set_tip(&mut self, id: NodeId) {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            if self.is_in_main_chain(node_id) {
                break;
            }
            path.push(node_id);
            current = self.nodes[node_id].parent;
        }

        let keep = current.map_or(0, |fork| self.nodes[fork].height as usize + 1);
        self.main_chain.truncate(keep);
        self.main_chain.extend(path.into_iter().rev());
    }

    /// The ancestor of `id` at `height`.
    pub fn ancestor(&self, id: NodeId, height: u64) -> Option<NodeId> {
        if height > self.nodes[id].height {
            return None;
        }
        if self.is_in_main_chain(id) {
            return self.main_chain_node(height);
        }
        let mut current = id;
        while self.nodes[current].height > height {
            current = self.nodes[current].parent?;
        }
        Some(current)
    }

    /// The last common ancestor of `a` and `b`.
    pub fn find_fork(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        let height = self.nodes[a].height.min(self.nodes[b].height);
        let mut a = self.ancestor(a, height)?;
        let mut b = self.ancestor(b, height)?;
        while a != b {
            a = self.nodes[a].parent?;
            b = self.nodes[b].parent?;
        }
        Some(a)
    }

    /// Nodes strictly after `ancestor` up to and including `descendant`,
    /// in ascending height.
    pub fn path_from(&self, ancestor: NodeId, descendant: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = Some(descendant);
        while let Some(id) = current {
            if id == ancestor {
                break;
            }
            path.push(id);
            current = self.nodes[id].parent;
        }
        path.reverse();
        path
    }

    /// `id` and every known node descending from it.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut found: HashSet<NodeId> = HashSet::from([id]);
        let mut ordered = vec![id];
        for (child, node) in self.nodes.iter().enumerate().skip(id + 1) {
            if node.parent.is_some_and(|parent| found.contains(&parent)) {
                found.insert(child);
                ordered.push(child);
            }
        }
        ordered
    }

    /// Median timestamp of `id` and up to `count - 1` of its ancestors.
    pub fn median_time_past(&self, id: NodeId, count: usize) -> DateTime<Utc> {
        let count = count.max(1);
        let mut timestamps = Vec::with_capacity(count);
        let mut current = Some(id);
        while let Some(node_id) = current {
            if timestamps.len() == count {
                break;
            }
            timestamps.push(self.nodes[node_id].header.timestamp);
            current = self.nodes[node_id].parent;
        }
        timestamps.sort_unstable();
        timestamps[timestamps.len() / 2]
    }

    /// Bits required of a block whose parent is `parent`.
    pub fn next_required_bits(&self, parent: NodeId, params: &ChainParams) -> u32 {
        let node = &self.nodes[parent];
        let height = node.height + 1;
        if !is_retarget_height(&params.pow, height) {
            return node.header.bits;
        }

        let first_height = height.saturating_sub(params.pow.retarget_interval());
        let first = self.ancestor(parent, first_height).unwrap_or(parent);
        let actual_timespan =
            (node.header.timestamp - self.nodes[first].header.timestamp).num_seconds();
        retarget(&params.pow, node.header.bits, actual_timespan)
    }
}
