// Copyright (c) 2024 Tessera Foundation

//! Blocks whose parent is not yet known.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::debug;
use tsr_blockchain_types::{Block, BlockHash};

struct OrphanBlock {
    block: Block,
    expires_at: DateTime<Utc>,
    /// Insertion order, breaks ties between equal expiry times.
    sequence: u64,
}

/// A bounded pool of orphan blocks indexed by parent hash.
pub struct OrphanPool {
    orphans: HashMap<BlockHash, OrphanBlock>,
    by_parent: HashMap<BlockHash, Vec<BlockHash>>,
    max_orphans: usize,
    expiry: Duration,
    next_sequence: u64,
}

impl OrphanPool {
    pub fn new(max_orphans: usize, expiry: Duration) -> Self {
        Self {
            orphans: HashMap::new(),
            by_parent: HashMap::new(),
            max_orphans: max_orphans.max(1),
            expiry,
            next_sequence: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.orphans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orphans.is_empty()
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.orphans.contains_key(hash)
    }

    /// Add `block`, first dropping expired orphans and, if still full, the
    /// oldest one.
    pub fn add(&mut self, block: Block, now: DateTime<Utc>) {
        self.purge_expired(now);
        while self.orphans.len() >= self.max_orphans {
            let oldest = self
                .orphans
                .iter()
                .min_by_key(|(_, orphan)| (orphan.expires_at, orphan.sequence))
                .map(|(hash, _)| *hash);
            match oldest {
                Some(hash) => {
                    debug!(orphan = ?hash, "Evicting oldest orphan block");
                    self.remove(&hash);
                }
                None => break,
            }
        }

        let hash = block.hash();
        self.by_parent
            .entry(block.header.prev_block)
            .or_default()
            .push(hash);
        self.orphans.insert(
            hash,
            OrphanBlock {
                block,
                expires_at: now
                    .checked_add_signed(self.expiry)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
                sequence: self.next_sequence,
            },
        );
        self.next_sequence += 1;
    }

    /// Remove an orphan, returning its block.
    pub fn remove(&mut self, hash: &BlockHash) -> Option<Block> {
        let orphan = self.orphans.remove(hash)?;
        let parent = orphan.block.header.prev_block;
        if let Some(siblings) = self.by_parent.get_mut(&parent) {
            siblings.retain(|sibling| sibling != hash);
            if siblings.is_empty() {
                self.by_parent.remove(&parent);
            }
        }
        Some(orphan.block)
    }

    /// Remove and return every unexpired orphan whose parent is `parent`,
    /// oldest first. Expired children are dropped.
    pub fn take_children(&mut self, parent: &BlockHash, now: DateTime<Utc>) -> Vec<Block> {
        let Some(children) = self.by_parent.remove(parent) else {
            return Vec::new();
        };
        children
            .iter()
            .filter_map(|hash| self.orphans.remove(hash).map(|orphan| (hash, orphan)))
            .filter_map(|(hash, orphan)| {
                if orphan.expires_at <= now {
                    debug!(orphan = ?hash, "Expiring orphan block");
                    None
                } else {
                    Some(orphan.block)
                }
            })
            .collect()
    }

    /// The earliest ancestor of `hash` still in the pool, or `hash` itself.
    pub fn root_of(&self, hash: &BlockHash) -> BlockHash {
        let mut root = *hash;
        while let Some(orphan) = self.orphans.get(&root) {
            root = orphan.block.header.prev_block;
            if !self.orphans.contains_key(&root) {
                return orphan.block.hash();
            }
        }
        root
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) {
        let expired: Vec<_> = self
            .orphans
            .iter()
            .filter(|(_, orphan)| orphan.expires_at <= now)
            .map(|(hash, _)| *hash)
            .collect();
        for hash in expired {
            debug!(orphan = ?hash, "Expiring orphan block");
            self.remove(&hash);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ChainParams;
    use chrono::TimeZone;
    use tsr_blockchain_types::Hash256;

    fn orphan(parent: u8, nonce: u64) -> Block {
        let mut block = ChainParams::regtest().genesis_block();
        block.header.prev_block = Hash256([parent; 32]);
        block.header.nonce = nonce;
        block
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_children_are_taken_once() {
        let mut pool = OrphanPool::new(10, Duration::hours(1));
        let a = orphan(1, 1);
        let b = orphan(1, 2);
        let c = orphan(2, 3);
        pool.add(a.clone(), now());
        pool.add(b.clone(), now());
        pool.add(c.clone(), now());

        let children = pool.take_children(&Hash256([1u8; 32]), now());
        assert_eq!(children, vec![a.clone(), b]);
        assert!(pool.take_children(&Hash256([1u8; 32]), now()).is_empty());
        assert!(!pool.contains(&a.hash()));
        assert!(pool.contains(&c.hash()));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_oldest_is_evicted_when_full() {
        let mut pool = OrphanPool::new(2, Duration::hours(1));
        let first = orphan(1, 1);
        let second = orphan(1, 2);
        let third = orphan(1, 3);
        pool.add(first.clone(), now());
        pool.add(second.clone(), now());
        pool.add(third.clone(), now());

        assert_eq!(pool.len(), 2);
        assert!(!pool.contains(&first.hash()));
        assert!(pool.contains(&second.hash()));
        assert!(pool.contains(&third.hash()));
    }

    #[test]
    fn test_expired_orphans_are_purged_on_insert() {
        let mut pool = OrphanPool::new(10, Duration::minutes(10));
        let stale = orphan(1, 1);
        pool.add(stale.clone(), now());

        let fresh = orphan(2, 2);
        pool.add(fresh.clone(), now() + Duration::minutes(11));
        assert!(!pool.contains(&stale.hash()));
        assert!(pool.contains(&fresh.hash()));
        assert!(pool.take_children(&Hash256([1u8; 32]), now()).is_empty());
    }

    #[test]
    fn test_expired_children_are_not_returned() {
        let mut pool = OrphanPool::new(10, Duration::hours(1));
        let child = orphan(1, 1);
        pool.add(child.clone(), now());

        let later = now() + Duration::hours(5);
        assert!(pool.take_children(&Hash256([1u8; 32]), later).is_empty());
        assert!(!pool.contains(&child.hash()));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_huge_expiry_saturates() {
        let mut pool = OrphanPool::new(10, Duration::seconds(i64::MAX / 1000));
        let child = orphan(1, 1);
        pool.add(child.clone(), now());
        pool.add(orphan(2, 2), now() + Duration::days(365));

        assert!(pool.contains(&child.hash()));
        assert_eq!(pool.take_children(&Hash256([1u8; 32]), now()), vec![child]);
    }

    #[test]
    fn test_root_of_chain_of_orphans() {
        let mut pool = OrphanPool::new(10, Duration::hours(1));
        let first = orphan(9, 1);
        let mut second = orphan(0, 2);
        second.header.prev_block = first.hash();
        pool.add(first.clone(), now());
        pool.add(second.clone(), now());

        assert_eq!(pool.root_of(&second.hash()), first.hash());
        let unknown = Hash256([7u8; 32]);
        assert_eq!(pool.root_of(&unknown), unknown);
    }
}
