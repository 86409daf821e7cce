// Copyright (c) 2024 Tessera Foundation

//! Best-chain selection and reorganization.
//!
//! Extending the tip is a reorganization with nothing to detach, so both go
//! through [`Chain::reorganize`]: the switch is validated against an
//! in-memory UTXO view and written with a single batch commit. If any block
//! on the new branch fails, nothing but block statuses is written.

use super::{BestState, Chain, ChainInner, NodeId};
use crate::{
    chain::BehaviorFlags,
    error::{assertion, rule_error, ChainError, ErrorCode, RuleError},
    utxo::UtxoViewpoint,
    validation::{check_connect_block, context::latest_checkpoint_node},
};
use std::{borrow::Cow, sync::Arc};
use tracing::{debug, info, warn};
use tsr_blockchain_types::{Block, BlockHash};
use tsr_ledger_db::{BlockStatus, WriteBatch};

impl Chain {
    /// Decide where the freshly indexed node `node_id` goes, committing
    /// `pending` (its block and node records) together with any chain
    /// switch. Returns whether the node is now the best tip.
    pub(super) fn connect_best_chain(
        &self,
        inner: &mut ChainInner,
        node_id: NodeId,
        block: &Block,
        flags: BehaviorFlags,
        pending: WriteBatch,
    ) -> Result<bool, ChainError> {
        let tip_id = inner
            .index
            .tip()
            .ok_or_else(|| assertion("block index has no tip"))?;
        let node = inner.index.node(node_id);
        let extends_tip = node.parent == Some(tip_id);

        if !extends_tip && !node.is_better_than(inner.index.node(tip_id)) {
            let (hash, height) = (node.hash, node.height);
            self.store.commit(pending)?;
            debug!(block = ?hash, height, "Stored block on a side chain");
            return Ok(false);
        }

        let fork = inner
            .index
            .find_fork(tip_id, node_id)
            .ok_or_else(|| assertion("branches share no ancestor"))?;
        if let Some(checkpoint) = latest_checkpoint_node(&inner.index, &self.params) {
            let fork_height = inner.index.node(fork).height;
            let checkpoint_height = inner.index.node(checkpoint).height;
            if fork_height < checkpoint_height {
                self.store.commit(pending)?;
                return Err(rule_error(
                    ErrorCode::ForkTooOld,
                    format!(
                        "reorganization to {:?} forks at height {fork_height}, before the \
                         checkpoint at height {checkpoint_height}",
                        inner.index.node(node_id).hash
                    ),
                )
                .into());
            }
        }

        let mut detach = inner.index.path_from(fork, tip_id);
        detach.reverse();
        let attach = inner.index.path_from(fork, node_id);
        if !detach.is_empty() {
            info!(
                fork_height = inner.index.node(fork).height,
                detach = detach.len(),
                attach = attach.len(),
                "Reorganizing the main chain"
            );
        }
        self.reorganize(inner, &detach, &attach, block, flags, pending)?;
        Ok(true)
    }

    fn stored_block(&self, hash: &BlockHash) -> Result<Block, ChainError> {
        self.store
            .block(hash)?
            .ok_or_else(|| assertion(format!("indexed block {hash:?} is not stored")))
    }

    /// Disconnect `detach` (tip first), connect `attach` (ascending) and
    /// commit the result. The last node of `attach` is `new_block`.
    fn reorganize(
        &self,
        inner: &mut ChainInner,
        detach: &[NodeId],
        attach: &[NodeId],
        new_block: &Block,
        flags: BehaviorFlags,
        pending: WriteBatch,
    ) -> Result<(), ChainError> {
        let new_hash = new_block.hash();
        let new_tip = *attach
            .last()
            .ok_or_else(|| assertion("reorganization with nothing to attach"))?;

        let mut view = UtxoViewpoint::new(self.store.as_ref());
        let mut changes = WriteBatch::new();

        for &id in detach {
            let hash = inner.index.node(id).hash;
            let block = self.stored_block(&hash)?;
            let journal = self
                .store
                .spend_journal(&hash)?
                .ok_or_else(|| assertion(format!("main-chain block {hash:?} has no spend journal")))?;
            view.disconnect_block(&block, journal)?;
            changes.delete_spend_journal(hash);
        }

        for &id in attach {
            let node = inner.index.node(id);
            let (hash, height, status) = (node.hash, node.height, node.status);
            let block = if hash == new_hash {
                Cow::Borrowed(new_block)
            } else {
                Cow::Owned(self.stored_block(&hash)?)
            };

            let result = match status {
                BlockStatus::Invalid => Err(rule_error(
                    ErrorCode::InvalidAncestorBlock,
                    format!("block {hash:?} is known to be invalid"),
                )
                .into()),
                // Blocks that connected before are not validated again.
                BlockStatus::Valid => check_connect_block(
                    &block,
                    height,
                    &self.params,
                    &mut view,
                    self.verifier.as_ref(),
                    flags | BehaviorFlags::FAST_ADD,
                ),
                BlockStatus::Unvalidated => check_connect_block(
                    &block,
                    height,
                    &self.params,
                    &mut view,
                    self.verifier.as_ref(),
                    flags,
                ),
            };

            match result {
                Ok(journal) => {
                    changes.put_spend_journal(hash, journal);
                    if status != BlockStatus::Valid {
                        changes.set_status(hash, BlockStatus::Valid);
                    }
                }
                Err(ChainError::Rule(err)) => return self.reject_branch(inner, id, pending, err),
                Err(err) => return Err(err),
            }
        }

        view.write_to(&mut changes);
        changes.set_best_tip(new_hash);
        let mut batch = pending;
        batch.extend(changes);
        self.store.commit(batch)?;

        let old_best = self.best_snapshot();
        for &id in attach {
            inner.index.set_status(id, BlockStatus::Valid);
        }
        inner.index.set_tip(new_tip);

        let tip = inner.index.node(new_tip);
        let best = BestState::new(
            tip,
            new_block,
            inner.index.median_time_past(new_tip, self.params.median_time_blocks),
        );

        if detach.is_empty() {
            info!(
                height = best.height,
                block = ?best.hash,
                txs = best.num_txs,
                "Connected block to the main chain"
            );
        } else {
            info!(
                old_tip = ?old_best.hash,
                old_height = old_best.height,
                new_tip = ?best.hash,
                new_height = best.height,
                fork_height = best.height.saturating_sub(attach.len() as u64),
                detached = detach.len(),
                attached = attach.len(),
                "Reorganized the main chain"
            );
        }
        if !Arc::ptr_eq(&old_best.admin_keys, &best.admin_keys)
            && *old_best.admin_keys != *best.admin_keys
        {
            info!(height = best.height, "Admin key sets changed at the main chain tip");
        }

        *self.best.write() = Arc::new(best);
        Ok(())
    }

    /// Mark `failed` and everything built on it invalid, persisting only
    /// those statuses alongside `pending`, and report `err`.
    fn reject_branch(
        &self,
        inner: &mut ChainInner,
        failed: NodeId,
        pending: WriteBatch,
        err: RuleError,
    ) -> Result<(), ChainError> {
        let invalid = inner.index.descendants(failed);
        let mut batch = pending;
        for &id in &invalid {
            batch.set_status(inner.index.node(id).hash, BlockStatus::Invalid);
        }
        self.store.commit(batch)?;

        for &id in &invalid {
            inner.index.set_status(id, BlockStatus::Invalid);
        }
        warn!(
            block = ?inner.index.node(failed).hash,
            code = %err.code,
            %err,
            invalidated = invalid.len(),
            "Chain switch aborted, branch marked invalid"
        );
        Err(err.into())
    }
}
