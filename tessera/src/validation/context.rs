// Copyright (c) 2024 Tessera Foundation

//! Checks that depend on where a block sits in the chain.

use crate::{
    chain::{BehaviorFlags, BlockIndex, NodeId},
    error::{rule_error, ErrorCode, RuleError},
    params::{ChainParams, SignerPolicy},
    validation::{coinbase_height, is_finalized_tx},
};
use tsr_blockchain_types::{Block, KeySetType};
use tsr_consensus_pow::{calc_easiest_difficulty, compact_to_target};
use tsr_crypto_keys::PublicKey;

/// The most recent checkpoint the main chain has passed.
pub fn latest_checkpoint_node(index: &BlockIndex, params: &ChainParams) -> Option<NodeId> {
    params.checkpoints.iter().rev().find_map(|checkpoint| {
        index
            .main_chain_node(checkpoint.height)
            .filter(|id| index.node(*id).hash == checkpoint.hash)
    })
}

/// Bounds every block claiming to extend the chain must respect relative to
/// the latest checkpoint, checked before the parent is even known.
pub fn check_checkpoint_bounds(
    block: &Block,
    params: &ChainParams,
    index: &BlockIndex,
    flags: BehaviorFlags,
) -> Result<(), RuleError> {
    let Some(checkpoint_id) = latest_checkpoint_node(index, params) else {
        return Ok(());
    };
    let checkpoint = &index.node(checkpoint_id).header;

    let header = &block.header;
    if header.timestamp < checkpoint.timestamp {
        return Err(rule_error(
            ErrorCode::CheckpointTimeTooOld,
            format!(
                "block timestamp {} is before the latest checkpoint at {}",
                header.timestamp, checkpoint.timestamp
            ),
        ));
    }

    if !flags.contains(BehaviorFlags::NO_POW_CHECK) {
        let duration = (header.timestamp - checkpoint.timestamp).num_seconds();
        let required_bits = calc_easiest_difficulty(&params.pow, checkpoint.bits, duration);
        let easiest = compact_to_target(required_bits).unwrap_or(params.pow.pow_limit);
        let target = compact_to_target(header.bits).unwrap_or(params.pow.pow_limit);
        if target > easiest {
            return Err(rule_error(
                ErrorCode::DifficultyTooLow,
                format!(
                    "block bits {:#010x} are easier than {required_bits:#010x}, the easiest \
                     reachable since the latest checkpoint",
                    header.bits
                ),
            ));
        }
    }
    Ok(())
}

fn check_signer_policy(
    policy: &SignerPolicy,
    index: &BlockIndex,
    parent: NodeId,
    key: &PublicKey,
    height: u64,
) -> Result<(), RuleError> {
    if height < policy.window {
        return Ok(());
    }

    let mut signed = 1u64;
    let mut trailing = 1u64;
    let mut streak = true;
    let mut current = Some(parent);
    for _ in 1..policy.window {
        let Some(id) = current else {
            break;
        };
        let node = index.node(id);
        if node.header.validating_key == *key {
            signed += 1;
            if streak {
                trailing += 1;
            }
        } else {
            streak = false;
        }
        current = node.parent;
    }

    if trailing > policy.max_trailing {
        return Err(rule_error(
            ErrorCode::ExcessiveTrailing,
            format!(
                "{key} signed the last {trailing} blocks, limit {}",
                policy.max_trailing
            ),
        ));
    }
    if signed * 100 > policy.window * policy.max_share_percent {
        return Err(rule_error(
            ErrorCode::ExcessiveChainShare,
            format!(
                "{key} signed {signed} of the last {} blocks, limit {}%",
                policy.window, policy.max_share_percent
            ),
        ));
    }
    Ok(())
}

/// Check `block` against its parent and the index. Returns the block's
/// height.
///
/// Under [`BehaviorFlags::FAST_ADD`] only the coinbase height and the
/// checkpoint rules are enforced.
pub fn check_block_context(
    block: &Block,
    params: &ChainParams,
    index: &BlockIndex,
    parent: NodeId,
    flags: BehaviorFlags,
) -> Result<u64, RuleError> {
    let parent_node = index.node(parent);
    let header = &block.header;
    let height = parent_node.height + 1;
    let fast_add = flags.contains(BehaviorFlags::FAST_ADD);

    match coinbase_height(block) {
        Some(encoded) if encoded == height => {}
        Some(encoded) => {
            return Err(rule_error(
                ErrorCode::BadHeight,
                format!("coinbase encodes height {encoded}, block height is {height}"),
            ))
        }
        None => {
            return Err(rule_error(
                ErrorCode::BadHeight,
                format!("coinbase of block at height {height} does not encode its height"),
            ))
        }
    }

    if !fast_add {
        let expected_bits = index.next_required_bits(parent, params);
        if header.bits != expected_bits {
            return Err(rule_error(
                ErrorCode::UnexpectedDifficulty,
                format!(
                    "block bits {:#010x} differ from the required {expected_bits:#010x}",
                    header.bits
                ),
            ));
        }

        let median_time = index.median_time_past(parent, params.median_time_blocks);
        if header.timestamp <= median_time {
            return Err(rule_error(
                ErrorCode::TimeTooOld,
                format!(
                    "block timestamp {} is not after the median time {median_time}",
                    header.timestamp
                ),
            ));
        }
    }

    let hash = block.hash();
    if let Some(checkpoint) = params.checkpoint_at(height) {
        if checkpoint.hash != hash {
            return Err(rule_error(
                ErrorCode::BadCheckpoint,
                format!(
                    "block at height {height} is {hash:?}, checkpoint requires {:?}",
                    checkpoint.hash
                ),
            ));
        }
    }
    if let Some(checkpoint_id) = latest_checkpoint_node(index, params) {
        let checkpoint_height = index.node(checkpoint_id).height;
        if height < checkpoint_height {
            return Err(rule_error(
                ErrorCode::ForkTooOld,
                format!(
                    "block at height {height} forks the chain before the checkpoint at \
                     height {checkpoint_height}"
                ),
            ));
        }
    }

    if fast_add {
        return Ok(height);
    }

    for tx in &block.transactions {
        if !is_finalized_tx(tx, height, header.timestamp) {
            return Err(rule_error(
                ErrorCode::UnfinalizedTx,
                format!("transaction {:?} is not final at height {height}", tx.hash()),
            ));
        }
    }

    let key = &header.validating_key;
    if !parent_node.admin_keys.contains(KeySetType::Validating, key) {
        return Err(rule_error(
            ErrorCode::InvalidValidateKey,
            format!("{key} is not an authorized validating key"),
        ));
    }
    if let Some(policy) = &params.signer_policy {
        check_signer_policy(policy, index, parent, key, height)?;
    }

    Ok(height)
}
