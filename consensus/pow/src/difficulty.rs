// Copyright (c) 2024 Tessera Foundation

//! Difficulty retargeting and the proof-of-work check.
//!
//! Difficulty is recalculated every `retarget_interval` blocks from the time
//! the previous interval took. A single adjustment can change the target by
//! at most [`RETARGET_ADJUSTMENT_FACTOR`] in either direction.

use crate::compact::{compact_to_target, hash_to_value, target_to_compact};
use displaydoc::Display;
use primitive_types::{U256, U512};

/// Maximum factor by which one retarget may move the target.
pub const RETARGET_ADJUSTMENT_FACTOR: i64 = 4;

/// Network constants governing difficulty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetargetParams {
    /// The easiest permitted target.
    pub pow_limit: U256,

    /// Desired duration of one retarget interval, in seconds.
    pub target_timespan_secs: i64,

    /// Desired time between blocks, in seconds.
    pub target_spacing_secs: i64,

    /// When set, difficulty never changes from the parent's.
    pub no_retargeting: bool,
}

impl RetargetParams {
    /// Number of blocks between retargets.
    pub fn retarget_interval(&self) -> u64 {
        (self.target_timespan_secs / self.target_spacing_secs.max(1)).max(1) as u64
    }

    /// Compact encoding of the easiest permitted target.
    pub fn pow_limit_bits(&self) -> u32 {
        target_to_compact(&self.pow_limit)
    }

    fn min_retarget_timespan(&self) -> i64 {
        self.target_timespan_secs / RETARGET_ADJUSTMENT_FACTOR
    }

    fn max_retarget_timespan(&self) -> i64 {
        self.target_timespan_secs * RETARGET_ADJUSTMENT_FACTOR
    }
}

/// Reasons a block hash fails the proof-of-work check.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum PowError {
    /// Target of bits {0:#010x} is not positive or exceeds the pow limit
    TargetOutOfRange(u32),
    /// Block hash is higher than the target of bits {0:#010x}
    HighHash(u32),
}

impl std::error::Error for PowError {}

/// Whether a block at `height` starts a new retarget interval.
pub fn is_retarget_height(params: &RetargetParams, height: u64) -> bool {
    !params.no_retargeting && height > 0 && height % params.retarget_interval() == 0
}

/// The bits for the first block of a new interval.
///
/// `actual_timespan_secs` is the time between the first and last blocks of
/// the interval that just ended. It is clamped to a factor of
/// [`RETARGET_ADJUSTMENT_FACTOR`] around the target timespan before scaling.
pub fn retarget(params: &RetargetParams, last_bits: u32, actual_timespan_secs: i64) -> u32 {
    let timespan = actual_timespan_secs.clamp(
        params.min_retarget_timespan(),
        params.max_retarget_timespan(),
    );

    let old_target = compact_to_target(last_bits).unwrap_or(params.pow_limit);
    let scaled = old_target.full_mul(U256::from(timespan.max(0) as u64))
        / U512::from(params.target_timespan_secs.max(1) as u64);

    let new_target = if scaled > U512::from(params.pow_limit) {
        params.pow_limit
    } else {
        U256::try_from(scaled).unwrap_or(params.pow_limit)
    };
    target_to_compact(&new_target)
}

/// The easiest bits a block could legitimately carry `duration_secs` after a
/// block with `bits`, assuming every retarget in between eased maximally.
///
/// Used to bound the difficulty of blocks that claim to descend from a
/// checkpoint.
pub fn calc_easiest_difficulty(params: &RetargetParams, bits: u32, duration_secs: i64) -> u32 {
    if params.no_retargeting {
        return bits;
    }

    let max_retarget_timespan = params.max_retarget_timespan().max(1);
    let mut new_target = compact_to_target(bits).unwrap_or(params.pow_limit);
    let mut remaining = duration_secs;
    while remaining > 0 && new_target < params.pow_limit {
        new_target = new_target
            .checked_mul(U256::from(RETARGET_ADJUSTMENT_FACTOR as u64))
            .unwrap_or(params.pow_limit);
        remaining -= max_retarget_timespan;
    }

    if new_target > params.pow_limit {
        new_target = params.pow_limit;
    }
    target_to_compact(&new_target)
}

/// Check that `hash` meets the target encoded in `bits`, and that the target
/// itself is within range.
pub fn check_proof_of_work(hash: &[u8; 32], bits: u32, pow_limit: &U256) -> Result<(), PowError> {
    let target = match compact_to_target(bits) {
        Some(target) if !target.is_zero() && target <= *pow_limit => target,
        _ => return Err(PowError::TargetOutOfRange(bits)),
    };

    if hash_to_value(hash) > target {
        return Err(PowError::HighHash(bits));
    }
    Ok(())
}
