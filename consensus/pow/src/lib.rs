// Copyright (c) 2024 Tessera Foundation

//! Proof-of-Work arithmetic for Tessera.
//!
//! This crate implements the target and difficulty rules of the chain. It
//! provides:
//!
//! - Conversion between compact "bits" and 256-bit targets
//! - Per-block work for cumulative chain-work comparison
//! - The proof-of-work check on a block hash
//! - Periodic retargeting and the easiest difficulty reachable in a given
//!   amount of time

#![deny(missing_docs)]

pub mod compact;
pub mod difficulty;

pub use compact::{calc_work, compact_to_target, hash_to_value, target_to_compact};
pub use difficulty::{
    calc_easiest_difficulty, check_proof_of_work, is_retarget_height, retarget, PowError,
    RetargetParams, RETARGET_ADJUSTMENT_FACTOR,
};
pub use primitive_types::U256;
