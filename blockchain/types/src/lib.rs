// Copyright (c) 2024 Tessera Foundation

//! Blockchain data structures.
//!
//! These are plain, already-decoded values. Nothing here consults chain
//! state; validation lives in the node crate.

#![deny(missing_docs)]

mod admin;
mod block;
mod hash;
mod merkle;
mod script;
mod transaction;

pub use crate::{
    admin::{AdminKeySets, AdminOp, AdminThread, KeySetType},
    block::{Block, BlockHeader},
    hash::{BlockHash, Hash256, TxHash},
    merkle::compute_merkle_root,
    script::{KeySignature, LockScript, Unlock, MAX_MULTISIG_KEYS},
    transaction::{
        OutPoint, Transaction, TxIn, TxOut, LOCK_TIME_THRESHOLD, MAX_TX_IN_SEQUENCE,
    },
};

/// Signed amount in atomic units. Negative values only exist in malformed
/// input and are rejected during validation.
pub type Amount = i64;

/// Atomic units per coin.
pub const COIN: Amount = 100_000_000;

/// Maximum number of atomic units that can ever exist.
pub const MAX_AMOUNT: Amount = 21_000_000 * COIN;
