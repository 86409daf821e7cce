// Copyright (c) 2024 Tessera Foundation

//! Tessera node library - block validation and chain state for a
//! permissioned proof-of-work ledger.
//!
//! The entry point is [`chain::Chain::process_block`]. Blocks pass
//! structural checks, wait in the orphan pool until their parent is known,
//! are checked against the state of the chain they extend, update the admin
//! key sets, and are finally handed to the chain selector, which may
//! reorganize the best chain.

#![deny(clippy::print_stdout)]

pub mod admin;
pub mod chain;
pub mod config;
pub mod error;
pub mod params;
pub mod time;
pub mod utxo;
pub mod validation;

// Used by the CLI binary
pub mod commands;

pub use chain::{BehaviorFlags, BestState, BlockOutcome, Chain, ChainOptions};
pub use error::{ChainError, ErrorCode, RuleError};
pub use params::{ChainParams, Checkpoint, Network};
