// Copyright (c) 2024 Tessera Foundation

//! Error taxonomy for block and transaction processing.
//!
//! A [`RuleError`] means the input broke a consensus rule; callers branch on
//! its [`ErrorCode`]. Anything else surfacing as a [`ChainError`] is an
//! internal failure and aborts the operation that hit it.

use std::fmt;
use thiserror::Error;
use tsr_ledger_db::StoreError;

/// The consensus rule a block or transaction violated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A block with the same hash is already known.
    DuplicateBlock,
    /// The block is larger than the maximum block size.
    BlockTooBig,
    /// The block version is below the enforced minimum.
    BlockVersionTooOld,
    /// The block timestamp has sub-second precision.
    InvalidTime,
    /// The block timestamp is not after the median time of recent blocks.
    TimeTooOld,
    /// The block timestamp is too far in the future.
    TimeTooNew,
    /// The block is easier than the difficulty reachable since the latest
    /// checkpoint.
    DifficultyTooLow,
    /// The block bits differ from the required value, or encode an invalid
    /// target.
    UnexpectedDifficulty,
    /// The height encoded in the coinbase does not match the block height.
    BadHeight,
    /// The block signature does not verify.
    BadBlockSignature,
    /// The block hash is above its target.
    HighHash,
    /// The merkle root does not match the transactions.
    BadMerkleRoot,
    /// The block conflicts with a checkpoint.
    BadCheckpoint,
    /// The block forks the chain before the latest checkpoint.
    ForkTooOld,
    /// The block timestamp is before the latest checkpoint.
    CheckpointTimeTooOld,
    /// The block has no transactions.
    NoTransactions,
    /// The block has more transactions than allowed.
    TooManyTransactions,
    /// A non-coinbase transaction has no inputs.
    NoTxInputs,
    /// A transaction has no outputs.
    NoTxOutputs,
    /// A transaction is larger than allowed.
    TxTooBig,
    /// An output value is negative, too large, or the sum overflows.
    BadTxOutValue,
    /// A transaction spends the same outpoint twice.
    DuplicateTxInputs,
    /// A non-coinbase transaction references the null outpoint.
    BadTxInput,
    /// A spent output does not exist.
    MissingTx,
    /// A transaction is not final at the block's height and time.
    UnfinalizedTx,
    /// A block contains the same transaction twice.
    DuplicateTx,
    /// A transaction would overwrite outputs that are still unspent.
    OverwriteTx,
    /// A coinbase output is spent before it matured.
    ImmatureSpend,
    /// An output is spent twice.
    DoubleSpend,
    /// A transaction spends more than its inputs provide.
    SpendTooHigh,
    /// Fee arithmetic overflows or goes negative.
    BadFees,
    /// Too many signature operations.
    TooManySigOps,
    /// The first transaction is not a coinbase.
    FirstTxNotCoinbase,
    /// A transaction other than the first is a coinbase.
    MultipleCoinbases,
    /// Coinbase data length is out of range.
    BadCoinbaseScriptLen,
    /// Coinbase outputs exceed subsidy plus fees.
    BadCoinbaseValue,
    /// A lock or unlock is malformed.
    ScriptMalformed,
    /// An unlock does not satisfy its lock.
    ScriptValidation,
    /// One signer produced too large a share of recent blocks.
    ExcessiveChainShare,
    /// One signer produced too many consecutive blocks.
    ExcessiveTrailing,
    /// The size declared in the header does not match the block.
    InconsistentBlkSize,
    /// The coinbase has a forbidden shape.
    InvalidCoinbase,
    /// A transaction has a forbidden shape.
    InvalidTx,
    /// The block signer is not an authorized validating key.
    InvalidValidateKey,
    /// An admin transaction is malformed.
    InvalidAdminTx,
    /// An admin operation is unauthorized or cannot be applied.
    InvalidAdminOp,
    /// A fee exceeds the maximum permitted fee.
    FeeTooHigh,
    /// The block descends from a block known to be invalid.
    InvalidAncestorBlock,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A consensus rule violation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{description}")]
pub struct RuleError {
    /// Which rule was broken.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub description: String,
}

impl RuleError {
    /// Pair a code with a description.
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }
}

/// Shorthand for constructing a [`RuleError`].
pub fn rule_error(code: ErrorCode, description: impl Into<String>) -> RuleError {
    RuleError::new(code, description)
}

/// Any failure while processing a block.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The block broke a consensus rule.
    #[error(transparent)]
    Rule(#[from] RuleError),

    /// An internal invariant does not hold. Never caused by input alone.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// The chain-state store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ChainError {
    /// The rule that was broken, if this is a rule violation.
    pub fn rule(&self) -> Option<&RuleError> {
        match self {
            ChainError::Rule(err) => Some(err),
            _ => None,
        }
    }
}

/// Shorthand for an [`ChainError::Assertion`].
pub fn assertion(message: impl Into<String>) -> ChainError {
    ChainError::Assertion(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_error_displays_description() {
        let err = rule_error(ErrorCode::BadMerkleRoot, "block merkle root is invalid");
        assert_eq!(err.to_string(), "block merkle root is invalid");
        assert_eq!(err.code.to_string(), "BadMerkleRoot");
    }

    #[test]
    fn test_assertion_display() {
        let err = assertion("index out of sync");
        assert_eq!(err.to_string(), "assertion failed: index out of sync");
        assert!(err.rule().is_none());

        let err: ChainError = rule_error(ErrorCode::HighHash, "hash too high").into();
        assert_eq!(err.rule().map(|r| r.code), Some(ErrorCode::HighHash));
    }
}
