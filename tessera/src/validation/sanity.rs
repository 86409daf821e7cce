// Copyright (c) 2024 Tessera Foundation

//! Context-free block and transaction checks.

use crate::{
    admin::check_admin_structure,
    chain::BehaviorFlags,
    error::{rule_error, ErrorCode, RuleError},
    params::ChainParams,
    validation::is_finalized_tx,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tsr_blockchain_types::{
    Block, BlockHeader, LockScript, Transaction, Unlock, LOCK_TIME_THRESHOLD, MAX_AMOUNT,
    MAX_MULTISIG_KEYS,
};
use tsr_consensus_pow::{check_proof_of_work, compact_to_target, PowError};
use tsr_crypto_keys::SignatureVerifier;

/// Coinbase data length bounds, in bytes.
const MIN_COINBASE_DATA_LEN: usize = 2;
const MAX_COINBASE_DATA_LEN: usize = 100;

fn check_proof(header: &BlockHeader, params: &ChainParams, flags: BehaviorFlags) -> Result<(), RuleError> {
    if flags.contains(BehaviorFlags::NO_POW_CHECK) {
        return match compact_to_target(header.bits) {
            Some(target) if !target.is_zero() && target <= params.pow.pow_limit => Ok(()),
            _ => Err(rule_error(
                ErrorCode::UnexpectedDifficulty,
                format!("block target of bits {:#010x} is out of range", header.bits),
            )),
        };
    }

    check_proof_of_work(header.hash().as_bytes(), header.bits, &params.pow.pow_limit).map_err(
        |err| {
            let code = match err {
                PowError::TargetOutOfRange(_) => ErrorCode::UnexpectedDifficulty,
                PowError::HighHash(_) => ErrorCode::HighHash,
            };
            rule_error(code, err.to_string())
        },
    )
}

fn check_header_sanity(
    header: &BlockHeader,
    params: &ChainParams,
    now: DateTime<Utc>,
    verifier: &dyn SignatureVerifier,
    flags: BehaviorFlags,
) -> Result<(), RuleError> {
    if header.version < params.min_block_version {
        return Err(rule_error(
            ErrorCode::BlockVersionTooOld,
            format!(
                "block version {} is below the minimum {}",
                header.version, params.min_block_version
            ),
        ));
    }

    check_proof(header, params, flags)?;

    if header.timestamp.timestamp_subsec_nanos() != 0 {
        return Err(rule_error(
            ErrorCode::InvalidTime,
            format!("block timestamp {} has sub-second precision", header.timestamp),
        ));
    }
    let max_time = now + Duration::seconds(params.max_time_offset_secs);
    if header.timestamp > max_time {
        return Err(rule_error(
            ErrorCode::TimeTooNew,
            format!(
                "block timestamp {} is too far in the future, limit {max_time}",
                header.timestamp
            ),
        ));
    }

    let hash = header.hash();
    if !verifier.verify(&header.validating_key, hash.as_bytes(), &header.signature) {
        return Err(rule_error(
            ErrorCode::BadBlockSignature,
            format!(
                "block {hash:?} signature does not verify against {}",
                header.validating_key
            ),
        ));
    }
    Ok(())
}

fn check_lock_sanity(lock: &LockScript) -> Result<(), RuleError> {
    if let LockScript::MultiSig { required, keys } = lock {
        let required = usize::from(*required);
        if required == 0 || required > keys.len() || keys.len() > MAX_MULTISIG_KEYS {
            return Err(rule_error(
                ErrorCode::ScriptMalformed,
                format!("multisig lock requires {required} of {} keys", keys.len()),
            ));
        }
        let distinct: HashSet<_> = keys.iter().collect();
        if distinct.len() != keys.len() {
            return Err(rule_error(
                ErrorCode::ScriptMalformed,
                "multisig lock repeats a key",
            ));
        }
    }
    Ok(())
}

/// Context-free checks of a single transaction.
pub fn check_transaction_sanity(tx: &Transaction, params: &ChainParams) -> Result<(), RuleError> {
    if tx.inputs.is_empty() {
        return Err(rule_error(ErrorCode::NoTxInputs, "transaction has no inputs"));
    }
    if tx.outputs.is_empty() {
        return Err(rule_error(ErrorCode::NoTxOutputs, "transaction has no outputs"));
    }

    let size = tx.serialized_size();
    if size > params.max_tx_size {
        return Err(rule_error(
            ErrorCode::TxTooBig,
            format!("transaction size {size} exceeds {}", params.max_tx_size),
        ));
    }

    let mut total: i64 = 0;
    for output in &tx.outputs {
        if output.value < 0 {
            return Err(rule_error(
                ErrorCode::BadTxOutValue,
                format!("transaction output has negative value {}", output.value),
            ));
        }
        if output.value > MAX_AMOUNT {
            return Err(rule_error(
                ErrorCode::BadTxOutValue,
                format!("transaction output value {} exceeds {MAX_AMOUNT}", output.value),
            ));
        }
        total = total
            .checked_add(output.value)
            .filter(|total| *total <= MAX_AMOUNT)
            .ok_or_else(|| {
                rule_error(
                    ErrorCode::BadTxOutValue,
                    format!("total output value of transaction exceeds {MAX_AMOUNT}"),
                )
            })?;
        check_lock_sanity(&output.lock)?;
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(input.previous_output) {
            return Err(rule_error(
                ErrorCode::DuplicateTxInputs,
                format!("transaction spends {} more than once", input.previous_output),
            ));
        }
    }

    if tx.is_coinbase() {
        let data = match &tx.inputs[0].unlock {
            Unlock::Coinbase(data) => data,
            Unlock::Signatures(_) => {
                return Err(rule_error(
                    ErrorCode::InvalidCoinbase,
                    "coinbase input carries signatures",
                ))
            }
        };
        if !(MIN_COINBASE_DATA_LEN..=MAX_COINBASE_DATA_LEN).contains(&data.len()) {
            return Err(rule_error(
                ErrorCode::BadCoinbaseScriptLen,
                format!(
                    "coinbase data length {} is outside {MIN_COINBASE_DATA_LEN}..={MAX_COINBASE_DATA_LEN}",
                    data.len()
                ),
            ));
        }
        if tx.has_admin_outputs() {
            return Err(rule_error(
                ErrorCode::InvalidCoinbase,
                "coinbase creates admin outputs",
            ));
        }
    } else {
        for input in &tx.inputs {
            if input.previous_output.is_null() {
                return Err(rule_error(
                    ErrorCode::BadTxInput,
                    "transaction input refers to the null outpoint",
                ));
            }
            if matches!(input.unlock, Unlock::Coinbase(_)) {
                return Err(rule_error(
                    ErrorCode::ScriptMalformed,
                    format!("input spending {} carries coinbase data", input.previous_output),
                ));
            }
        }
        check_admin_structure(tx)?;
    }

    let sig_ops = tx.sig_op_count();
    if sig_ops > params.max_tx_sig_ops {
        return Err(rule_error(
            ErrorCode::TooManySigOps,
            format!(
                "transaction has {sig_ops} signature operations, limit {}",
                params.max_tx_sig_ops
            ),
        ));
    }
    Ok(())
}

/// Every check of `block` that needs nothing but the block, the network
/// parameters and the current time.
pub fn check_block_sanity(
    block: &Block,
    params: &ChainParams,
    now: DateTime<Utc>,
    verifier: &dyn SignatureVerifier,
    flags: BehaviorFlags,
) -> Result<(), RuleError> {
    let header = &block.header;
    check_header_sanity(header, params, now, verifier, flags)?;

    let transactions = &block.transactions;
    if transactions.is_empty() {
        return Err(rule_error(
            ErrorCode::NoTransactions,
            "block does not contain any transactions",
        ));
    }
    if transactions.len() > params.max_block_transactions {
        return Err(rule_error(
            ErrorCode::TooManyTransactions,
            format!(
                "block contains {} transactions, limit {}",
                transactions.len(),
                params.max_block_transactions
            ),
        ));
    }

    let size = block.serialized_size();
    if size > params.max_block_size {
        return Err(rule_error(
            ErrorCode::BlockTooBig,
            format!("block size {size} exceeds {}", params.max_block_size),
        ));
    }
    let transactions_size = block.transactions_size();
    if u64::from(header.size) != transactions_size as u64 {
        return Err(rule_error(
            ErrorCode::InconsistentBlkSize,
            format!(
                "header declares {} bytes of transactions, block has {transactions_size}",
                header.size
            ),
        ));
    }

    if !transactions[0].is_coinbase() {
        return Err(rule_error(
            ErrorCode::FirstTxNotCoinbase,
            "first transaction in block is not a coinbase",
        ));
    }
    if let Some(index) = transactions.iter().skip(1).position(Transaction::is_coinbase) {
        return Err(rule_error(
            ErrorCode::MultipleCoinbases,
            format!("block contains a second coinbase at index {}", index + 1),
        ));
    }

    for tx in transactions {
        check_transaction_sanity(tx, params)?;
    }

    let merkle_root = block.compute_merkle_root();
    if merkle_root != header.merkle_root {
        return Err(rule_error(
            ErrorCode::BadMerkleRoot,
            format!(
                "block merkle root is invalid, header {:?}, computed {merkle_root:?}",
                header.merkle_root
            ),
        ));
    }

    let mut seen = HashSet::with_capacity(transactions.len());
    for tx in transactions {
        let hash = tx.hash();
        if !seen.insert(hash) {
            return Err(rule_error(
                ErrorCode::DuplicateTx,
                format!("block contains duplicate transaction {hash:?}"),
            ));
        }
    }

    let mut sig_ops = 0usize;
    for tx in transactions {
        sig_ops = sig_ops.saturating_add(tx.sig_op_count());
        if sig_ops > params.max_block_sig_ops {
            return Err(rule_error(
                ErrorCode::TooManySigOps,
                format!(
                    "block has more than {} signature operations",
                    params.max_block_sig_ops
                ),
            ));
        }
    }

    for tx in transactions {
        if tx.lock_time >= LOCK_TIME_THRESHOLD && !is_finalized_tx(tx, 0, header.timestamp) {
            return Err(rule_error(
                ErrorCode::UnfinalizedTx,
                format!(
                    "transaction {:?} is not final at block time {}",
                    tx.hash(),
                    header.timestamp
                ),
            ));
        }
    }
    Ok(())
}
