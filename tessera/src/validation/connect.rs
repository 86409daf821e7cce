// Copyright (c) 2024 Tessera Foundation

//! Checks that need the unspent output set.

use crate::{
    chain::BehaviorFlags,
    error::{rule_error, ChainError, ErrorCode, RuleError},
    params::ChainParams,
    utxo::{UtxoState, UtxoViewpoint},
};
use std::collections::BTreeSet;
use tsr_blockchain_types::{
    Amount, Block, Hash256, LockScript, OutPoint, Transaction, Unlock, MAX_AMOUNT,
};
use tsr_crypto_keys::SignatureVerifier;
use tsr_ledger_db::{SpentOutput, UtxoEntry};

fn fetch_spendable(
    view: &mut UtxoViewpoint<'_>,
    outpoint: &OutPoint,
    tx: &Transaction,
) -> Result<UtxoEntry, ChainError> {
    match view.fetch(outpoint)? {
        UtxoState::Unspent(entry) => Ok(entry.clone()),
        UtxoState::Spent => Err(rule_error(
            ErrorCode::DoubleSpend,
            format!("transaction {:?} spends {outpoint}, already spent in this chain", tx.hash()),
        )
        .into()),
        UtxoState::Missing => Err(rule_error(
            ErrorCode::MissingTx,
            format!(
                "output {outpoint} referenced from transaction {:?} does not exist or has already \
                 been spent",
                tx.hash()
            ),
        )
        .into()),
    }
}

/// Check that `unlock` satisfies `lock` for a transaction with signing hash
/// `message`.
pub fn check_unlock(
    lock: &LockScript,
    unlock: &Unlock,
    message: &Hash256,
    verifier: &dyn SignatureVerifier,
) -> Result<(), RuleError> {
    let Unlock::Signatures(signatures) = unlock else {
        return Err(rule_error(
            ErrorCode::ScriptMalformed,
            "coinbase data cannot unlock an output",
        ));
    };

    match lock {
        LockScript::PayToKey(key) => {
            let [signature] = signatures.as_slice() else {
                return Err(rule_error(
                    ErrorCode::ScriptMalformed,
                    format!("pay-to-key unlock has {} signatures", signatures.len()),
                ));
            };
            if signature.key != *key
                || !verifier.verify(key, message.as_bytes(), &signature.signature)
            {
                return Err(rule_error(
                    ErrorCode::ScriptValidation,
                    format!("signature does not unlock output of {key}"),
                ));
            }
        }
        LockScript::MultiSig { required, keys } => {
            if signatures.len() > keys.len() {
                return Err(rule_error(
                    ErrorCode::ScriptMalformed,
                    format!(
                        "multisig unlock has {} signatures for {} keys",
                        signatures.len(),
                        keys.len()
                    ),
                ));
            }
            let signers: BTreeSet<_> = signatures
                .iter()
                .filter(|sig| keys.contains(&sig.key))
                .filter(|sig| verifier.verify(&sig.key, message.as_bytes(), &sig.signature))
                .map(|sig| sig.key)
                .collect();
            if signers.len() < usize::from(*required) {
                return Err(rule_error(
                    ErrorCode::ScriptValidation,
                    format!(
                        "multisig unlock has {} valid signatures, {required} required",
                        signers.len()
                    ),
                ));
            }
        }
        LockScript::AdminThread(_) | LockScript::AdminOp(_) | LockScript::NullData(_) => {
            return Err(rule_error(
                ErrorCode::ScriptValidation,
                "output cannot be unlocked by signatures alone",
            ));
        }
    }
    Ok(())
}

/// Check the inputs of a non-coinbase transaction against the view and
/// return its fee.
pub fn check_transaction_inputs(
    tx: &Transaction,
    height: u64,
    params: &ChainParams,
    view: &mut UtxoViewpoint<'_>,
    verifier: &dyn SignatureVerifier,
) -> Result<Amount, ChainError> {
    let admin_thread = tx.admin_thread();
    let message = tx.signing_hash();
    let mut total_in: Amount = 0;

    for (index, input) in tx.inputs.iter().enumerate() {
        let entry = fetch_spendable(view, &input.previous_output, tx)?;

        // Genesis creates the thread outputs; they are not subject to
        // maturity.
        if entry.is_coinbase && !entry.output.lock.is_admin() {
            let depth = height.saturating_sub(entry.height);
            if depth < params.coinbase_maturity {
                return Err(rule_error(
                    ErrorCode::ImmatureSpend,
                    format!(
                        "transaction {:?} spends coinbase output {} from height {} at height \
                         {height}, maturity is {}",
                        tx.hash(),
                        input.previous_output,
                        entry.height,
                        params.coinbase_maturity
                    ),
                )
                .into());
            }
        }

        match (entry.output.lock.admin_thread(), admin_thread) {
            (Some(spent), Some(thread)) if index == 0 && spent == thread => {}
            (Some(spent), _) => {
                return Err(rule_error(
                    ErrorCode::InvalidAdminTx,
                    format!(
                        "input {index} of transaction {:?} spends the {spent:?} thread output \
                         without continuing it",
                        tx.hash()
                    ),
                )
                .into());
            }
            (None, Some(thread)) if index == 0 => {
                return Err(rule_error(
                    ErrorCode::InvalidAdminTx,
                    format!(
                        "transaction {:?} does not spend the {thread:?} thread output",
                        tx.hash()
                    ),
                )
                .into());
            }
            (None, _) => check_unlock(&entry.output.lock, &input.unlock, &message, verifier)?,
        }

        total_in = total_in
            .checked_add(entry.output.value)
            .filter(|total| *total <= MAX_AMOUNT)
            .ok_or_else(|| {
                rule_error(
                    ErrorCode::BadTxOutValue,
                    format!("total input value of transaction {:?} exceeds {MAX_AMOUNT}", tx.hash()),
                )
            })?;
    }

    // Admin transactions pay no fee; issue transactions mint their outputs.
    if admin_thread.is_some() {
        return Ok(0);
    }

    let total_out: Amount = tx.outputs.iter().map(|out| out.value).sum();
    if total_in < total_out {
        return Err(rule_error(
            ErrorCode::SpendTooHigh,
            format!(
                "transaction {:?} spends {total_out}, inputs provide {total_in}",
                tx.hash()
            ),
        )
        .into());
    }

    let fee = total_in - total_out;
    if fee > params.max_tx_fee {
        return Err(rule_error(
            ErrorCode::FeeTooHigh,
            format!(
                "transaction {:?} pays fee {fee}, limit {}",
                tx.hash(),
                params.max_tx_fee
            ),
        )
        .into());
    }
    Ok(fee)
}

/// Validate `block` at `height` against the view and apply it. Returns the
/// outputs it spent.
///
/// Under [`BehaviorFlags::FAST_ADD`] only the existence of spent outputs is
/// checked.
pub fn check_connect_block(
    block: &Block,
    height: u64,
    params: &ChainParams,
    view: &mut UtxoViewpoint<'_>,
    verifier: &dyn SignatureVerifier,
    flags: BehaviorFlags,
) -> Result<Vec<SpentOutput>, ChainError> {
    let mut journal = Vec::new();

    if flags.contains(BehaviorFlags::FAST_ADD) {
        for tx in &block.transactions {
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    fetch_spendable(view, &input.previous_output, tx)?;
                }
            }
            view.connect_transaction(tx, height, &mut journal)?;
        }
        return Ok(journal);
    }

    for tx in &block.transactions {
        let tx_hash = tx.hash();
        for index in 0..tx.outputs.len() {
            let outpoint = OutPoint::new(tx_hash, index as u32);
            if view.lookup(&outpoint)?.is_some() {
                return Err(rule_error(
                    ErrorCode::OverwriteTx,
                    format!("transaction {tx_hash:?} would overwrite unspent output {outpoint}"),
                )
                .into());
            }
        }
    }

    let mut total_fees: Amount = 0;
    for tx in &block.transactions {
        if !tx.is_coinbase() {
            let fee = check_transaction_inputs(tx, height, params, view, verifier)?;
            total_fees = total_fees.checked_add(fee).ok_or_else(|| {
                rule_error(ErrorCode::BadFees, "total fees of block overflow")
            })?;
        }
        view.connect_transaction(tx, height, &mut journal)?;
    }

    if total_fees > params.max_block_fee {
        return Err(rule_error(
            ErrorCode::FeeTooHigh,
            format!(
                "block pays total fees {total_fees}, limit {}",
                params.max_block_fee
            ),
        )
        .into());
    }

    let coinbase_value: Amount = block
        .transactions
        .first()
        .map(|coinbase| coinbase.outputs.iter().map(|out| out.value).sum())
        .unwrap_or_default();
    let max_value = params.block_subsidy(height).saturating_add(total_fees);
    if coinbase_value > max_value {
        return Err(rule_error(
            ErrorCode::BadCoinbaseValue,
            format!(
                "coinbase pays {coinbase_value}, subsidy plus fees is {max_value}"
            ),
        )
        .into());
    }

    Ok(journal)
}
