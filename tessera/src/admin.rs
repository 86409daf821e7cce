// Copyright (c) 2024 Tessera Foundation

//! Admin key governance.
//!
//! Three admin threads live on chain as single zero-value outputs created by
//! genesis. An admin transaction spends the current thread output as its
//! first input and recreates it as its first output:
//!
//! * the Root thread adds and revokes Root and Provisioning keys,
//! * the Provision thread adds and revokes Issuing and Validating keys,
//! * the Issue thread mints new coins.
//!
//! Key changes are applied in block order against the parent block's key
//! sets, producing a new immutable value only when something changed.

use crate::{
    error::{rule_error, ErrorCode, RuleError},
    params::ChainParams,
};
use std::{collections::BTreeSet, sync::Arc};
use tracing::debug;
use tsr_blockchain_types::{
    AdminKeySets, AdminOp, AdminThread, Block, KeySetType, LockScript, Transaction, Unlock,
};
use tsr_crypto_keys::SignatureVerifier;

/// Roles that must always keep at least one key.
const NON_EMPTY_ROLES: [KeySetType; 3] = [
    KeySetType::Root,
    KeySetType::Provisioning,
    KeySetType::Validating,
];

fn admin_tx_error(tx: &Transaction, reason: impl std::fmt::Display) -> RuleError {
    rule_error(
        ErrorCode::InvalidAdminTx,
        format!("admin transaction {:?}: {reason}", tx.hash()),
    )
}

fn admin_op_error(tx: &Transaction, reason: impl std::fmt::Display) -> RuleError {
    rule_error(
        ErrorCode::InvalidAdminOp,
        format!("admin transaction {:?}: {reason}", tx.hash()),
    )
}

/// Context-free shape checks for a non-coinbase transaction's admin
/// outputs.
pub fn check_admin_structure(tx: &Transaction) -> Result<(), RuleError> {
    let thread_outputs = tx
        .outputs
        .iter()
        .filter(|out| out.lock.admin_thread().is_some())
        .count();

    let Some(thread) = tx.admin_thread() else {
        if thread_outputs > 0 {
            return Err(admin_tx_error(tx, "thread output must be the first output"));
        }
        if tx
            .outputs
            .iter()
            .any(|out| matches!(out.lock, LockScript::AdminOp(_)))
        {
            return Err(admin_tx_error(tx, "key operation outside the root or provision thread"));
        }
        return Ok(());
    };

    if thread_outputs > 1 {
        return Err(admin_tx_error(tx, "more than one thread output"));
    }
    if tx.outputs[0].value != 0 {
        return Err(admin_tx_error(
            tx,
            format_args!("{thread:?} thread output carries value {}", tx.outputs[0].value),
        ));
    }
    match tx.inputs.first().map(|input| &input.unlock) {
        Some(Unlock::Signatures(signatures)) if !signatures.is_empty() => {}
        _ => return Err(admin_tx_error(tx, "thread input is not signed")),
    }

    let rest = &tx.outputs[1..];
    match thread {
        AdminThread::Root | AdminThread::Provision => {
            if tx.inputs.len() != 1 {
                return Err(admin_tx_error(
                    tx,
                    format_args!("{thread:?} thread transaction has {} inputs", tx.inputs.len()),
                ));
            }
            if rest.is_empty() {
                return Err(admin_tx_error(tx, format_args!("{thread:?} thread transaction has no operations")));
            }
            for out in rest {
                match out.lock {
                    LockScript::AdminOp(_) if out.value == 0 => {}
                    LockScript::AdminOp(_) => {
                        return Err(admin_tx_error(tx, "key operation carries value"))
                    }
                    _ => {
                        return Err(admin_tx_error(
                            tx,
                            format_args!("{thread:?} thread transaction has a non-operation output"),
                        ))
                    }
                }
            }
        }
        AdminThread::Issue => {
            if rest.is_empty() {
                return Err(admin_tx_error(tx, "issue thread transaction mints nothing"));
            }
            if rest.iter().any(|out| out.lock.is_admin()) {
                return Err(admin_tx_error(tx, "issue thread transaction has admin outputs"));
            }
        }
    }
    Ok(())
}

/// Check that `tx`'s thread input carries at least the threshold of valid
/// signatures from keys authorized for the thread.
fn authorize(
    tx: &Transaction,
    thread: AdminThread,
    keys: &AdminKeySets,
    threshold: usize,
    verifier: &dyn SignatureVerifier,
) -> Result<(), RuleError> {
    let role = thread.authorizing_role();
    let authorized = keys.keys(role);
    let message = tx.signing_hash();
    let signatures = tx
        .inputs
        .first()
        .map(|input| input.unlock.signatures())
        .unwrap_or_default();

    let signers: BTreeSet<_> = signatures
        .iter()
        .filter(|sig| authorized.contains(&sig.key))
        .filter(|sig| verifier.verify(&sig.key, message.as_bytes(), &sig.signature))
        .map(|sig| sig.key)
        .collect();

    if signers.len() < threshold {
        return Err(admin_op_error(
            tx,
            format_args!(
                "{} valid {role} signatures, {threshold} required",
                signers.len()
            ),
        ));
    }
    Ok(())
}

fn apply_op(
    tx: &Transaction,
    thread: AdminThread,
    op: &AdminOp,
    keys: &mut AdminKeySets,
) -> Result<(), RuleError> {
    let role = op.role();
    if !thread.manages(role) {
        return Err(admin_op_error(
            tx,
            format_args!("{thread:?} thread cannot change {role} keys"),
        ));
    }
    match op {
        AdminOp::AddKey { key, .. } => {
            if !keys.insert(role, *key) {
                return Err(admin_op_error(tx, format_args!("{key} is already a {role} key")));
            }
        }
        AdminOp::RevokeKey { key, .. } => {
            if !keys.remove(role, key) {
                return Err(admin_op_error(tx, format_args!("{key} is not a {role} key")));
            }
            if NON_EMPTY_ROLES.contains(&role) && keys.keys(role).is_empty() {
                return Err(admin_op_error(
                    tx,
                    format_args!("revoking {key} would leave no {role} keys"),
                ));
            }
        }
    }
    Ok(())
}

/// Apply the admin transactions of `block` on top of its parent's key sets.
///
/// With no verifier, signatures are not checked; operations are still
/// applied and must still be consistent with the key sets.
pub fn apply_block_admin_ops(
    parent: &Arc<AdminKeySets>,
    block: &Block,
    params: &ChainParams,
    verifier: Option<&dyn SignatureVerifier>,
) -> Result<Arc<AdminKeySets>, RuleError> {
    let mut changed: Option<AdminKeySets> = None;

    for tx in block.transactions.iter().skip(1) {
        let Some(thread) = tx.admin_thread() else {
            continue;
        };
        let current = changed.as_ref().unwrap_or(parent.as_ref());
        if let Some(verifier) = verifier {
            authorize(tx, thread, current, params.admin_signature_threshold, verifier)?;
        }
        if thread == AdminThread::Issue {
            continue;
        }

        let mut next = current.clone();
        for out in &tx.outputs[1..] {
            if let LockScript::AdminOp(op) = &out.lock {
                apply_op(tx, thread, op, &mut next)?;
                debug!(
                    tx = ?tx.hash(),
                    role = %op.role(),
                    key = %op.key(),
                    revoke = matches!(op, AdminOp::RevokeKey { .. }),
                    "Applied admin key operation"
                );
            }
        }
        changed = Some(next);
    }

    Ok(match changed {
        Some(keys) if keys != **parent => Arc::new(keys),
        _ => Arc::clone(parent),
    })
}
