// Copyright (c) 2024 Tessera Foundation

//! Admin key governance through the chain.

mod common;

use common::*;
use tessera::{params::regtest_signing_key, ErrorCode};
use tsr_blockchain_types::{AdminOp, AdminThread, KeySetType, LockScript, OutPoint, TxOut, COIN};
use tsr_crypto_keys::SigningKeyPair;

fn provisioning() -> SigningKeyPair {
    regtest_signing_key(KeySetType::Provisioning)
}

#[test]
fn test_unauthorized_key_addition() {
    let t = TestChain::new();
    let intruder = SigningKeyPair::from_seed(&[0x66; 32]);
    let add = admin_tx(
        AdminThread::Provision,
        genesis_thread_outpoint(&t.params, AdminThread::Provision),
        vec![op_output(AdminOp::AddKey {
            role: KeySetType::Validating,
            key: intruder.public_key(),
        })],
        &[&validating_key()],
    );
    let block = child_block(&t.genesis(), 1, vec![add], 0);

    let err = t.process(&block).rejection().cloned().unwrap();
    assert_eq!(err.code, ErrorCode::InvalidAdminOp);
    assert!(!t.chain.have_block(&block.hash()));
    assert_eq!(*t.chain.admin_key_sets(), t.params.genesis_admin_keys);
}

#[test]
fn test_added_validator_can_sign_blocks() {
    let t = TestChain::new();
    let validator = SigningKeyPair::from_seed(&[0x42; 32]);
    let stranger = SigningKeyPair::from_seed(&[0x43; 32]);

    let add = admin_tx(
        AdminThread::Provision,
        genesis_thread_outpoint(&t.params, AdminThread::Provision),
        vec![op_output(AdminOp::AddKey {
            role: KeySetType::Validating,
            key: validator.public_key(),
        })],
        &[&provisioning()],
    );
    let b1 = child_block(&t.genesis(), 1, vec![add.clone()], 0);
    t.accept(&b1);
    let keys = t.chain.admin_key_sets();
    assert!(keys.contains(KeySetType::Validating, &validator.public_key()));
    assert_eq!(keys.keys(KeySetType::Validating).len(), 2);

    let by_stranger = seal_with(child_block(&b1, 2, vec![], 1), &stranger);
    assert_eq!(
        t.process(&by_stranger).rejection().map(|err| err.code),
        Some(ErrorCode::InvalidValidateKey)
    );

    let b2 = seal_with(child_block(&b1, 2, vec![], 0), &validator);
    t.accept(&b2);

    // Revoke it again; the thread continues from the previous admin
    // transaction.
    let revoke = admin_tx(
        AdminThread::Provision,
        OutPoint::new(add.hash(), 0),
        vec![op_output(AdminOp::RevokeKey {
            role: KeySetType::Validating,
            key: validator.public_key(),
        })],
        &[&provisioning()],
    );
    let b3 = child_block(&b2, 3, vec![revoke], 0);
    t.accept(&b3);
    assert_eq!(*t.chain.admin_key_sets(), t.params.genesis_admin_keys);

    let b4 = seal_with(child_block(&b3, 4, vec![], 0), &validator);
    assert_eq!(
        t.process(&b4).rejection().map(|err| err.code),
        Some(ErrorCode::InvalidValidateKey)
    );
}

#[test]
fn test_cannot_revoke_last_validating_key() {
    let t = TestChain::new();
    let revoke = admin_tx(
        AdminThread::Provision,
        genesis_thread_outpoint(&t.params, AdminThread::Provision),
        vec![op_output(AdminOp::RevokeKey {
            role: KeySetType::Validating,
            key: validating_key().public_key(),
        })],
        &[&provisioning()],
    );
    let block = child_block(&t.genesis(), 1, vec![revoke], 0);
    assert_eq!(
        t.process(&block).rejection().map(|err| err.code),
        Some(ErrorCode::InvalidAdminOp)
    );
}

#[test]
fn test_issue_thread_mints() {
    let t = TestChain::new();
    let recipient = SigningKeyPair::from_seed(&[0x77; 32]).public_key();
    let mint = admin_tx(
        AdminThread::Issue,
        genesis_thread_outpoint(&t.params, AdminThread::Issue),
        vec![TxOut::new(1_000 * COIN, LockScript::PayToKey(recipient))],
        &[&regtest_signing_key(KeySetType::Issuing)],
    );
    let block = child_block(&t.genesis(), 1, vec![mint.clone()], 0);
    t.accept(&block);

    let minted = t
        .chain
        .fetch_utxo(&OutPoint::new(mint.hash(), 1))
        .unwrap()
        .unwrap();
    assert_eq!(minted.output.value, 1_000 * COIN);
    assert!(!minted.is_coinbase);

    let thread = t.chain.fetch_utxo(&OutPoint::new(mint.hash(), 0)).unwrap().unwrap();
    assert_eq!(thread.output.lock, LockScript::AdminThread(AdminThread::Issue));
    assert_eq!(
        t.chain
            .fetch_utxo(&genesis_thread_outpoint(&t.params, AdminThread::Issue))
            .unwrap(),
        None
    );
    assert_eq!(*t.chain.admin_key_sets(), t.params.genesis_admin_keys);
}

#[test]
fn test_issue_needs_issuing_signature() {
    let t = TestChain::new();
    let mint = admin_tx(
        AdminThread::Issue,
        genesis_thread_outpoint(&t.params, AdminThread::Issue),
        vec![TxOut::new(COIN, LockScript::PayToKey(validating_key().public_key()))],
        &[&provisioning()],
    );
    let block = child_block(&t.genesis(), 1, vec![mint], 0);
    assert_eq!(
        t.process(&block).rejection().map(|err| err.code),
        Some(ErrorCode::InvalidAdminOp)
    );
}

#[test]
fn test_issuing_key_addition_needs_provisioning_signature() {
    let t = TestChain::new();
    let issuer = SigningKeyPair::from_seed(&[0x55; 32]);
    let intruder = SigningKeyPair::from_seed(&[0x66; 32]);
    let add_issuer = |signer: &SigningKeyPair| {
        admin_tx(
            AdminThread::Provision,
            genesis_thread_outpoint(&t.params, AdminThread::Provision),
            vec![op_output(AdminOp::AddKey {
                role: KeySetType::Issuing,
                key: issuer.public_key(),
            })],
            &[signer],
        )
    };

    let forged = child_block(&t.genesis(), 1, vec![add_issuer(&intruder)], 0);
    assert_eq!(
        t.process(&forged).rejection().map(|err| err.code),
        Some(ErrorCode::InvalidAdminOp)
    );
    assert!(!t.chain.admin_key_sets().contains(KeySetType::Issuing, &issuer.public_key()));
    assert_eq!(t.chain.best_snapshot().height, 0);

    let add = add_issuer(&provisioning());
    let b1 = child_block(&t.genesis(), 1, vec![add], 0);
    t.accept(&b1);
    let keys = t.chain.admin_key_sets();
    assert!(keys.contains(KeySetType::Issuing, &issuer.public_key()));
    assert!(keys.contains(
        KeySetType::Issuing,
        &regtest_signing_key(KeySetType::Issuing).public_key()
    ));

    // The new key can continue the issue thread on its own.
    let mint = admin_tx(
        AdminThread::Issue,
        genesis_thread_outpoint(&t.params, AdminThread::Issue),
        vec![TxOut::new(5 * COIN, LockScript::PayToKey(validating_key().public_key()))],
        &[&issuer],
    );
    let b2 = child_block(&b1, 2, vec![mint.clone()], 0);
    t.accept(&b2);
    let minted = t
        .chain
        .fetch_utxo(&OutPoint::new(mint.hash(), 1))
        .unwrap()
        .unwrap();
    assert_eq!(minted.output.value, 5 * COIN);
}
