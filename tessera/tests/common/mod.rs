// Copyright (c) 2024 Tessera Foundation

//! Shared fixtures for chain integration tests.

#![allow(dead_code)]

use chrono::Duration;
use std::sync::Arc;
use tessera::{
    params::regtest_signing_key,
    time::{Clock, ManualClock},
    BehaviorFlags, BlockOutcome, Chain, ChainOptions, ChainParams,
};
use tsr_blockchain_types::{
    compute_merkle_root, AdminOp, AdminThread, Amount, Block, KeySetType, KeySignature,
    LockScript, OutPoint, Transaction, TxIn, TxOut, Unlock, MAX_TX_IN_SEQUENCE,
};
use tsr_consensus_pow::{check_proof_of_work, hash_to_value};
use tsr_crypto_keys::{Ed25519Verifier, SigningKeyPair};
use tsr_ledger_db::{ChainStore, MemoryStore};

/// A regtest chain on an in-memory store with a stopped clock.
pub struct TestChain {
    pub params: Arc<ChainParams>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub chain: Chain,
}

impl TestChain {
    pub fn new() -> Self {
        Self::with_params(ChainParams::regtest())
    }

    pub fn with_params(params: ChainParams) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::open(params, store)
    }

    /// Open a chain over an existing store.
    pub fn open(params: ChainParams, store: Arc<MemoryStore>) -> Self {
        Self::open_with_options(params, store, ChainOptions::default())
    }

    pub fn open_with_options(
        params: ChainParams,
        store: Arc<MemoryStore>,
        options: ChainOptions,
    ) -> Self {
        let params = Arc::new(params);
        let clock = Arc::new(ManualClock::new(params.genesis_time() + Duration::days(1)));
        let chain = Chain::new(
            Arc::clone(&params),
            Arc::clone(&store) as Arc<dyn ChainStore>,
            Arc::new(Ed25519Verifier),
            Arc::clone(&clock) as Arc<dyn Clock>,
            options,
        )
        .unwrap();
        Self {
            params,
            store,
            clock,
            chain,
        }
    }

    pub fn genesis(&self) -> Block {
        self.params.genesis_block()
    }

    pub fn process(&self, block: &Block) -> BlockOutcome {
        self.chain
            .process_block(block.clone(), BehaviorFlags::NONE)
            .unwrap()
    }

    /// Process a block that must land on the main chain.
    pub fn accept(&self, block: &Block) {
        let outcome = self.process(block);
        assert!(
            outcome.is_main_chain(),
            "block at {:?} not on main chain: {outcome:?}",
            block.hash()
        );
    }

    /// Extend the best chain with `count` empty blocks, returning them.
    pub fn extend(&self, parent: &Block, start_height: u64, count: u64) -> Vec<Block> {
        let mut blocks = Vec::new();
        let mut parent = parent.clone();
        for height in start_height..start_height + count {
            let block = child_block(&parent, height, vec![], 0);
            self.accept(&block);
            parent = block.clone();
            blocks.push(block);
        }
        blocks
    }
}

pub fn validating_key() -> SigningKeyPair {
    regtest_signing_key(KeySetType::Validating)
}

/// A coinbase for `height` paying `value` to the validating key. `tag`
/// varies the coinbase data so sibling blocks differ.
pub fn coinbase(height: u64, value: Amount, tag: u8) -> Transaction {
    let mut data = height.to_le_bytes().to_vec();
    data.extend_from_slice(b"test");
    data.push(tag);
    Transaction {
        version: 1,
        inputs: vec![TxIn {
            previous_output: OutPoint::null(),
            unlock: Unlock::Coinbase(data),
            sequence: MAX_TX_IN_SEQUENCE,
        }],
        outputs: vec![TxOut::new(
            value,
            LockScript::PayToKey(validating_key().public_key()),
        )],
        lock_time: 0,
    }
}

/// Recompute merkle root and size, then solve and sign the header.
pub fn seal(block: Block) -> Block {
    seal_with(block, &validating_key())
}

/// Like [`seal`], with `signer` as the validating key.
pub fn seal_with(mut block: Block, signer: &SigningKeyPair) -> Block {
    let params = ChainParams::regtest();
    block.header.merkle_root = compute_merkle_root(&block.transactions);
    block.header.size = block.transactions_size() as u32;
    block.header.validating_key = signer.public_key();
    while check_proof_of_work(
        block.header.hash().as_bytes(),
        block.header.bits,
        &params.pow.pow_limit,
    )
    .is_err()
    {
        block.header.nonce += 1;
    }
    block.header.signature = signer.sign(block.header.hash().as_bytes());
    block
}

/// A sealed block at `height` on `parent`, one minute later.
pub fn child_block(parent: &Block, height: u64, extra: Vec<Transaction>, tag: u8) -> Block {
    let params = ChainParams::regtest();
    let mut transactions = vec![coinbase(height, params.block_subsidy(height), tag)];
    transactions.extend(extra);
    let mut header = parent.header.clone();
    header.prev_block = parent.hash();
    header.timestamp = parent.header.timestamp + Duration::seconds(60);
    header.nonce = 0;
    seal(Block {
        header,
        transactions,
    })
}

/// The first output of a block's coinbase.
pub fn coinbase_outpoint(block: &Block) -> OutPoint {
    OutPoint::new(block.transactions[0].hash(), 0)
}

pub fn sign_inputs(mut tx: Transaction, signers: &[&SigningKeyPair]) -> Transaction {
    let message = tx.signing_hash();
    let signatures: Vec<_> = signers
        .iter()
        .map(|pair| KeySignature {
            key: pair.public_key(),
            signature: pair.sign(message.as_bytes()),
        })
        .collect();
    for input in &mut tx.inputs {
        input.unlock = Unlock::Signatures(signatures.clone());
    }
    tx
}

/// Spend `from` (locked to the validating key) into `outputs`.
pub fn spend(from: OutPoint, outputs: Vec<TxOut>) -> Transaction {
    let tx = Transaction {
        version: 1,
        inputs: vec![TxIn {
            previous_output: from,
            unlock: Unlock::Signatures(vec![]),
            sequence: MAX_TX_IN_SEQUENCE,
        }],
        outputs,
        lock_time: 0,
    };
    sign_inputs(tx, &[&validating_key()])
}

/// An admin transaction continuing `thread` from `previous` with `outputs`
/// after the new thread output, signed by `signers`.
pub fn admin_tx(
    thread: AdminThread,
    previous: OutPoint,
    outputs: Vec<TxOut>,
    signers: &[&SigningKeyPair],
) -> Transaction {
    let tx = Transaction {
        version: 1,
        inputs: vec![TxIn {
            previous_output: previous,
            unlock: Unlock::Signatures(vec![]),
            sequence: MAX_TX_IN_SEQUENCE,
        }],
        outputs: std::iter::once(TxOut::new(0, LockScript::AdminThread(thread)))
            .chain(outputs)
            .collect(),
        lock_time: 0,
    };
    sign_inputs(tx, signers)
}

pub fn op_output(op: AdminOp) -> TxOut {
    TxOut::new(0, LockScript::AdminOp(op))
}

/// The genesis output of `thread`.
pub fn genesis_thread_outpoint(params: &ChainParams, thread: AdminThread) -> OutPoint {
    let genesis = params.genesis_block();
    let index = genesis.transactions[0]
        .outputs
        .iter()
        .position(|out| out.lock.admin_thread() == Some(thread))
        .unwrap();
    OutPoint::new(genesis.transactions[0].hash(), index as u32)
}

/// Whichever of two equal-work blocks the chain should prefer.
pub fn lower_hash<'a>(a: &'a Block, b: &'a Block) -> &'a Block {
    if hash_to_value(a.hash().as_bytes()) < hash_to_value(b.hash().as_bytes()) {
        a
    } else {
        b
    }
}
