// Copyright (c) 2024 Tessera Foundation

//! Read queries running alongside block processing.

mod common;

use common::*;
use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
};
use tsr_blockchain_types::OutPoint;

#[test]
fn test_utxos_match_the_tip_they_are_read_with() {
    let t = TestChain::new();
    let genesis = t.genesis();
    let mut blocks = Vec::new();
    let mut parent = genesis.clone();
    for height in 1..=30 {
        let block = child_block(&parent, height, vec![], 0);
        parent = block.clone();
        blocks.push(block);
    }

    let genesis_tx = genesis.transactions[0].hash();
    let mut outpoints: Vec<_> = (0..genesis.transactions[0].outputs.len() as u32)
        .map(|index| OutPoint::new(genesis_tx, index))
        .collect();
    outpoints.extend(blocks.iter().map(coinbase_outpoint));
    let genesis_outputs = genesis.transactions[0].outputs.len() as u64;

    let done = AtomicBool::new(false);
    thread::scope(|scope| {
        let readers: Vec<_> = (0..3)
            .map(|_| {
                scope.spawn(|| {
                    let mut reads = 0;
                    while !done.load(Ordering::Acquire) || reads == 0 {
                        let (best, entries) = t.chain.fetch_utxos(&outpoints).unwrap();
                        let unspent = entries.iter().filter(|entry| entry.is_some()).count();
                        assert_eq!(unspent as u64, genesis_outputs + best.height);
                        assert!(t.chain.have_block(&best.hash));
                        reads += 1;
                    }
                })
            })
            .collect();

        for block in &blocks {
            t.accept(block);
        }
        done.store(true, Ordering::Release);
        for reader in readers {
            reader.join().unwrap();
        }
    });

    assert_eq!(t.chain.best_snapshot().height, 30);
}
