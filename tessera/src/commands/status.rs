// Copyright (c) 2024 Tessera Foundation

use anyhow::Result;
use std::path::Path;
use tsr_blockchain_types::KeySetType;

use crate::commands::{load_config, open_chain};

/// Show the best chain and the admin key sets in force.
pub fn run(config_path: &Path, data_dir: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, data_dir)?;
    let chain = open_chain(&config)?;
    let best = chain.best_snapshot();

    println!();
    println!("=== Tessera Status ===");
    println!();
    println!("Chain:");
    println!("  Network: {}", config.network);
    println!("  Height: {}", best.height);
    println!("  Tip hash: {}", best.hash);
    println!("  Tip time: {}", best.timestamp);
    println!("  Median time: {}", best.median_time);
    println!("  Bits: {:#010x}", best.bits);
    println!("  Next bits: {:#010x}", chain.calc_next_required_bits()?);
    println!("  Total work: {:#x}", best.total_work);
    println!("  Tip transactions: {}", best.num_txs);
    println!("  Tip size: {} bytes", best.block_size);
    match chain.latest_checkpoint() {
        Some(checkpoint) => println!(
            "  Latest checkpoint: {} at height {}",
            checkpoint.hash, checkpoint.height
        ),
        None => println!("  Latest checkpoint: none passed"),
    }
    println!();
    println!("Admin keys:");
    for role in KeySetType::ALL {
        let keys = best.admin_keys.keys(role);
        println!("  {role} ({}):", keys.len());
        for key in keys {
            println!("    {key}");
        }
    }
    println!();
    Ok(())
}
