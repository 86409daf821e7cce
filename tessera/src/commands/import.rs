// Copyright (c) 2024 Tessera Foundation

use anyhow::{Context, Result};
use std::{fs, path::Path};
use tracing::{info, warn};
use tsr_blockchain_types::Block;

use crate::{
    chain::{BehaviorFlags, BlockOutcome},
    commands::{load_config, open_chain},
};

/// Totals of one import run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub main_chain: usize,
    pub side_chain: usize,
    pub orphans: usize,
    pub rejected: usize,
}

/// Read a bincode-encoded list of blocks from `path`.
pub fn read_blocks(path: &Path) -> Result<Vec<Block>> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    bincode::deserialize(&bytes)
        .with_context(|| format!("Failed to decode blocks from {}", path.display()))
}

/// Feed every block of `path` to the chain, in file order.
///
/// With `trusted`, blocks skip the checks that need a signature or the
/// UTXO set.
pub fn run(
    config_path: &Path,
    data_dir: Option<&Path>,
    blocks_path: &Path,
    trusted: bool,
) -> Result<()> {
    let config = load_config(config_path, data_dir)?;
    let chain = open_chain(&config)?;
    let blocks = read_blocks(blocks_path)?;
    let flags = if trusted {
        BehaviorFlags::FAST_ADD
    } else {
        BehaviorFlags::NONE
    };

    let mut summary = ImportSummary::default();
    for block in blocks {
        let hash = block.hash();
        match chain.process_block(block, flags)? {
            BlockOutcome::Accepted { orphan: true, .. } => summary.orphans += 1,
            BlockOutcome::Accepted {
                main_chain: true, ..
            } => summary.main_chain += 1,
            BlockOutcome::Accepted { .. } => summary.side_chain += 1,
            BlockOutcome::Rejected(err) => {
                warn!(block = ?hash, code = %err.code, "Block rejected: {}", err);
                summary.rejected += 1;
            }
        }
    }

    let best = chain.best_snapshot();
    info!(height = best.height, tip = ?best.hash, "Import finished");
    println!("Imported {}:", blocks_path.display());
    println!("  Main chain: {}", summary.main_chain);
    println!("  Side chain: {}", summary.side_chain);
    println!("  Orphans: {}", summary.orphans);
    println!("  Rejected: {}", summary.rejected);
    println!("Best tip: {} at height {}", best.hash, best.height);
    Ok(())
}
