// Copyright (c) 2024 Tessera Foundation

use anyhow::Result;
use std::path::Path;

use crate::config::Config;

/// Parse the config and print the chain parameters it selects.
pub fn run(config_path: &Path, data_dir: Option<&Path>) -> Result<()> {
    let mut config = Config::load_or_default(config_path)?;
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir.to_path_buf();
    }
    let params = config.chain_params()?;
    config.chain_options()?;

    println!("Config: {}", config_path.display());
    println!("  Network: {}", params.network);
    println!("  Data dir: {}", config.data_dir.display());
    println!("  Genesis: {}", params.genesis_hash());
    println!("  Pow limit bits: {:#010x}", params.pow_limit_bits());
    println!(
        "  Retargeting: {}",
        if params.pow.no_retargeting {
            "disabled".to_string()
        } else {
            format!("every {} blocks", params.pow.retarget_interval())
        }
    );
    println!("  Coinbase maturity: {}", params.coinbase_maturity);
    println!("  Admin signature threshold: {}", params.admin_signature_threshold);
    println!("  Checkpoints: {}", params.checkpoints.len());
    for checkpoint in &params.checkpoints {
        println!("    {} {}", checkpoint.height, checkpoint.hash);
    }
    println!(
        "  Orphan pool: {} blocks, {}s expiry",
        config.chain.max_orphans, config.chain.orphan_expiry_secs
    );
    Ok(())
}
