// Copyright (c) 2024 Tessera Foundation

use anyhow::{bail, Result};
use std::path::Path;
use tracing::info;

use crate::{commands::open_chain, config::Config, params::Network};

/// Write a default config for `network` and create its chain store.
pub fn run(config_path: &Path, data_dir: Option<&Path>, network: Network) -> Result<()> {
    if config_path.exists() {
        bail!(
            "Config already exists at {}\nUse a different --config path or delete the existing config.",
            config_path.display()
        );
    }

    let mut config = Config {
        network,
        ..Config::default()
    };
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir.to_path_buf();
    }
    config.save(config_path)?;

    let chain = open_chain(&config)?;
    let best = chain.best_snapshot();

    info!("Chain initialized at {}", config.store_path().display());
    println!("\n[{network}] Node configuration created.");
    println!("Config saved to: {}", config_path.display());
    println!("Chain store: {}", config.store_path().display());
    println!("Genesis: {}", best.hash);
    println!("\nNext steps:");
    println!("  1. Run 'tessera import <blocks file>' to load blocks");
    println!("  2. Run 'tessera status' to inspect the chain");
    Ok(())
}
