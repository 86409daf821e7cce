// Copyright (c) 2024 Tessera Foundation

//! CLI command implementations.
//!
//! These modules implement the user-facing CLI commands and legitimately
//! use stdout for output.

#![allow(clippy::print_stdout)]

pub mod check_config;
pub mod import;
pub mod init;
pub mod status;

use anyhow::{Context, Result};
use std::{path::Path, sync::Arc};
use tsr_crypto_keys::Ed25519Verifier;
use tsr_ledger_db::LmdbStore;

use crate::{chain::Chain, config::Config, time::SystemClock};

/// Load the config at `config_path`, with `data_dir` overriding its data
/// directory.
pub fn load_config(config_path: &Path, data_dir: Option<&Path>) -> Result<Config> {
    let mut config =
        Config::load(config_path).context("No config found. Run 'tessera init' first.")?;
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir.to_path_buf();
    }
    Ok(config)
}

/// Open the chain store named by `config`, creating it if needed.
pub fn open_chain(config: &Config) -> Result<Chain> {
    let params = config.chain_params()?;
    let store_path = config.store_path();
    let store = LmdbStore::open(&store_path)
        .with_context(|| format!("Failed to open chain store at {}", store_path.display()))?;

    Chain::new(
        Arc::new(params),
        Arc::new(store),
        Arc::new(Ed25519Verifier),
        Arc::new(SystemClock),
        config.chain_options()?,
    )
    .context("Failed to load chain state")
}
