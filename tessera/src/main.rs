// Copyright (c) 2024 Tessera Foundation

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tessera::{commands, config::Config, params::Network};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Block validation and chain state for a permissioned PoW ledger", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = "tessera.toml")]
    config: PathBuf,

    /// Directory holding the chain store, overriding the config
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and create the chain store
    Init {
        /// Network to configure
        #[arg(long, default_value_t = Network::Testnet)]
        network: Network,
    },

    /// Show the best chain and the admin key sets
    Status,

    /// Process a bincode file of blocks
    Import {
        /// File holding a list of blocks
        file: PathBuf,

        /// Skip signature and UTXO checks for already-validated blocks
        #[arg(long)]
        trusted: bool,
    },

    /// Print the chain parameters selected by the config
    CheckConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose, which wins over the config file
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if cli.verbose => EnvFilter::new("debug"),
        Err(_) => {
            let level = Config::load_or_default(&cli.config)
                .map(|config| config.logging.level)
                .unwrap_or_else(|_| "info".to_string());
            EnvFilter::new(level)
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let data_dir = cli.data_dir.as_deref();
    match cli.command {
        Commands::Init { network } => commands::init::run(&cli.config, data_dir, network),
        Commands::Status => commands::status::run(&cli.config, data_dir),
        Commands::Import { file, trusted } => {
            commands::import::run(&cli.config, data_dir, &file, trusted)
        }
        Commands::CheckConfig => commands::check_config::run(&cli.config, data_dir),
    }
}
