// Copyright (c) 2024 Tessera Foundation

//! CLI commands against a config in a temporary directory.

mod common;

use common::*;
use std::fs;
use tempfile::tempdir;
use tessera::{
    commands::{self, import::read_blocks},
    config::Config,
    params::Network,
    ChainParams,
};

#[test]
fn test_import_then_status() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("tessera.toml");
    let config = Config {
        network: Network::Regtest,
        data_dir: dir.path().join("data"),
        ..Config::default()
    };
    config.save(&config_path).unwrap();

    let genesis = ChainParams::regtest().genesis_block();
    let b1 = child_block(&genesis, 1, vec![], 0);
    let b2 = child_block(&b1, 2, vec![], 0);
    let b3 = child_block(&b2, 3, vec![], 0);
    let mut bad = child_block(&b3, 4, vec![], 0);
    bad.transactions[0].outputs[0].value += 1;
    let bad = seal(bad);

    // Out of order, so b3 waits as an orphan until b2 arrives.
    let blocks = vec![b1, b3.clone(), b2, bad];
    let blocks_path = dir.path().join("blocks.bin");
    fs::write(&blocks_path, bincode::serialize(&blocks).unwrap()).unwrap();
    assert_eq!(read_blocks(&blocks_path).unwrap(), blocks);

    commands::import::run(&config_path, None, &blocks_path, false).unwrap();
    commands::status::run(&config_path, None).unwrap();
    commands::check_config::run(&config_path, None).unwrap();

    let chain = commands::open_chain(&config).unwrap();
    let best = chain.best_snapshot();
    assert_eq!(best.height, 3);
    assert_eq!(best.hash, b3.hash());
}

#[test]
fn test_init_refuses_to_overwrite() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("tessera.toml");
    fs::write(&config_path, "network = \"regtest\"\n").unwrap();
    assert!(commands::init::run(&config_path, None, Network::Regtest).is_err());
}

#[test]
fn test_import_of_garbage_fails() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("tessera.toml");
    let config = Config {
        network: Network::Regtest,
        data_dir: dir.path().join("data"),
        ..Config::default()
    };
    config.save(&config_path).unwrap();

    let blocks_path = dir.path().join("blocks.bin");
    fs::write(&blocks_path, b"not blocks").unwrap();
    assert!(commands::import::run(&config_path, None, &blocks_path, false).is_err());
}

#[test]
fn test_status_without_config() {
    let dir = tempdir().unwrap();
    assert!(commands::status::run(&dir.path().join("missing.toml"), None).is_err());
}

#[test]
fn test_init_with_data_dir_override() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("tessera.toml");
    let data_dir = dir.path().join("elsewhere");
    commands::init::run(&config_path, Some(&data_dir), Network::Regtest).unwrap();

    let config = Config::load(&config_path).unwrap();
    assert_eq!(config.network, Network::Regtest);
    assert_eq!(config.data_dir, data_dir);
    assert!(config.store_path().starts_with(&data_dir));

    let moved = dir.path().join("moved");
    let overridden = commands::load_config(&config_path, Some(&moved)).unwrap();
    assert_eq!(overridden.data_dir, moved);
    commands::status::run(&config_path, None).unwrap();
}
