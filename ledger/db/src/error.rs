// Copyright (c) 2024 Tessera Foundation

//! Store errors.

use displaydoc::Display;
use tsr_blockchain_types::BlockHash;

/// An error reading or writing chain state.
#[derive(Debug, Display)]
pub enum StoreError {
    /// LMDB error: {0}
    Lmdb(lmdb::Error),

    /// Serialization error: {0}
    Serialization(String),

    /// I/O error: {0}
    Io(std::io::Error),

    /// Chain node not found: {0}
    NodeNotFound(BlockHash),

    /// Stored value is corrupt: {0}
    Corrupt(String),
}

impl std::error::Error for StoreError {}

impl From<lmdb::Error> for StoreError {
    fn from(src: lmdb::Error) -> Self {
        Self::Lmdb(src)
    }
}

impl From<bincode::Error> for StoreError {
    fn from(src: bincode::Error) -> Self {
        Self::Serialization(src.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(src: std::io::Error) -> Self {
        Self::Io(src)
    }
}
