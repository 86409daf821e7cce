// Copyright (c) 2024 Tessera Foundation

//! Unspent outputs of the best chain.

use crate::{StoreError, UtxoEntry};
use lmdb::{Cursor, Database, DatabaseFlags, Environment, RwTransaction, Transaction, WriteFlags};
use std::collections::BTreeMap;
use tsr_blockchain_types::{Hash256, OutPoint};

// LMDB Database names.
pub const UTXOS_DB_NAME: &str = "utxo_store:utxos";

#[derive(Clone)]
pub struct UtxoStore {
    /// `outpoint.to_key_bytes() -> encode(&entry)`
    utxos: Database,
}

impl UtxoStore {
    /// Opens an existing UtxoStore.
    pub fn new(env: &Environment) -> Result<Self, StoreError> {
        Ok(UtxoStore {
            utxos: env.open_db(Some(UTXOS_DB_NAME))?,
        })
    }

    // Creates a fresh UtxoStore on disk.
    pub fn create(env: &Environment) -> Result<(), StoreError> {
        env.create_db(Some(UTXOS_DB_NAME), DatabaseFlags::empty())?;
        Ok(())
    }

    pub fn get<T: Transaction>(
        &self,
        outpoint: &OutPoint,
        db_transaction: &T,
    ) -> Result<Option<UtxoEntry>, StoreError> {
        match db_transaction.get(self.utxos, &outpoint.to_key_bytes()) {
            Ok(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn put(
        &self,
        outpoint: &OutPoint,
        entry: &UtxoEntry,
        db_transaction: &mut RwTransaction,
    ) -> Result<(), StoreError> {
        let bytes = bincode::serialize(entry)?;
        db_transaction.put(
            self.utxos,
            &outpoint.to_key_bytes(),
            &bytes,
            WriteFlags::empty(),
        )?;
        Ok(())
    }

    /// Removes an entry. Removing an absent entry is not an error.
    pub fn delete(
        &self,
        outpoint: &OutPoint,
        db_transaction: &mut RwTransaction,
    ) -> Result<(), StoreError> {
        match db_transaction.del(self.utxos, &outpoint.to_key_bytes(), None) {
            Ok(()) | Err(lmdb::Error::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_all<T: Transaction>(
        &self,
        db_transaction: &T,
    ) -> Result<BTreeMap<OutPoint, UtxoEntry>, StoreError> {
        let mut result = BTreeMap::new();
        let mut cursor = db_transaction.open_ro_cursor(self.utxos)?;
        for item in cursor.iter_start() {
            let (key, value) = item?;
            result.insert(key_to_outpoint(key)?, bincode::deserialize(value)?);
        }
        Ok(result)
    }
}

fn key_to_outpoint(key: &[u8]) -> Result<OutPoint, StoreError> {
    if key.len() != 36 {
        return Err(StoreError::Corrupt(format!(
            "utxo key has {} bytes",
            key.len()
        )));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&key[..32]);
    let mut index = [0u8; 4];
    index.copy_from_slice(&key[32..]);
    Ok(OutPoint::new(Hash256(hash), u32::from_be_bytes(index)))
}
