// Copyright (c) 2024 Tessera Foundation

//! A copy-on-write view of the unspent output set.
//!
//! The view reads through to the store and records every change in memory,
//! so a whole sequence of block disconnects and connects can be validated
//! before anything is written. Only [`UtxoViewpoint::write_to`] turns the
//! changes into store operations.

use crate::error::{assertion, ChainError};
use std::collections::{hash_map::Entry, HashMap};
use tsr_blockchain_types::{Block, OutPoint, Transaction};
use tsr_ledger_db::{ChainStore, SpentOutput, StoreError, UtxoEntry, WriteBatch};

/// What the view knows about an outpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UtxoState {
    /// Spendable.
    Unspent(UtxoEntry),
    /// Spent by a transaction applied to this view.
    Spent,
    /// Not in the set.
    Missing,
}

#[derive(Clone, Debug)]
struct CachedEntry {
    state: UtxoState,
    modified: bool,
}

/// Unspent outputs as seen from a chain tip that may differ from the
/// store's.
pub struct UtxoViewpoint<'a> {
    store: &'a dyn ChainStore,
    entries: HashMap<OutPoint, CachedEntry>,
}

impl<'a> UtxoViewpoint<'a> {
    /// A view that initially matches `store`.
    pub fn new(store: &'a dyn ChainStore) -> Self {
        Self {
            store,
            entries: HashMap::new(),
        }
    }

    /// The state of `outpoint`, loading it from the store on first access.
    pub fn fetch(&mut self, outpoint: &OutPoint) -> Result<&UtxoState, StoreError> {
        let cached = match self.entries.entry(*outpoint) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let state = match self.store.utxo(outpoint)? {
                    Some(utxo) => UtxoState::Unspent(utxo),
                    None => UtxoState::Missing,
                };
                entry.insert(CachedEntry {
                    state,
                    modified: false,
                })
            }
        };
        Ok(&cached.state)
    }

    /// The spendable entry at `outpoint`, if any.
    pub fn lookup(&mut self, outpoint: &OutPoint) -> Result<Option<&UtxoEntry>, StoreError> {
        Ok(match self.fetch(outpoint)? {
            UtxoState::Unspent(entry) => Some(entry),
            UtxoState::Spent | UtxoState::Missing => None,
        })
    }

    fn set(&mut self, outpoint: OutPoint, state: UtxoState) {
        self.entries.insert(
            outpoint,
            CachedEntry {
                state,
                modified: true,
            },
        );
    }

    /// Add the spendable outputs of `tx`, created at `height`.
    pub fn add_tx_outputs(&mut self, tx: &Transaction, height: u64) {
        let tx_hash = tx.hash();
        let is_coinbase = tx.is_coinbase();
        for (index, output) in tx.outputs.iter().enumerate() {
            if !output.lock.is_spendable() {
                continue;
            }
            self.set(
                OutPoint::new(tx_hash, index as u32),
                UtxoState::Unspent(UtxoEntry {
                    output: output.clone(),
                    height,
                    is_coinbase,
                }),
            );
        }
    }

    /// Spend the inputs of `tx` and add its outputs, journaling what was
    /// spent. Inputs must already have been checked against the view.
    pub fn connect_transaction(
        &mut self,
        tx: &Transaction,
        height: u64,
        journal: &mut Vec<SpentOutput>,
    ) -> Result<(), ChainError> {
        if !tx.is_coinbase() {
            for input in &tx.inputs {
                let outpoint = input.previous_output;
                let entry = match self.fetch(&outpoint)? {
                    UtxoState::Unspent(entry) => entry.clone(),
                    state => {
                        return Err(assertion(format!(
                            "connecting {:?} spends {outpoint} in state {state:?}",
                            tx.hash()
                        )))
                    }
                };
                self.set(outpoint, UtxoState::Spent);
                journal.push(SpentOutput { outpoint, entry });
            }
        }
        self.add_tx_outputs(tx, height);
        Ok(())
    }

    /// Apply every transaction of `block` without validation, returning the
    /// spend journal.
    pub fn connect_block(&mut self, block: &Block, height: u64) -> Result<Vec<SpentOutput>, ChainError> {
        let mut journal = Vec::new();
        for tx in &block.transactions {
            self.connect_transaction(tx, height, &mut journal)?;
        }
        Ok(journal)
    }

    /// Undo `block`: remove the outputs it created and restore the outputs
    /// its journal says it spent.
    pub fn disconnect_block(
        &mut self,
        block: &Block,
        mut journal: Vec<SpentOutput>,
    ) -> Result<(), ChainError> {
        let spent_count: usize = block
            .transactions
            .iter()
            .filter(|tx| !tx.is_coinbase())
            .map(|tx| tx.inputs.len())
            .sum();
        if spent_count != journal.len() {
            return Err(assertion(format!(
                "spend journal of block {:?} has {} entries, block spends {}",
                block.hash(),
                journal.len(),
                spent_count
            )));
        }

        for tx in block.transactions.iter().rev() {
            let tx_hash = tx.hash();
            for (index, output) in tx.outputs.iter().enumerate() {
                if output.lock.is_spendable() {
                    self.set(OutPoint::new(tx_hash, index as u32), UtxoState::Missing);
                }
            }

            if tx.is_coinbase() {
                continue;
            }
            for input in tx.inputs.iter().rev() {
                let spent = journal
                    .pop()
                    .ok_or_else(|| assertion("spend journal exhausted"))?;
                if spent.outpoint != input.previous_output {
                    return Err(assertion(format!(
                        "spend journal entry {} does not match input {}",
                        spent.outpoint, input.previous_output
                    )));
                }
                self.set(spent.outpoint, UtxoState::Unspent(spent.entry));
            }
        }
        Ok(())
    }

    /// Number of outpoints changed relative to the store.
    #[cfg(test)]
    fn modified_count(&self) -> usize {
        self.entries.values().filter(|e| e.modified).count()
    }

    /// Append the view's changes to `batch`.
    pub fn write_to(&self, batch: &mut WriteBatch) {
        let mut modified: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, cached)| cached.modified)
            .collect();
        modified.sort_by_key(|(outpoint, _)| **outpoint);

        for (outpoint, cached) in modified {
            match &cached.state {
                UtxoState::Unspent(entry) => batch.put_utxo(*outpoint, entry.clone()),
                UtxoState::Spent | UtxoState::Missing => batch.delete_utxo(*outpoint),
            }
        }
    }
}
