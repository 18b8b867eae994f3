// Bitcoin Dev Kit
// Written in 2020 by Alekos Filini <alekos.filini@gmail.com>
//
// Copyright (c) 2020-2021 Bitcoin Dev Kit Developers
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! UTXO inventory
//!
//! The [`Inventory`] keeps the outputs a wallet can spend, in the order they were added, together
//! with their encumbrance status. An output is put on [`UtxoStatus::Hold`] as soon as it is
//! committed to a transaction and stays there until it is explicitly released: a transaction
//! that was handed to a counterparty may still be broadcast later, so nothing is released
//! automatically.

use std::collections::HashMap;

use bitcoin::OutPoint;

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::error::Error;
use crate::types::{UnspentOutput, UtxoStatus};
use crate::wallet::coin_selection::{CoinSelectionAlgorithm, LargestFirstCoinSelection};

/// Which outputs coin selection may pick from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionScope {
    /// Only outputs that are not committed to any transaction
    FreeOnly,
    /// Every output, regardless of its status
    Any,
}

/// Result of [`Inventory::partition`]
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Output that gets split
    pub source: UnspentOutput,
    /// Value of every new output, the last one absorbs the rounding remainder
    pub shares: Vec<u64>,
}

impl Partition {
    /// Sum of all the shares
    pub fn total(&self) -> u64 {
        self.shares.iter().sum()
    }
}

/// Insertion-ordered collection of unspent outputs without duplicates
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    utxos: Vec<UnspentOutput>,
    index: HashMap<OutPoint, usize>,
}

impl PartialEq for Inventory {
    fn eq(&self, other: &Self) -> bool {
        self.utxos == other.utxos
    }
}

impl Inventory {
    /// Create an empty inventory
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an inventory out of a list of outputs, failing on the first duplicate
    pub fn from_utxos<I: IntoIterator<Item = UnspentOutput>>(utxos: I) -> Result<Self, Error> {
        let mut inventory = Inventory::new();
        for utxo in utxos {
            inventory.add(utxo)?;
        }

        Ok(inventory)
    }

    /// Add an output
    pub fn add(&mut self, utxo: UnspentOutput) -> Result<(), Error> {
        if self.index.contains_key(&utxo.outpoint) {
            return Err(Error::DuplicateEntry(utxo.outpoint));
        }

        self.index.insert(utxo.outpoint, self.utxos.len());
        self.utxos.push(utxo);

        Ok(())
    }

    /// Whether the inventory contains at least one output
    pub fn has_any(&self) -> bool {
        !self.utxos.is_empty()
    }

    /// Whether the inventory contains at least one spendable output
    pub fn has_free(&self) -> bool {
        self.utxos.iter().any(UnspentOutput::is_free)
    }

    /// Number of outputs
    pub fn count(&self) -> usize {
        self.utxos.len()
    }

    /// Total value of the outputs with the given status, or of every output with `None`
    pub fn total_value(&self, status: Option<UtxoStatus>) -> u64 {
        self.utxos
            .iter()
            .filter(|utxo| status.map_or(true, |status| utxo.status == status))
            .map(UnspentOutput::value)
            .sum()
    }

    /// Look up an output by outpoint
    pub fn find(&self, outpoint: &OutPoint) -> Option<&UnspentOutput> {
        self.index.get(outpoint).map(|&pos| &self.utxos[pos])
    }

    /// Iterate over the outputs in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, UnspentOutput> {
        self.utxos.iter()
    }

    /// Outputs in insertion order
    pub fn as_slice(&self) -> &[UnspentOutput] {
        &self.utxos
    }

    /// Select free outputs, largest first, until `target` is covered
    ///
    /// When `allow_multiple_inputs` is `false` the largest free output alone has to cover
    /// `target`. The returned inventory keeps the selection order.
    pub fn select_covering(&self, target: u64, allow_multiple_inputs: bool) -> Result<Self, Error> {
        self.select_with(
            &LargestFirstCoinSelection,
            target,
            allow_multiple_inputs,
            SelectionScope::FreeOnly,
        )
    }

    /// Select outputs within `scope` using a custom coin selection algorithm
    pub fn select_with<Cs: CoinSelectionAlgorithm + ?Sized>(
        &self,
        coin_selection: &Cs,
        target: u64,
        allow_multiple_inputs: bool,
        scope: SelectionScope,
    ) -> Result<Self, Error> {
        let candidates = self
            .utxos
            .iter()
            .filter(|utxo| scope == SelectionScope::Any || utxo.is_free())
            .cloned()
            .collect::<Vec<_>>();

        let result = coin_selection.coin_select(candidates, target, allow_multiple_inputs)?;
        debug!(
            "Selected {} outputs worth {} sat to cover {} sat",
            result.selected.len(),
            result.selected_amount,
            target
        );

        Inventory::from_utxos(result.selected)
    }

    /// Change the status of an output
    ///
    /// Setting the status an output already has is a no-op.
    pub fn mark(&mut self, outpoint: &OutPoint, status: UtxoStatus) -> Result<(), Error> {
        let pos = *self
            .index
            .get(outpoint)
            .ok_or(Error::UnknownUtxo(*outpoint))?;
        let utxo = &mut self.utxos[pos];
        if utxo.status != status {
            trace!("{} {:?} -> {:?}", outpoint, utxo.status, status);
            utxo.status = status;
        }

        Ok(())
    }

    /// Make an output spendable again
    ///
    /// This is the only way out of [`UtxoStatus::Hold`]. Call it once a transaction that used
    /// the output has been abandoned for good.
    pub fn release(&mut self, outpoint: &OutPoint) -> Result<(), Error> {
        self.mark(outpoint, UtxoStatus::Free)
    }

    /// Make every output spendable again
    pub fn release_all(&mut self) {
        for utxo in self.utxos.iter_mut() {
            utxo.status = UtxoStatus::Free;
        }
    }

    /// Keep only the outputs for which `f` returns `true`, preserving their order
    pub fn retain<F: FnMut(&UnspentOutput) -> bool>(&mut self, f: F) {
        self.utxos.retain(f);
        self.index = self
            .utxos
            .iter()
            .enumerate()
            .map(|(pos, utxo)| (utxo.outpoint, pos))
            .collect();
    }

    /// Remove every output
    pub fn clear(&mut self) {
        self.utxos.clear();
        self.index.clear();
    }

    /// Split the value of a single free output into `target_count` shares
    ///
    /// The largest free output worth at least `target_count * min_share` is picked. `reserve`
    /// satoshis are held back from its value, then every share gets
    /// `min(min_share, usable / target_count)` and the last one absorbs what remains. The shares
    /// always add up to `value - reserve`; they are all zero when the reserve eats the whole
    /// value.
    pub fn partition(
        &self,
        target_count: usize,
        min_share: u64,
        reserve: u64,
    ) -> Result<Partition, Error> {
        if target_count == 0 {
            return Err(Error::Generic(
                "Cannot partition an output into zero shares".into(),
            ));
        }

        let count = target_count as u64;
        let needed = count.saturating_mul(min_share);
        let source = self
            .utxos
            .iter()
            .filter(|utxo| utxo.is_free() && utxo.value() >= needed)
            .fold(None, |best: Option<&UnspentOutput>, utxo| match best {
                Some(best) if best.value() >= utxo.value() => Some(best),
                _ => Some(utxo),
            })
            .ok_or_else(|| Error::InsufficientFunds {
                needed,
                available: self
                    .utxos
                    .iter()
                    .filter(|utxo| utxo.is_free())
                    .map(UnspentOutput::value)
                    .max()
                    .unwrap_or(0),
            })?;

        let usable = source.value().saturating_sub(reserve);
        let share = std::cmp::min(min_share, usable / count);
        let mut shares = vec![share; target_count];
        shares[target_count - 1] = usable - share * (count - 1);

        debug!(
            "Partition of {} ({} sat) into {} shares of {} sat",
            source.outpoint,
            source.value(),
            target_count,
            share
        );

        Ok(Partition {
            source: source.clone(),
            shares,
        })
    }
}

impl<'a> IntoIterator for &'a Inventory {
    type Item = &'a UnspentOutput;
    type IntoIter = std::slice::Iter<'a, UnspentOutput>;

    fn into_iter(self) -> Self::IntoIter {
        self.utxos.iter()
    }
}

impl IntoIterator for Inventory {
    type Item = UnspentOutput;
    type IntoIter = std::vec::IntoIter<UnspentOutput>;

    fn into_iter(self) -> Self::IntoIter {
        self.utxos.into_iter()
    }
}
