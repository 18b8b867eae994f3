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

//! Coin selection
//!
//! This module provides the trait [`CoinSelectionAlgorithm`] that can be implemented to
//! define custom coin selection algorithms.
//!
//! The wallet funds every spend through one algorithm, [`DefaultCoinSelectionAlgorithm`]
//! unless another one is set with [`Wallet::set_coin_selection`](super::Wallet::set_coin_selection).
//!
//! Fees are not part of the selection: streamed transactions are extended by their recipient
//! before broadcast, so the amount needed is exactly the amount committed by the wallet.
//!
//! ## Example
//!
//! ```
//! # use streamwallet::wallet::coin_selection::*;
//! # use streamwallet::*;
//! #[derive(Debug)]
//! struct AlwaysSpendEverything;
//!
//! impl CoinSelectionAlgorithm for AlwaysSpendEverything {
//!     fn coin_select(
//!         &self,
//!         may_use_utxos: Vec<UnspentOutput>,
//!         amount_needed: u64,
//!         _allow_multiple_inputs: bool,
//!     ) -> Result<CoinSelectionResult, streamwallet::Error> {
//!         let selected_amount = may_use_utxos.iter().map(|u| u.value()).sum();
//!         if selected_amount < amount_needed {
//!             return Err(streamwallet::Error::InsufficientFunds {
//!                 needed: amount_needed,
//!                 available: selected_amount,
//!             });
//!         }
//!
//!         Ok(CoinSelectionResult {
//!             selected: may_use_utxos,
//!             selected_amount,
//!         })
//!     }
//! }
//! ```

use std::cmp::Reverse;

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::error::Error;
use crate::types::UnspentOutput;

/// Default coin selection algorithm used by the [`Wallet`](super::Wallet) if not overridden
pub type DefaultCoinSelectionAlgorithm = LargestFirstCoinSelection;

/// Result of a successful coin selection
#[derive(Debug)]
pub struct CoinSelectionResult {
    /// List of outputs selected for use as inputs, in input order
    pub selected: Vec<UnspentOutput>,
    /// Sum of the selected outputs' value
    pub selected_amount: u64,
}

/// Trait for generalized coin selection algorithms
///
/// This trait can be implemented to make the [`Wallet`](super::Wallet) use a customized coin
/// selection algorithm when it funds transactions.
///
/// For an example see [this module](crate::wallet::coin_selection)'s documentation.
pub trait CoinSelectionAlgorithm: std::fmt::Debug {
    /// Perform the coin selection
    ///
    /// - `may_use_utxos`: the outputs that may be spent to satisfy `amount_needed`, in the
    ///                    inventory's insertion order
    /// - `amount_needed`: the amount in satoshi to select
    /// - `allow_multiple_inputs`: when `false` a single output has to cover `amount_needed`
    fn coin_select(
        &self,
        may_use_utxos: Vec<UnspentOutput>,
        amount_needed: u64,
        allow_multiple_inputs: bool,
    ) -> Result<CoinSelectionResult, Error>;
}

/// Simple and dumb coin selection
///
/// This coin selection algorithm sorts the available UTXOs by value and then picks them starting
/// from the largest ones until the required amount is reached. Outputs of equal value keep their
/// relative order.
#[derive(Debug, Default, Clone, Copy)]
pub struct LargestFirstCoinSelection;

impl CoinSelectionAlgorithm for LargestFirstCoinSelection {
    fn coin_select(
        &self,
        mut may_use_utxos: Vec<UnspentOutput>,
        amount_needed: u64,
        allow_multiple_inputs: bool,
    ) -> Result<CoinSelectionResult, Error> {
        debug!(
            "amount_needed = `{}`, candidates = `{}`",
            amount_needed,
            may_use_utxos.len()
        );

        may_use_utxos.sort_by_key(|utxo| Reverse(utxo.value()));

        select_sorted_utxos(may_use_utxos, amount_needed, allow_multiple_inputs)
    }
}

/// OldestFirstCoinSelection always picks the utxo that entered the inventory first
#[derive(Debug, Default, Clone, Copy)]
pub struct OldestFirstCoinSelection;

impl CoinSelectionAlgorithm for OldestFirstCoinSelection {
    fn coin_select(
        &self,
        may_use_utxos: Vec<UnspentOutput>,
        amount_needed: u64,
        allow_multiple_inputs: bool,
    ) -> Result<CoinSelectionResult, Error> {
        select_sorted_utxos(may_use_utxos, amount_needed, allow_multiple_inputs)
    }
}

fn select_sorted_utxos(
    utxos: Vec<UnspentOutput>,
    amount_needed: u64,
    allow_multiple_inputs: bool,
) -> Result<CoinSelectionResult, Error> {
    let available = if allow_multiple_inputs {
        utxos.iter().map(UnspentOutput::value).sum()
    } else {
        utxos.first().map(UnspentOutput::value).unwrap_or(0)
    };
    if available < amount_needed {
        return Err(Error::InsufficientFunds {
            needed: amount_needed,
            available,
        });
    }

    // Keep including inputs until we've got enough.
    let mut selected_amount = 0;
    let selected = utxos
        .into_iter()
        .scan(&mut selected_amount, |selected_amount, utxo| {
            if **selected_amount < amount_needed {
                **selected_amount += utxo.value();
                trace!(
                    "Selected {}, selected_amount = `{}`",
                    utxo.outpoint,
                    selected_amount
                );
                Some(utxo)
            } else {
                None
            }
        })
        .collect::<Vec<_>>();

    Ok(CoinSelectionResult {
        selected,
        selected_amount,
    })
}
