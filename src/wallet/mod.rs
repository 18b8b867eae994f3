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

//! Wallet
//!
//! This module defines the [`Wallet`] structure, the funding engine of a payment stream.
//!
//! A streamed transaction is built by the payer, signed so that every wallet input only vouches
//! for the output across from it, and handed to the payee. The payee can then append its own
//! inputs and outputs before broadcasting without invalidating the payer's signatures. Each new
//! round of the stream is a new transaction spending the same outputs for a larger amount, so
//! the outputs a stream uses stay on hold until they are explicitly released.
//!
//! ## Example
//!
//! ```
//! # use std::str::FromStr;
//! # use streamwallet::bitcoin::Txid;
//! # use streamwallet::*;
//! let mut wallet = OfflineWallet::new_offline(WalletConfig::default());
//! wallet.generate_key()?;
//!
//! let script = wallet.address()?.script_pubkey();
//! let txid = Txid::from_str("1aebb7d0776cec663cbbdd87f200bf15406adb0ef91916d102bcd7f86c86934e")?;
//! wallet.add_utxo(UnspentOutput::new(2_000, script.clone(), txid, 0))?;
//! wallet.add_utxo(UnspentOutput::new(1_000, script, txid, 1))?;
//!
//! let stream = wallet.streaming_spend(2_500, None, true, None)?;
//! assert_eq!(stream.transaction.input.len(), 2);
//! assert_eq!(wallet.funding_of(&stream.transaction), 2_500);
//! # Ok::<_, streamwallet::Error>(())
//! ```

use std::str::FromStr;

use bitcoin::{Address, Network, OutPoint, PublicKey, Script, Transaction, Txid};

use serde::{Deserialize, Serialize};

#[allow(unused_imports)]
use log::{debug, error, info, trace};

pub mod coin_selection;
pub mod sighash;
pub mod signer;
pub mod time;
pub mod tx_builder;
pub(crate) mod utils;

use coin_selection::{CoinSelectionAlgorithm, DefaultCoinSelectionAlgorithm};
use sighash::SighashPolicy;
use signer::KeyPair;
use tx_builder::TxBuilder;
use utils::{change_slots, serialize_legacy_hex};

use crate::blockchain::{OfflineIndex, UtxoIndex};
use crate::error::Error;
use crate::inventory::{Inventory, SelectionScope};
use crate::types::*;

/// Satoshis held back from a split, on top of the dust limit, to pay for the split transaction
pub const SPLIT_FEE_ALLOWANCE: u64 = 50;

/// Default minimum value of the outputs a stream commits to
pub const DEFAULT_DUST_LIMIT: u64 = 500;

/// Default delay, in seconds, before an extendable transaction settles
pub const DEFAULT_SETTLEMENT_WINDOW: u32 = 60 * 60;

fn default_network() -> Network {
    Network::Bitcoin
}

mod serde_network {
    use std::str::FromStr;

    use bitcoin::Network;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(network: &Network, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&network.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Network, D::Error> {
        let network = String::deserialize(deserializer)?;
        Network::from_str(&network).map_err(de::Error::custom)
    }
}

/// Tunables of a [`Wallet`]
///
/// Every field is optional when deserializing, missing ones take their default value.
///
/// ```
/// # use streamwallet::bitcoin::Network;
/// # use streamwallet::WalletConfig;
/// let config: WalletConfig = r#"{"network": "testnet", "dust_limit": 600}"#.parse()?;
///
/// assert_eq!(config.network, Network::Testnet);
/// assert!(config.allow_multiple_inputs);
/// # Ok::<_, streamwallet::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Network of the generated keys
    #[serde(with = "serde_network")]
    pub network: Network,
    /// Minimum value of the outputs a stream commits to, besides the first one
    pub dust_limit: u64,
    /// Whether a stream may combine more than one output to cover its amount
    pub allow_multiple_inputs: bool,
    /// Whether a stream may be opened without any funding
    pub allow_zero_funding: bool,
    /// Delay in seconds before an extendable transaction settles
    pub settlement_window: u32,
}

impl Default for WalletConfig {
    fn default() -> Self {
        WalletConfig {
            network: default_network(),
            dust_limit: DEFAULT_DUST_LIMIT,
            allow_multiple_inputs: true,
            allow_zero_funding: false,
            settlement_window: DEFAULT_SETTLEMENT_WINDOW,
        }
    }
}

impl FromStr for WalletConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}

/// A round of a payment stream, as returned by [`Wallet::streaming_spend`]
#[derive(Debug, Clone, PartialEq)]
pub struct StreamingTx {
    /// The signed transaction
    pub transaction: Transaction,
    /// Consensus serialization of `transaction` in the pre-segwit layout, hex encoded
    pub hex: String,
    /// Inputs and outputs of `transaction` funded by the wallet
    pub boundary: FundingBoundary,
    /// The inventory the round was funded from, with the committed outputs on hold
    ///
    /// Pass it back to the next [`Wallet::streaming_spend`] call to grow the same stream.
    pub inventory: Inventory,
}

impl StreamingTx {
    /// Transaction id
    pub fn txid(&self) -> Txid {
        self.transaction.txid()
    }
}

/// Type alias for a [`Wallet`] that never reaches a chain index
pub type OfflineWallet = Wallet<OfflineIndex>;

/// A wallet funding payment streams from a single key
///
/// The wallet owns an [`Inventory`] of the outputs locked to its key. Outputs committed to a
/// transaction are put on hold and are only offered again after [`Wallet::release`] or
/// [`Wallet::release_all`]: a transaction handed to a counterparty may still be broadcast at any
/// time, so the wallet never releases anything on its own.
#[derive(Debug)]
pub struct Wallet<I: UtxoIndex> {
    keys: Option<KeyPair>,
    inventory: Inventory,
    config: WalletConfig,
    coin_selection: Box<dyn CoinSelectionAlgorithm>,

    last_tx: Option<Transaction>,
    boundary: FundingBoundary,

    index: I,
}

impl Wallet<OfflineIndex> {
    /// Create a wallet without a chain index
    pub fn new_offline(config: WalletConfig) -> Self {
        Wallet::new(OfflineIndex, config)
    }
}

// offline actions, always available
impl<I> Wallet<I>
where
    I: UtxoIndex,
{
    /// Create a wallet that looks up its outputs with `index`
    ///
    /// No key is loaded, use [`Wallet::load_key`] or [`Wallet::generate_key`] before spending.
    pub fn new(index: I, config: WalletConfig) -> Self {
        Wallet {
            keys: None,
            inventory: Inventory::new(),
            config,
            coin_selection: Box::new(DefaultCoinSelectionAlgorithm::default()),

            last_tx: None,
            boundary: FundingBoundary::default(),

            index,
        }
    }

    /// Replace the coin selection algorithm used to fund transactions
    pub fn set_coin_selection<Cs: CoinSelectionAlgorithm + 'static>(
        mut self,
        coin_selection: Cs,
    ) -> Self {
        self.coin_selection = Box::new(coin_selection);
        self
    }

    /// Load a key in wallet import format, or generate a fresh one if `wif` is `None`
    pub fn load_key(&mut self, wif: Option<&str>) -> Result<&KeyPair, Error> {
        let keys = match wif {
            Some(wif) => KeyPair::from_wif(wif)?,
            None => KeyPair::generate(self.config.network)?,
        };
        info!("Loaded key for {}", keys.address());

        Ok(self.keys.insert(keys))
    }

    /// Replace the key with a freshly generated one and return its public key
    pub fn generate_key(&mut self) -> Result<PublicKey, Error> {
        let public_key = *self.load_key(None)?.public_key();

        Ok(public_key)
    }

    /// Key material, if loaded
    pub fn keys(&self) -> Option<&KeyPair> {
        self.keys.as_ref()
    }

    /// Address the wallet receives on
    pub fn address(&self) -> Result<Address, Error> {
        self.keys
            .as_ref()
            .map(KeyPair::address)
            .ok_or(Error::KeyNotLoaded)
    }

    /// Configuration of the wallet
    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// Chain index of the wallet
    pub fn index(&self) -> &I {
        &self.index
    }

    /// The outputs the wallet can spend, with their status
    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Replace the whole inventory
    pub fn set_inventory(&mut self, inventory: Inventory) {
        self.inventory = inventory;
    }

    /// Record an output the wallet can spend, e.g. an incoming payment
    pub fn add_utxo(&mut self, utxo: UnspentOutput) -> Result<(), Error> {
        self.inventory.add(utxo)
    }

    /// Make an output on hold spendable again
    pub fn release(&mut self, outpoint: &OutPoint) -> Result<(), Error> {
        self.inventory.release(outpoint)
    }

    /// Make every output spendable again
    pub fn release_all(&mut self) {
        self.inventory.release_all()
    }

    /// Forget every output
    pub fn clear(&mut self) {
        self.inventory.clear()
    }

    /// Total value of the inventory, committed outputs included
    pub fn balance(&self) -> u64 {
        self.inventory.total_value(None)
    }

    /// Value of the outputs that are not committed to any transaction
    pub fn spendable_balance(&self) -> u64 {
        self.inventory.total_value(Some(UtxoStatus::Free))
    }

    /// Last transaction built by the wallet
    pub fn last_transaction(&self) -> Option<&Transaction> {
        self.last_tx.as_ref()
    }

    /// Funding boundary of the last streamed transaction
    pub fn funding_boundary(&self) -> FundingBoundary {
        self.boundary
    }

    /// Net value the wallet committed to `tx`, according to the last funding boundary
    ///
    /// See [`FundingBoundary::funding_of`].
    pub fn funding_of(&self, tx: &Transaction) -> i64 {
        self.boundary.funding_of(tx, &self.inventory)
    }

    /// Make sure the inventory has something to offer
    ///
    /// When no output is free the chain index is asked for the outputs paying to the wallet
    /// address. Outputs already in the inventory are left untouched. Fails with
    /// [`Error::NoFundsAvailable`] if the inventory is still empty afterwards.
    #[maybe_async]
    pub fn ensure_inventory(&mut self) -> Result<(), Error> {
        let keys = self.keys.as_ref().ok_or(Error::KeyNotLoaded)?;
        if self.inventory.has_free() {
            return Ok(());
        }

        let address = keys.address();
        let script_pubkey = keys.output_script();
        debug!("No free outputs, querying the chain index for {}", address);

        let utxos = maybe_await!(self.index.get_utxos_for(&address))?;
        let mut added = 0;
        for utxo in utxos {
            let utxo = UnspentOutput::new(utxo.value, script_pubkey.clone(), utxo.txid, utxo.vout);
            if self.inventory.find(&utxo.outpoint).is_none() {
                self.inventory.add(utxo)?;
                added += 1;
            }
        }
        debug!("Added {} outputs to the inventory", added);

        if !self.inventory.has_any() {
            return Err(Error::NoFundsAvailable);
        }

        Ok(())
    }

    /// Pay `amount` with a final, fully signed transaction
    ///
    /// The first output pays `amount` to `destination`, or back to the wallet if `None`. The
    /// remainder, if any, goes back to the wallet in a second output. The spent outputs are put
    /// on hold.
    #[maybe_async]
    pub fn simple_spend(
        &mut self,
        amount: u64,
        destination: Option<Script>,
    ) -> Result<SignedTransaction, Error> {
        if self.keys.is_none() {
            return Err(Error::KeyNotLoaded);
        }
        if amount == 0 {
            return Err(Error::Generic("Cannot spend zero satoshis".into()));
        }
        maybe_await!(self.ensure_inventory())?;

        let keys = self.keys.as_ref().ok_or(Error::KeyNotLoaded)?;
        let selected = self.inventory.select_with(
            self.coin_selection.as_ref(),
            amount,
            self.config.allow_multiple_inputs,
            SelectionScope::FreeOnly,
        )?;
        let change = selected.total_value(None) - amount;

        let own_script = keys.output_script();
        let mut builder = TxBuilder::new();
        for utxo in &selected {
            builder.add_input(utxo, SighashPolicy::All);
        }
        builder.add_output(amount, destination.unwrap_or_else(|| own_script.clone()));
        if change > 0 {
            builder.add_output(change, own_script);
        }
        let tx = builder.build_and_sign(keys)?;

        for utxo in &selected {
            self.inventory.mark(&utxo.outpoint, UtxoStatus::Hold)?;
        }
        info!(
            "Spent {} sat in {} with {} sat of change",
            amount,
            tx.txid(),
            change
        );

        self.last_tx = Some(tx.clone());
        Ok(tx.into())
    }

    /// Build one round of a payment stream worth `amount`
    ///
    /// Outputs are picked from `inventory_override` when given, otherwise from the free outputs
    /// of the wallet. An override is the inventory returned by a previous round of the same
    /// stream: the outputs it already committed can be picked again even though they are on
    /// hold, so the stream grows without double counting.
    ///
    /// Every picked output becomes an input. The change is returned to the wallet in outputs
    /// paired by index with the first inputs, the first one taking the bulk and the next ones
    /// exactly the dust limit. Paired inputs are signed
    /// [`SighashPolicy::SinglePairedAnyoneCanPay`], the others
    /// [`SighashPolicy::NoneAnyoneCanPay`]. The optional `destination` output, worth `amount`,
    /// comes last and is not covered by any signature.
    ///
    /// An `extendable` transaction is locked until the settlement window of the wallet elapses,
    /// with non-final sequences. The picked outputs are put on hold, both in the returned
    /// inventory and in the wallet's own.
    #[maybe_async]
    pub fn streaming_spend(
        &mut self,
        amount: u64,
        destination: Option<Script>,
        extendable: bool,
        inventory_override: Option<Inventory>,
    ) -> Result<StreamingTx, Error> {
        if self.keys.is_none() {
            return Err(Error::KeyNotLoaded);
        }
        if amount == 0 && !self.config.allow_zero_funding {
            return Err(Error::ZeroFundingNotAllowed);
        }

        let (mut working, scope) = match inventory_override {
            Some(mut inventory) => {
                // free entries another stream has committed since are no longer ours to take
                let own = &self.inventory;
                inventory.retain(|utxo| {
                    !utxo.is_free()
                        || own
                            .find(&utxo.outpoint)
                            .map_or(true, UnspentOutput::is_free)
                });
                (inventory, SelectionScope::Any)
            }
            None => {
                if amount > 0 {
                    maybe_await!(self.ensure_inventory())?;
                }
                (self.inventory.clone(), SelectionScope::FreeOnly)
            }
        };

        let keys = self.keys.as_ref().ok_or(Error::KeyNotLoaded)?;
        let selected = working.select_with(
            self.coin_selection.as_ref(),
            amount,
            self.config.allow_multiple_inputs,
            scope,
        )?;
        let funding_input_count = selected.count();
        let change = selected.total_value(None) - amount;
        let slots = change_slots(change, funding_input_count, self.config.dust_limit);

        let mut builder = TxBuilder::new();
        for (index, utxo) in selected.iter().enumerate() {
            let policy = if index < slots.len() {
                SighashPolicy::SinglePairedAnyoneCanPay
            } else {
                SighashPolicy::NoneAnyoneCanPay
            };
            builder.add_input(utxo, policy);
        }
        let own_script = keys.output_script();
        for value in &slots {
            builder.add_output(*value, own_script.clone());
        }
        if let Some(destination) = destination {
            builder.add_output(amount, destination);
        }
        if extendable {
            builder.set_deferred_settlement(Some(time::lock_time_after(
                self.config.settlement_window,
            )));
        }
        let tx = builder.build_and_sign(keys)?;

        for utxo in &selected {
            working.mark(&utxo.outpoint, UtxoStatus::Hold)?;
            match self.inventory.find(&utxo.outpoint) {
                Some(_) => self.inventory.mark(&utxo.outpoint, UtxoStatus::Hold)?,
                None => self.inventory.add(UnspentOutput {
                    status: UtxoStatus::Hold,
                    ..utxo.clone()
                })?,
            }
        }

        let boundary = FundingBoundary {
            funding_input_count,
            sender_output_count: slots.len(),
        };
        info!(
            "Streamed {} sat in {}: {} funding inputs, {} committed outputs",
            amount,
            tx.txid(),
            boundary.funding_input_count,
            boundary.sender_output_count
        );

        self.boundary = boundary;
        self.last_tx = Some(tx.clone());

        Ok(StreamingTx {
            hex: serialize_legacy_hex(&tx),
            transaction: tx,
            boundary,
            inventory: working,
        })
    }

    /// Split a single output into `target_count` outputs worth about `min_share` each
    ///
    /// The largest free output worth at least `target_count * min_share` is spent, `min_share`
    /// being raised to the dust limit. The dust limit plus [`SPLIT_FEE_ALLOWANCE`] is held back
    /// for the fee, then every output gets `min_share` and the last one takes the remainder.
    /// Returns `None` when the held back amount leaves nothing to split.
    #[maybe_async]
    pub fn split(
        &mut self,
        target_count: usize,
        min_share: u64,
    ) -> Result<Option<SignedTransaction>, Error> {
        maybe_await!(self.ensure_inventory())?;

        let keys = self.keys.as_ref().ok_or(Error::KeyNotLoaded)?;
        let min_share = std::cmp::max(min_share, self.config.dust_limit);
        let partition = self.inventory.partition(
            target_count,
            min_share,
            self.config.dust_limit + SPLIT_FEE_ALLOWANCE,
        )?;
        if partition.shares.iter().any(|share| *share == 0) {
            debug!("Nothing left to split in {}", partition.source.outpoint);
            return Ok(None);
        }

        let own_script = keys.output_script();
        let mut builder = TxBuilder::new();
        builder.add_input(&partition.source, SighashPolicy::All);
        for share in &partition.shares {
            builder.add_output(*share, own_script.clone());
        }
        let tx = builder.build_and_sign(keys)?;

        self.inventory
            .mark(&partition.source.outpoint, UtxoStatus::Hold)?;
        info!(
            "Split {} into {} outputs in {}",
            partition.source.outpoint,
            target_count,
            tx.txid()
        );

        self.last_tx = Some(tx.clone());
        Ok(Some(tx.into()))
    }

    /// Broadcast a transaction through the chain index
    #[maybe_async]
    pub fn broadcast(&self, tx: &Transaction) -> Result<Txid, Error> {
        maybe_await!(self.index.broadcast(tx))
    }
}
