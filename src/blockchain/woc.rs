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

//! WhatsOnChain
//!
//! This module defines a [`UtxoIndex`] struct that queries a WhatsOnChain-compatible REST API
//! for the outputs of an address and broadcasts raw transactions through it.
//!
//! ## Example
//!
//! ```no_run
//! # use streamwallet::blockchain::woc::WhatsOnChainIndex;
//! let index = WhatsOnChainIndex::new("https://api.whatsonchain.com/v1/bsv/main");
//! # Ok::<(), streamwallet::Error>(())
//! ```

use std::fmt;

use bitcoin::{Address, Transaction, Txid};
#[allow(unused_imports)]
use log::{debug, error, info, trace};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::IndexedUtxo;
use crate::wallet::utils::serialize_legacy_hex;

use super::*;

#[derive(Debug)]
struct UrlClient {
    url: String,
    // We use the async client instead of the blocking one because it automatically uses `fetch`
    // when the target platform is wasm32.
    client: Client,
}

/// Chain index backed by a WhatsOnChain-compatible service
///
/// ## Example
/// See the [`blockchain::woc`](crate::blockchain::woc) module for a usage example.
#[derive(Debug)]
pub struct WhatsOnChainIndex {
    url_client: UrlClient,
}

impl WhatsOnChainIndex {
    /// Create a new instance of the client from a base URL
    ///
    /// The base URL includes the chain and network, eg. `https://api.whatsonchain.com/v1/bsv/main`.
    pub fn new(base_url: &str) -> Self {
        WhatsOnChainIndex {
            url_client: UrlClient {
                url: base_url.trim_end_matches('/').to_string(),
                client: Client::new(),
            },
        }
    }

    /// Create a new instance of the client from a configuration
    pub fn from_config(config: &WhatsOnChainConfig) -> Self {
        WhatsOnChainIndex::new(&config.base_url)
    }
}

#[maybe_async]
impl UtxoIndex for WhatsOnChainIndex {
    fn get_utxos_for(&self, address: &Address) -> Result<Vec<IndexedUtxo>, Error> {
        Ok(await_or_block!(self.url_client._get_utxos(address))?)
    }

    fn broadcast(&self, tx: &Transaction) -> Result<Txid, Error> {
        Ok(await_or_block!(self.url_client._broadcast(tx))?)
    }
}

impl UrlClient {
    async fn _get_utxos(&self, address: &Address) -> Result<Vec<IndexedUtxo>, WocError> {
        let utxos = self
            .client
            .get(&format!("{}/address/{}/unspent", self.url, address))
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<WocUnspent>>()
            .await?;

        debug!("Found {} unspent outputs for {}", utxos.len(), address);

        Ok(utxos.into_iter().map(IndexedUtxo::from).collect())
    }

    async fn _broadcast(&self, transaction: &Transaction) -> Result<Txid, WocError> {
        let txid = self
            .client
            .post(&format!("{}/tx/raw", self.url))
            .json(&WocRawTx {
                txhex: serialize_legacy_hex(transaction),
            })
            .send()
            .await?
            .error_for_status()?
            .json::<Txid>()
            .await?;

        if txid != transaction.txid() {
            return Err(WocError::TxidMismatch(txid));
        }

        Ok(txid)
    }
}

#[derive(Deserialize)]
struct WocUnspent {
    tx_hash: Txid,
    tx_pos: u32,
    value: u64,
}

impl From<WocUnspent> for IndexedUtxo {
    fn from(unspent: WocUnspent) -> Self {
        IndexedUtxo {
            value: unspent.value,
            txid: unspent.tx_hash,
            vout: unspent.tx_pos,
        }
    }
}

#[derive(Serialize)]
struct WocRawTx {
    txhex: String,
}

/// Configuration for a [`WhatsOnChainIndex`]
#[derive(Debug, serde::Deserialize, serde::Serialize, Clone, PartialEq)]
pub struct WhatsOnChainConfig {
    /// Base URL of the service
    ///
    /// eg. `https://api.whatsonchain.com/v1/bsv/main`
    pub base_url: String,
}

/// Errors that can happen while talking to a [`WhatsOnChainIndex`]
#[derive(Debug)]
pub enum WocError {
    /// Error with the HTTP call
    Reqwest(reqwest::Error),
    /// The service accepted the transaction under another id
    TxidMismatch(Txid),
}

impl fmt::Display for WocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for WocError {}

impl_error!(reqwest::Error, Reqwest, WocError);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_unspent() {
        let body = r#"[
            {
                "height": 663042,
                "tx_pos": 1,
                "tx_hash": "1aebb7d0776cec663cbbdd87f200bf15406adb0ef91916d102bcd7f86c86934e",
                "value": 2987
            }
        ]"#;
        let utxos = serde_json::from_str::<Vec<WocUnspent>>(body)
            .unwrap()
            .into_iter()
            .map(IndexedUtxo::from)
            .collect::<Vec<_>>();

        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].value, 2_987);
        assert_eq!(utxos[0].vout, 1);
        assert_eq!(
            utxos[0].txid.to_string(),
            "1aebb7d0776cec663cbbdd87f200bf15406adb0ef91916d102bcd7f86c86934e"
        );
    }

    #[test]
    fn test_base_url() {
        let index = WhatsOnChainIndex::from_config(&WhatsOnChainConfig {
            base_url: "https://api.whatsonchain.com/v1/bsv/test/".into(),
        });

        assert_eq!(
            index.url_client.url,
            "https://api.whatsonchain.com/v1/bsv/test"
        );
    }
}
