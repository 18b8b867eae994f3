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

//! Chain indexes
//!
//! This module defines the [`UtxoIndex`] trait, used by the [`Wallet`](crate::wallet::Wallet)
//! to discover the outputs paying to its address and to broadcast transactions.
//!
//! The following implementations are available:
//!
//! - [`OfflineIndex`]: knows nothing and broadcasts nothing
//! - [`MemoryIndex`]: serves a fixed set of outputs and records broadcasts
//! - [`WhatsOnChainIndex`]: queries a WhatsOnChain-compatible REST API (requires the `woc`
//!   feature)

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

use bitcoin::{Address, Transaction, Txid};

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::error::Error;
use crate::types::IndexedUtxo;

#[cfg(feature = "woc")]
#[cfg_attr(docsrs, doc(cfg(feature = "woc")))]
pub mod woc;
#[cfg(feature = "woc")]
#[cfg_attr(docsrs, doc(cfg(feature = "woc")))]
pub use self::woc::WhatsOnChainIndex;

/// Trait that defines the actions that must be supported by a chain index
#[maybe_async]
pub trait UtxoIndex {
    /// Return the unspent outputs paying to `address`
    fn get_utxos_for(&self, address: &Address) -> Result<Vec<IndexedUtxo>, Error>;
    /// Broadcast a transaction
    fn broadcast(&self, tx: &Transaction) -> Result<Txid, Error>;
}

/// Chain index that never reaches the network
///
/// Every lookup returns no outputs and broadcasting fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineIndex;

#[maybe_async]
impl UtxoIndex for OfflineIndex {
    fn get_utxos_for(&self, _address: &Address) -> Result<Vec<IndexedUtxo>, Error> {
        Ok(vec![])
    }

    fn broadcast(&self, _tx: &Transaction) -> Result<Txid, Error> {
        Err(Error::Generic("Offline index cannot broadcast".into()))
    }
}

/// In-memory chain index
///
/// Serves the outputs registered with [`MemoryIndex::add_utxos`] and keeps every broadcasted
/// transaction.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    utxos: HashMap<String, Vec<IndexedUtxo>>,
    broadcasted: Mutex<Vec<Transaction>>,
}

impl MemoryIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Register outputs paying to `address`
    pub fn add_utxos(&mut self, address: &Address, utxos: Vec<IndexedUtxo>) {
        self.utxos
            .entry(address.to_string())
            .or_insert_with(Vec::new)
            .extend(utxos);
    }

    /// Transactions broadcasted so far, oldest first
    pub fn broadcasted(&self) -> Result<Vec<Transaction>, Error> {
        self.broadcasted
            .lock()
            .map(|txs| txs.clone())
            .map_err(|_| Error::Generic("Broadcast log poisoned".into()))
    }
}

#[maybe_async]
impl UtxoIndex for MemoryIndex {
    fn get_utxos_for(&self, address: &Address) -> Result<Vec<IndexedUtxo>, Error> {
        let utxos = self
            .utxos
            .get(&address.to_string())
            .cloned()
            .unwrap_or_default();
        debug!("{} outputs for {}", utxos.len(), address);

        Ok(utxos)
    }

    fn broadcast(&self, tx: &Transaction) -> Result<Txid, Error> {
        self.broadcasted
            .lock()
            .map_err(|_| Error::Generic("Broadcast log poisoned".into()))?
            .push(tx.clone());

        Ok(tx.txid())
    }
}

#[maybe_async]
impl<T: UtxoIndex> UtxoIndex for Arc<T> {
    fn get_utxos_for(&self, address: &Address) -> Result<Vec<IndexedUtxo>, Error> {
        maybe_await!(self.deref().get_utxos_for(address))
    }

    fn broadcast(&self, tx: &Transaction) -> Result<Txid, Error> {
        maybe_await!(self.deref().broadcast(tx))
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;
    use crate::wallet::signer::KeyPair;

    fn get_test_address() -> Address {
        KeyPair::from_wif("cVt4o7BGAig1UXywgGSmARhxMdzP5qvQsxKkSsc1XEkw3tDTQFpy")
            .unwrap()
            .address()
    }

    fn get_test_tx() -> Transaction {
        Transaction {
            version: 1,
            lock_time: 0,
            input: vec![],
            output: vec![],
        }
    }

    #[test]
    fn test_offline_index() {
        let index = OfflineIndex;

        assert!(index.get_utxos_for(&get_test_address()).unwrap().is_empty());
        assert!(index.broadcast(&get_test_tx()).is_err());
    }

    #[test]
    fn test_memory_index() {
        let address = get_test_address();
        let txid =
            Txid::from_str("1aebb7d0776cec663cbbdd87f200bf15406adb0ef91916d102bcd7f86c86934e")
                .unwrap();
        let utxo = IndexedUtxo {
            value: 1_000,
            txid,
            vout: 3,
        };

        let mut index = MemoryIndex::new();
        index.add_utxos(&address, vec![utxo]);
        index.add_utxos(&address, vec![IndexedUtxo { vout: 4, ..utxo }]);

        let utxos = index.get_utxos_for(&address).unwrap();
        assert_eq!(utxos.len(), 2);
        assert_eq!(utxos[0], utxo);

        let shared = Arc::new(index);
        let tx = get_test_tx();
        assert_eq!(shared.broadcast(&tx).unwrap(), tx.txid());
        assert_eq!(shared.broadcasted().unwrap(), vec![tx]);
    }
}
