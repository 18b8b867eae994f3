// Magical Bitcoin Library
// Written in 2020 by
//     Alekos Filini <alekos.filini@gmail.com>
//
// Copyright (c) 2020 Magical Bitcoin
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Funding engine for streaming payments
//!
//! A payer streams value to a payee by handing over successive versions of a transaction, each
//! one spending the same outputs for a larger amount. The wallet inputs are signed with
//! `SIGHASH_SINGLE | ANYONECANPAY | FORKID`, so every signature only vouches for the change
//! output across from its input and the payee is free to add inputs and outputs of its own.
//!
//! The crate keeps the [`Inventory`] of outputs locked to the wallet key, tracks which of them
//! are committed to an in-flight transaction, selects the largest outputs first and builds and
//! signs the transactions.
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
//! wallet.add_utxo(UnspentOutput::new(3_000, script, txid, 0))?;
//!
//! let first = wallet.streaming_spend(1_000, None, true, None)?;
//! let second = wallet.streaming_spend(1_500, None, true, Some(first.inventory))?;
//!
//! assert_eq!(wallet.funding_of(&second.transaction), 1_500);
//! assert_eq!(wallet.spendable_balance(), 0);
//! # Ok::<_, streamwallet::Error>(())
//! ```
//!
//! ## Features
//!
//! - `woc`: enables [`blockchain::woc`], a chain index backed by a WhatsOnChain-compatible
//!   REST API
//! - `async-interface`: makes the chain index trait and the wallet methods that use it `async`

// only enables the `doc_cfg` feature when
// the `docsrs` configuration attribute is defined
#![cfg_attr(docsrs, feature(doc_cfg))]

pub extern crate bitcoin;
extern crate log;
extern crate serde;
extern crate serde_json;

#[cfg(any(target_arch = "wasm32", feature = "async-interface"))]
#[macro_use]
extern crate async_trait;
#[macro_use]
extern crate bdk_macros;

#[cfg(feature = "woc")]
pub extern crate reqwest;

#[macro_use]
pub(crate) mod error;
pub mod blockchain;
pub mod inventory;
pub(crate) mod types;
pub mod wallet;

pub use error::Error;
pub use inventory::{Inventory, Partition, SelectionScope};
pub use types::*;
pub use wallet::coin_selection;
pub use wallet::sighash::SighashPolicy;
pub use wallet::signer;
pub use wallet::signer::KeyPair;
pub use wallet::tx_builder::TxBuilder;
pub use wallet::{OfflineWallet, StreamingTx, Wallet, WalletConfig};
