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

use std::fmt;

use bitcoin::OutPoint;

/// Errors that can be thrown by the [`Wallet`](crate::wallet::Wallet)
#[derive(Debug)]
pub enum Error {
    /// Generic error
    Generic(String),
    /// An output with the same outpoint is already part of the inventory
    DuplicateEntry(OutPoint),
    /// Happens when trying to change the status of an output that is not in the inventory
    UnknownUtxo(OutPoint),
    /// The inventory can't cover the requested amount
    InsufficientFunds {
        /// Sats needed for some transaction
        needed: u64,
        /// Sats available for spending
        available: u64,
    },
    /// The inventory is still empty after querying the chain index
    NoFundsAvailable,
    /// A stream funded with zero satoshis was requested but the wallet doesn't allow it
    ZeroFundingNotAllowed,
    /// Spending requires key material, load or generate a key first
    KeyNotLoaded,
    /// An input signed `SIGHASH_SINGLE` has no output at its own index
    UnpairedInput(usize),

    /// Error parsing or handling a private key
    Key(bitcoin::util::key::Error),
    /// A secp256k1 error
    Secp256k1(bitcoin::secp256k1::Error),
    /// Hex decoding error
    Hex(bitcoin::hashes::hex::Error),
    /// Error serializing or deserializing JSON data
    Json(serde_json::Error),
    #[cfg(feature = "woc")]
    /// WhatsOnChain client error
    Woc(Box<crate::blockchain::woc::WocError>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic(err) => write!(f, "Generic error: {}", err),
            Self::DuplicateEntry(outpoint) => {
                write!(f, "Output already in the inventory: {}", outpoint)
            }
            Self::UnknownUtxo(outpoint) => write!(f, "Output not in the inventory: {}", outpoint),
            Self::InsufficientFunds { needed, available } => write!(
                f,
                "Insufficient funds: {} sat available of {} sat needed",
                available, needed
            ),
            Self::NoFundsAvailable => write!(f, "No spendable outputs available for the wallet"),
            Self::ZeroFundingNotAllowed => write!(f, "Zero funding is not allowed"),
            Self::KeyNotLoaded => write!(f, "Load a key before spending"),
            Self::UnpairedInput(index) => {
                write!(f, "Input {} signs a paired output that doesn't exist", index)
            }
            Self::Key(err) => write!(f, "Key error: {}", err),
            Self::Secp256k1(err) => write!(f, "Secp256k1 error: {}", err),
            Self::Hex(err) => write!(f, "Hex decoding error: {}", err),
            Self::Json(err) => write!(f, "Serialize/Deserialize JSON error: {}", err),
            #[cfg(feature = "woc")]
            Self::Woc(err) => write!(f, "WhatsOnChain client error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

macro_rules! impl_error {
    ( $from:ty, $to:ident ) => {
        impl_error!($from, $to, Error);
    };
    ( $from:ty, $to:ident, $impl_for:ty ) => {
        impl std::convert::From<$from> for $impl_for {
            fn from(err: $from) -> Self {
                <$impl_for>::$to(err)
            }
        }
    };
}

impl_error!(bitcoin::util::key::Error, Key);
impl_error!(bitcoin::secp256k1::Error, Secp256k1);
impl_error!(bitcoin::hashes::hex::Error, Hex);
impl_error!(serde_json::Error, Json);

#[cfg(feature = "woc")]
impl From<crate::blockchain::woc::WocError> for Error {
    fn from(other: crate::blockchain::woc::WocError) -> Self {
        Error::Woc(Box::new(other))
    }
}
