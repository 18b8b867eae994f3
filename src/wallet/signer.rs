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

//! Key material
//!
//! The wallet spends pay-to-pubkey-hash outputs locked to a single key. [`KeyPair`] holds that
//! key, derives the wallet address and output script from it and produces the signatures the
//! [`TxBuilder`](super::tx_builder::TxBuilder) places in every input.
//!
//! ```
//! # use streamwallet::wallet::signer::KeyPair;
//! # use streamwallet::bitcoin::Network;
//! let keys = KeyPair::generate(Network::Testnet)?;
//! let restored = KeyPair::from_wif(&keys.to_wif())?;
//!
//! assert_eq!(keys.address(), restored.address());
//! # Ok::<_, streamwallet::Error>(())
//! ```

use std::fmt;

use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use bitcoin::{Address, Network, PrivateKey, PublicKey, Script, SigHash};

use rand::RngCore;

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use super::sighash::SighashPolicy;
use super::utils::SecpCtx;
use crate::error::Error;

/// A private key together with its public key
#[derive(Clone)]
pub struct KeyPair {
    private_key: PrivateKey,
    public_key: PublicKey,
    secp: SecpCtx,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .field("network", &self.private_key.network)
            .finish()
    }
}

impl PartialEq for KeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.private_key == other.private_key
    }
}

impl KeyPair {
    /// Wrap an existing private key
    pub fn new(private_key: PrivateKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = private_key.public_key(&secp);

        KeyPair {
            private_key,
            public_key,
            secp,
        }
    }

    /// Generate a fresh compressed key for `network`
    pub fn generate(network: Network) -> Result<Self, Error> {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 32];

        // out-of-range scalars are astronomically rare, just draw again
        let key = loop {
            rng.fill_bytes(&mut bytes);
            if let Ok(key) = SecretKey::from_slice(&bytes) {
                break key;
            }
        };

        Ok(KeyPair::new(PrivateKey {
            compressed: true,
            network,
            key,
        }))
    }

    /// Import a key in wallet import format
    pub fn from_wif(wif: &str) -> Result<Self, Error> {
        Ok(KeyPair::new(PrivateKey::from_wif(wif)?))
    }

    /// Export the key in wallet import format
    pub fn to_wif(&self) -> String {
        self.private_key.to_wif()
    }

    /// Public key
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Network the key belongs to
    pub fn network(&self) -> Network {
        self.private_key.network
    }

    /// Pay-to-pubkey-hash address of the key
    pub fn address(&self) -> Address {
        Address::p2pkh(&self.public_key, self.private_key.network)
    }

    /// Locking script of the outputs paying to [`KeyPair::address`]
    pub fn output_script(&self) -> Script {
        self.address().script_pubkey()
    }

    /// Sign `hash`, returning the DER signature followed by the hash type byte of `policy`
    pub fn sign_hash(&self, hash: &SigHash, policy: SighashPolicy) -> Result<Vec<u8>, Error> {
        let message = Message::from_slice(&hash.into_inner()[..])?;
        let signature = self.secp.sign(&message, &self.private_key.key);

        let mut final_signature = Vec::with_capacity(75);
        final_signature.extend_from_slice(&signature.serialize_der());
        final_signature.push(policy.as_u32() as u8);

        Ok(final_signature)
    }

    pub(crate) fn secp(&self) -> &SecpCtx {
        &self.secp
    }
}

#[cfg(test)]
mod test {
    use bitcoin::secp256k1::Signature;

    use super::*;

    const WIF: &str = "cVt4o7BGAig1UXywgGSmARhxMdzP5qvQsxKkSsc1XEkw3tDTQFpy";

    #[test]
    fn test_wif_roundtrip() {
        let keys = KeyPair::from_wif(WIF).unwrap();

        assert_eq!(keys.to_wif(), WIF);
        assert_eq!(keys.network(), Network::Testnet);
        assert!(keys.public_key().compressed);
    }

    #[test]
    #[should_panic(expected = "Key(")]
    fn test_invalid_wif() {
        KeyPair::from_wif("not a key").unwrap();
    }

    #[test]
    fn test_generate() {
        let first = KeyPair::generate(Network::Bitcoin).unwrap();
        let second = KeyPair::generate(Network::Bitcoin).unwrap();

        assert_ne!(first, second);
        assert_eq!(first.network(), Network::Bitcoin);
        assert!(first.address().to_string().starts_with('1'));
    }

    #[test]
    fn test_output_script_is_p2pkh() {
        let keys = KeyPair::from_wif(WIF).unwrap();
        let script = keys.output_script();

        assert!(script.is_p2pkh());
        assert_eq!(script, keys.address().script_pubkey());
    }

    #[test]
    fn test_debug_hides_secret() {
        let keys = KeyPair::from_wif(WIF).unwrap();
        let debug = format!("{:?}", keys);

        assert!(!debug.contains(WIF));
        assert!(debug.contains("public_key"));
        assert!(!debug.contains("private_key"));
    }

    #[test]
    fn test_sign_hash() {
        let keys = KeyPair::from_wif(WIF).unwrap();
        let hash = SigHash::hash(b"streamwallet");
        let signature = keys
            .sign_hash(&hash, SighashPolicy::SinglePairedAnyoneCanPay)
            .unwrap();

        let (flag, der) = signature.split_last().unwrap();
        assert_eq!(*flag, 0xc3);

        let message = Message::from_slice(&hash.into_inner()[..]).unwrap();
        let signature = Signature::from_der(der).unwrap();
        keys.secp()
            .verify(&message, &signature, &keys.public_key().key)
            .unwrap();
    }
}
