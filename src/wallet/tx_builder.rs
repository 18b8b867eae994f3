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

//! Transaction builder
//!
//! Every input is added together with the [`SighashPolicy`] its signature will use, so a single
//! transaction can mix fully committed inputs with inputs that leave room for others to extend
//! it.
//!
//! ```
//! # use std::str::FromStr;
//! # use streamwallet::bitcoin::{Network, Txid};
//! # use streamwallet::wallet::signer::KeyPair;
//! # use streamwallet::*;
//! let keys = KeyPair::generate(Network::Testnet)?;
//! let utxo = UnspentOutput::new(
//!     2_000,
//!     keys.output_script(),
//!     Txid::from_str("1aebb7d0776cec663cbbdd87f200bf15406adb0ef91916d102bcd7f86c86934e")?,
//!     0,
//! );
//!
//! let mut builder = TxBuilder::new();
//! builder.add_input(&utxo, SighashPolicy::SinglePairedAnyoneCanPay);
//! builder.add_output(1_500, keys.output_script());
//! builder.set_deferred_settlement(Some(600_000_000));
//!
//! let tx = builder.build_and_sign(&keys)?;
//! assert_eq!(tx.input[0].sequence, 0);
//! # Ok::<_, streamwallet::Error>(())
//! ```

use bitcoin::blockdata::script::Builder as ScriptBuilder;
use bitcoin::{Script, Transaction, TxIn, TxOut};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use super::sighash::{signature_hash, SighashPolicy};
use super::signer::KeyPair;
use super::utils::IsDust;
use crate::error::Error;
use crate::types::UnspentOutput;

/// Sequence of inputs in a transaction that is final once signed
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;
/// Sequence of inputs in a transaction that settles at its lock time
pub const SEQUENCE_DEFERRED: u32 = 0;

const TX_VERSION: i32 = 1;

/// Builds and signs a pay-to-pubkey-hash transaction
#[derive(Debug, Default, Clone)]
pub struct TxBuilder {
    pub(crate) inputs: Vec<(UnspentOutput, SighashPolicy)>,
    pub(crate) outputs: Vec<TxOut>,
    pub(crate) lock_time: Option<u32>,
}

impl TxBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Spend `utxo` with a signature following `policy`
    ///
    /// Returns the number of inputs after the insertion.
    pub fn add_input(&mut self, utxo: &UnspentOutput, policy: SighashPolicy) -> usize {
        self.inputs.push((utxo.clone(), policy));
        self.inputs.len()
    }

    /// Pay `value` satoshi to `script_pubkey`
    ///
    /// Returns the number of outputs after the insertion.
    pub fn add_output(&mut self, value: u64, script_pubkey: Script) -> usize {
        self.outputs.push(TxOut {
            value,
            script_pubkey,
        });
        self.outputs.len()
    }

    /// Settle the transaction at `lock_time` instead of immediately
    ///
    /// With a lock time every input gets a non-final sequence, so the transaction can still be
    /// replaced by the counterparty until then. `None` makes the transaction final.
    pub fn set_deferred_settlement(&mut self, lock_time: Option<u32>) -> &mut Self {
        self.lock_time = lock_time;
        self
    }

    /// Assemble the transaction and sign every input with `keys`
    ///
    /// Fails with [`Error::UnpairedInput`] if an input signed
    /// [`SighashPolicy::SinglePairedAnyoneCanPay`] has no output at its own index.
    pub fn build_and_sign(&self, keys: &KeyPair) -> Result<Transaction, Error> {
        if let Some(index) = self
            .inputs
            .iter()
            .enumerate()
            .position(|(index, (_, policy))| {
                policy.requires_paired_output() && index >= self.outputs.len()
            })
        {
            return Err(Error::UnpairedInput(index));
        }

        let own_script = keys.output_script();
        if let Some((utxo, _)) = self
            .inputs
            .iter()
            .find(|(utxo, _)| utxo.txout.script_pubkey != own_script)
        {
            return Err(Error::Generic(format!(
                "Output {} is not locked to the signing key",
                utxo.outpoint
            )));
        }

        for txout in self.outputs.iter().filter(|txout| txout.value.is_dust()) {
            warn!(
                "Output of {} sat to {:x} is below the dust limit",
                txout.value, txout.script_pubkey
            );
        }

        let sequence = match self.lock_time {
            Some(_) => SEQUENCE_DEFERRED,
            None => SEQUENCE_FINAL,
        };

        let mut tx = Transaction {
            version: TX_VERSION,
            lock_time: self.lock_time.unwrap_or(0),
            input: self
                .inputs
                .iter()
                .map(|(utxo, _)| TxIn {
                    previous_output: utxo.outpoint,
                    script_sig: Script::new(),
                    sequence,
                    witness: vec![],
                })
                .collect(),
            output: self.outputs.clone(),
        };

        let script_sigs = self
            .inputs
            .iter()
            .enumerate()
            .map(|(index, (utxo, policy))| {
                let hash = signature_hash(
                    &tx,
                    index,
                    &utxo.txout.script_pubkey,
                    utxo.value(),
                    *policy,
                );
                let signature = keys.sign_hash(&hash, *policy)?;
                trace!("Signed input {} with {:?}", index, policy);

                Ok(ScriptBuilder::new()
                    .push_slice(&signature)
                    .push_key(keys.public_key())
                    .into_script())
            })
            .collect::<Result<Vec<_>, Error>>()?;

        for (txin, script_sig) in tx.input.iter_mut().zip(script_sigs) {
            txin.script_sig = script_sig;
        }

        debug!(
            "Built {} with {} inputs and {} outputs",
            tx.txid(),
            tx.input.len(),
            tx.output.len()
        );

        Ok(tx)
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use bitcoin::blockdata::script::Instruction;
    use bitcoin::hashes::Hash;
    use bitcoin::secp256k1::{Message, Signature};
    use bitcoin::{OutPoint, Txid};

    use super::*;

    const WIF: &str = "cVt4o7BGAig1UXywgGSmARhxMdzP5qvQsxKkSsc1XEkw3tDTQFpy";
    const TXID: &str = "ebd9813ecebc57ff8f30797de7c205e3c7498ca950ea4341ee51a685ff2fa30a";

    fn get_test_utxo(keys: &KeyPair, value: u64, vout: u32) -> UnspentOutput {
        UnspentOutput::new(
            value,
            keys.output_script(),
            Txid::from_str(TXID).unwrap(),
            vout,
        )
    }

    fn signature_of(txin: &TxIn) -> (Signature, SighashPolicy) {
        let pushes = txin
            .script_sig
            .instructions()
            .map(|instruction| match instruction.unwrap() {
                Instruction::PushBytes(bytes) => bytes.to_vec(),
                _ => panic!("unexpected opcode"),
            })
            .collect::<Vec<_>>();
        assert_eq!(pushes.len(), 2);

        let (flag, der) = pushes[0].split_last().unwrap();
        let policy = match flag {
            0x41 => SighashPolicy::All,
            0xc3 => SighashPolicy::SinglePairedAnyoneCanPay,
            0xc2 => SighashPolicy::NoneAnyoneCanPay,
            _ => panic!("unexpected sighash flag"),
        };

        (Signature::from_der(der).unwrap(), policy)
    }

    fn assert_signatures_valid(tx: &Transaction, keys: &KeyPair, spent: &[UnspentOutput]) {
        for (index, txin) in tx.input.iter().enumerate() {
            let (signature, policy) = signature_of(txin);
            let utxo = &spent[index];
            let hash = signature_hash(tx, index, &utxo.txout.script_pubkey, utxo.value(), policy);
            let message = Message::from_slice(&hash.into_inner()[..]).unwrap();

            keys.secp()
                .verify(&message, &signature, &keys.public_key().key)
                .unwrap();
        }
    }

    #[test]
    fn test_build_final() {
        let keys = KeyPair::from_wif(WIF).unwrap();
        let utxo = get_test_utxo(&keys, 10_000, 0);

        let mut builder = TxBuilder::new();
        assert_eq!(builder.add_input(&utxo, SighashPolicy::All), 1);
        assert_eq!(builder.add_output(4_000, keys.output_script()), 1);
        assert_eq!(builder.add_output(6_000, keys.output_script()), 2);

        let tx = builder.build_and_sign(&keys).unwrap();
        assert_eq!(tx.version, 1);
        assert_eq!(tx.lock_time, 0);
        assert_eq!(tx.input[0].sequence, SEQUENCE_FINAL);
        assert_eq!(tx.input[0].previous_output, utxo.outpoint);
        assert_eq!(tx.output.len(), 2);
        assert_signatures_valid(&tx, &keys, &[utxo]);
    }

    #[test]
    fn test_build_deferred() {
        let keys = KeyPair::from_wif(WIF).unwrap();
        let utxo = get_test_utxo(&keys, 10_000, 0);

        let mut builder = TxBuilder::new();
        builder.add_input(&utxo, SighashPolicy::SinglePairedAnyoneCanPay);
        builder.add_output(9_000, keys.output_script());
        builder.set_deferred_settlement(Some(600_000_000));

        let tx = builder.build_and_sign(&keys).unwrap();
        assert_eq!(tx.lock_time, 600_000_000);
        assert_eq!(tx.input[0].sequence, SEQUENCE_DEFERRED);
    }

    #[test]
    fn test_signatures_survive_extension() {
        let keys = KeyPair::from_wif(WIF).unwrap();
        let spent = vec![get_test_utxo(&keys, 3_000, 0), get_test_utxo(&keys, 1_000, 1)];

        let mut builder = TxBuilder::new();
        builder.add_input(&spent[0], SighashPolicy::SinglePairedAnyoneCanPay);
        builder.add_input(&spent[1], SighashPolicy::NoneAnyoneCanPay);
        builder.add_output(1_500, keys.output_script());
        builder.set_deferred_settlement(Some(600_000_000));

        let mut tx = builder.build_and_sign(&keys).unwrap();
        assert_signatures_valid(&tx, &keys, &spent);

        // a third party adds its own input and two outputs
        tx.input.push(TxIn {
            previous_output: OutPoint::new(Txid::from_str(TXID).unwrap(), 7),
            script_sig: Script::new(),
            sequence: 0,
            witness: vec![],
        });
        tx.output.push(TxOut {
            value: 2_400,
            script_pubkey: Script::new(),
        });
        tx.output.push(TxOut {
            value: 100,
            script_pubkey: Script::new(),
        });

        for (index, txin) in tx.input.iter().take(2).enumerate() {
            let (signature, policy) = signature_of(txin);
            let hash = signature_hash(
                &tx,
                index,
                &spent[index].txout.script_pubkey,
                spent[index].value(),
                policy,
            );
            let message = Message::from_slice(&hash.into_inner()[..]).unwrap();
            keys.secp()
                .verify(&message, &signature, &keys.public_key().key)
                .unwrap();
        }
    }

    #[test]
    #[should_panic(expected = "UnpairedInput(1)")]
    fn test_unpaired_single_input() {
        let keys = KeyPair::from_wif(WIF).unwrap();

        let mut builder = TxBuilder::new();
        builder.add_input(
            &get_test_utxo(&keys, 3_000, 0),
            SighashPolicy::SinglePairedAnyoneCanPay,
        );
        builder.add_input(
            &get_test_utxo(&keys, 1_000, 1),
            SighashPolicy::SinglePairedAnyoneCanPay,
        );
        builder.add_output(1_500, keys.output_script());

        builder.build_and_sign(&keys).unwrap();
    }

    #[test]
    #[should_panic(expected = "not locked to the signing key")]
    fn test_foreign_input() {
        let keys = KeyPair::from_wif(WIF).unwrap();
        let foreign = UnspentOutput::new(
            1_000,
            Script::new(),
            Txid::from_str(TXID).unwrap(),
            0,
        );

        let mut builder = TxBuilder::new();
        builder.add_input(&foreign, SighashPolicy::All);
        builder.build_and_sign(&keys).unwrap();
    }

    #[test]
    fn test_no_outputs() {
        let keys = KeyPair::from_wif(WIF).unwrap();
        let spent = vec![get_test_utxo(&keys, 1_000, 0)];

        let mut builder = TxBuilder::new();
        builder.add_input(&spent[0], SighashPolicy::NoneAnyoneCanPay);

        let tx = builder.build_and_sign(&keys).unwrap();
        assert!(tx.output.is_empty());
        assert_signatures_valid(&tx, &keys, &spent);
    }
}
