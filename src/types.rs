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

use bitcoin::blockdata::transaction::{OutPoint, Transaction, TxOut};
use bitcoin::{Script, Txid};

use serde::{Deserialize, Serialize};

use crate::inventory::Inventory;
use crate::wallet::utils::serialize_legacy_hex;

/// Encumbrance status of an [`UnspentOutput`]
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UtxoStatus {
    /// Spendable, may be picked by coin selection
    Free,
    /// Committed to an in-flight transaction, only an explicit release makes it spendable again
    Hold,
}

impl Default for UtxoStatus {
    fn default() -> Self {
        UtxoStatus::Free
    }
}

/// An unspent output the wallet can spend
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnspentOutput {
    /// Reference to a transaction output
    pub outpoint: OutPoint,
    /// Transaction output
    pub txout: TxOut,
    /// Encumbrance status
    #[serde(default)]
    pub status: UtxoStatus,
}

impl UnspentOutput {
    /// Create a new `free` output
    pub fn new(value: u64, script_pubkey: Script, txid: Txid, vout: u32) -> Self {
        UnspentOutput {
            outpoint: OutPoint::new(txid, vout),
            txout: TxOut {
                value,
                script_pubkey,
            },
            status: UtxoStatus::Free,
        }
    }

    /// Wrap output `vout` of `tx`
    ///
    /// Returns `None` if the transaction doesn't have that many outputs.
    pub fn from_tx(tx: &Transaction, vout: u32) -> Option<Self> {
        tx.output.get(vout as usize).map(|txout| UnspentOutput {
            outpoint: OutPoint::new(tx.txid(), vout),
            txout: txout.clone(),
            status: UtxoStatus::Free,
        })
    }

    /// Value in satoshi
    pub fn value(&self) -> u64 {
        self.txout.value
    }

    /// Whether the output can currently be selected
    pub fn is_free(&self) -> bool {
        self.status == UtxoStatus::Free
    }
}

/// An output as reported by a chain index
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedUtxo {
    /// Value in satoshi
    pub value: u64,
    /// Transaction that created the output
    pub txid: Txid,
    /// Index of the output in the transaction
    pub vout: u32,
}

/// Inputs and outputs a wallet placed in a transaction as its own committed funding
///
/// A `SIGHASH_SINGLE | ANYONECANPAY` signature only covers its own input and the output at the
/// same index, so a transaction can be extended after it was signed. The boundary is captured
/// when the transaction is built and never recomputed from its current shape.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FundingBoundary {
    /// Number of leading inputs that fund the transaction
    pub funding_input_count: usize,
    /// Number of leading outputs paired with the funding inputs
    pub sender_output_count: usize,
}

impl FundingBoundary {
    /// Net value committed by the wallet to `tx`
    ///
    /// Sums `input - output` over the first `funding_input_count` indexes. Outputs at or past
    /// `sender_output_count`, or missing altogether, count as zero. Inputs are valued with the
    /// outputs they spend as found in `inventory`, inputs spending anything else count as zero.
    /// Inputs and outputs appended after the boundary was captured never change the result.
    pub fn funding_of(&self, tx: &Transaction, inventory: &Inventory) -> i64 {
        (0..self.funding_input_count)
            .map(|index| {
                let input_value = tx
                    .input
                    .get(index)
                    .and_then(|txin| inventory.find(&txin.previous_output))
                    .map_or(0, |utxo| utxo.value() as i64);
                let output_value = if index < self.sender_output_count {
                    tx.output.get(index).map_or(0, |txout| txout.value as i64)
                } else {
                    0
                };

                input_value - output_value
            })
            .sum()
    }
}

/// A fully signed transaction ready for broadcast
#[derive(Debug, Clone, PartialEq)]
pub struct SignedTransaction {
    /// The transaction
    pub transaction: Transaction,
    /// Consensus serialization in the pre-segwit layout, hex encoded
    pub hex: String,
}

impl From<Transaction> for SignedTransaction {
    fn from(transaction: Transaction) -> Self {
        let hex = serialize_legacy_hex(&transaction);
        SignedTransaction { transaction, hex }
    }
}

impl SignedTransaction {
    /// Transaction id
    pub fn txid(&self) -> Txid {
        self.transaction.txid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serde() {
        assert_eq!(serde_json::to_string(&UtxoStatus::Hold).unwrap(), "\"hold\"");
        assert_eq!(
            serde_json::from_str::<UtxoStatus>("\"free\"").unwrap(),
            UtxoStatus::Free
        );
    }

    #[test]
    fn test_from_tx() {
        let tx = Transaction {
            version: 1,
            lock_time: 0,
            input: vec![],
            output: vec![TxOut {
                value: 42_000,
                script_pubkey: Script::new(),
            }],
        };

        let utxo = UnspentOutput::from_tx(&tx, 0).unwrap();
        assert_eq!(utxo.value(), 42_000);
        assert_eq!(utxo.outpoint, OutPoint::new(tx.txid(), 0));
        assert!(utxo.is_free());
        assert!(UnspentOutput::from_tx(&tx, 1).is_none());
    }

    #[test]
    fn test_funding_of_ignores_appended() {
        use bitcoin::TxIn;

        let prev = Transaction {
            version: 1,
            lock_time: 0,
            input: vec![],
            output: vec![
                TxOut {
                    value: 2_000,
                    script_pubkey: Script::new(),
                },
                TxOut {
                    value: 1_000,
                    script_pubkey: Script::new(),
                },
            ],
        };
        let inventory = Inventory::from_utxos(vec![
            UnspentOutput::from_tx(&prev, 0).unwrap(),
            UnspentOutput::from_tx(&prev, 1).unwrap(),
        ])
        .unwrap();
        let txin = |vout| TxIn {
            previous_output: OutPoint::new(prev.txid(), vout),
            script_sig: Script::new(),
            sequence: 0,
            witness: vec![],
        };

        let mut tx = Transaction {
            version: 1,
            lock_time: 0,
            input: vec![txin(0), txin(1)],
            output: vec![TxOut {
                value: 500,
                script_pubkey: Script::new(),
            }],
        };
        let boundary = FundingBoundary {
            funding_input_count: 2,
            sender_output_count: 1,
        };
        assert_eq!(boundary.funding_of(&tx, &inventory), 2_500);

        tx.output.push(TxOut {
            value: 100,
            script_pubkey: Script::new(),
        });
        tx.input.push(txin(7));
        assert_eq!(boundary.funding_of(&tx, &inventory), 2_500);

        assert_eq!(FundingBoundary::default().funding_of(&tx, &inventory), 0);
    }

    #[test]
    fn test_signed_transaction_hex() {
        let tx = Transaction {
            version: 1,
            lock_time: 0,
            input: vec![],
            output: vec![],
        };
        let signed = SignedTransaction::from(tx.clone());
        assert_eq!(signed.hex, "01000000000000000000");
        assert_eq!(signed.txid(), tx.txid());
    }
}
