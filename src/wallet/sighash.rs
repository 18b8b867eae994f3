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

//! Signature hashes
//!
//! Every input of a wallet transaction carries a [`SighashPolicy`] that decides which parts of
//! the transaction its signature commits to. Digests follow the BIP143 layout with the
//! `FORKID` bit set in the hash type:
//!
//! ```text
//! version || hashPrevouts || hashSequence || outpoint || scriptCode ||
//! value || nSequence || hashOutputs || nLockTime || sighashType
//! ```

use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::{Script, SigHash, Transaction};

use serde::{Deserialize, Serialize};

/// `SIGHASH_FORKID` bit of the hash type
pub const SIGHASH_FORKID: u32 = 0x40;

const SIGHASH_ALL: u32 = 0x01;
const SIGHASH_NONE: u32 = 0x02;
const SIGHASH_SINGLE: u32 = 0x03;
const SIGHASH_ANYONECANPAY: u32 = 0x80;

/// What the signature of a single input commits to
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SighashPolicy {
    /// Every input and every output, the transaction is final once signed
    All,
    /// The signed input and the output at the same index only, anyone may add inputs and outputs
    SinglePairedAnyoneCanPay,
    /// The signed input only, no output at all, anyone may add inputs and outputs
    NoneAnyoneCanPay,
}

impl SighashPolicy {
    /// Hash type as serialized at the end of the signature and of the preimage
    pub fn as_u32(&self) -> u32 {
        let base = match self {
            SighashPolicy::All => SIGHASH_ALL,
            SighashPolicy::SinglePairedAnyoneCanPay => SIGHASH_SINGLE | SIGHASH_ANYONECANPAY,
            SighashPolicy::NoneAnyoneCanPay => SIGHASH_NONE | SIGHASH_ANYONECANPAY,
        };

        base | SIGHASH_FORKID
    }

    /// Policy serialized as `hash_type`, if it is one the wallet produces
    pub fn from_u32(hash_type: u32) -> Option<Self> {
        [
            SighashPolicy::All,
            SighashPolicy::SinglePairedAnyoneCanPay,
            SighashPolicy::NoneAnyoneCanPay,
        ]
        .iter()
        .copied()
        .find(|policy| policy.as_u32() == hash_type)
    }

    /// Whether other parties may append inputs without invalidating the signature
    pub fn anyone_can_pay(&self) -> bool {
        self.as_u32() & SIGHASH_ANYONECANPAY != 0
    }

    /// Whether the signed input must have an output at its own index
    pub fn requires_paired_output(&self) -> bool {
        *self == SighashPolicy::SinglePairedAnyoneCanPay
    }
}

fn double_sha256(data: &[u8]) -> [u8; 32] {
    sha256d::Hash::hash(data).into_inner()
}

/// Compute the digest signed by input `input_index` of `tx`
///
/// `script_code` and `value` describe the output being spent. Panics if `input_index` is out of
/// range.
pub fn signature_hash(
    tx: &Transaction,
    input_index: usize,
    script_code: &Script,
    value: u64,
    policy: SighashPolicy,
) -> SigHash {
    let input = &tx.input[input_index];

    let hash_prevouts = if policy.anyone_can_pay() {
        [0u8; 32]
    } else {
        let prevouts = tx
            .input
            .iter()
            .flat_map(|txin| serialize(&txin.previous_output))
            .collect::<Vec<_>>();
        double_sha256(&prevouts)
    };

    let hash_sequence = match policy {
        SighashPolicy::All => {
            let sequences = tx
                .input
                .iter()
                .flat_map(|txin| txin.sequence.to_le_bytes().to_vec())
                .collect::<Vec<_>>();
            double_sha256(&sequences)
        }
        _ => [0u8; 32],
    };

    let hash_outputs = match policy {
        SighashPolicy::All => {
            let outputs = tx
                .output
                .iter()
                .flat_map(|txout| serialize(txout))
                .collect::<Vec<_>>();
            double_sha256(&outputs)
        }
        SighashPolicy::SinglePairedAnyoneCanPay if input_index < tx.output.len() => {
            double_sha256(&serialize(&tx.output[input_index]))
        }
        _ => [0u8; 32],
    };

    let mut preimage = Vec::with_capacity(160 + script_code.len());
    preimage.extend_from_slice(&tx.version.to_le_bytes());
    preimage.extend_from_slice(&hash_prevouts);
    preimage.extend_from_slice(&hash_sequence);
    preimage.extend(serialize(&input.previous_output));
    preimage.extend(serialize(script_code));
    preimage.extend_from_slice(&value.to_le_bytes());
    preimage.extend_from_slice(&input.sequence.to_le_bytes());
    preimage.extend_from_slice(&hash_outputs);
    preimage.extend_from_slice(&tx.lock_time.to_le_bytes());
    preimage.extend_from_slice(&policy.as_u32().to_le_bytes());

    SigHash::hash(&preimage)
}
