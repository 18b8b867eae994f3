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

use std::iter;

use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::hex::ToHex;
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::Transaction;

// De-facto standard "dust limit" (even though it should change based on the output type)
const DUST_LIMIT_SATOSHI: u64 = 546;

/// Trait to check if a value is below the dust limit
// we implement this trait to make sure we don't mess up the comparison with off-by-one like a <
// instead of a <= etc. The constant value for the dust limit is not public on purpose, to
// encourage the usage of this trait.
pub trait IsDust {
    /// Check whether or not a value is below dust limit
    fn is_dust(&self) -> bool;
}

impl IsDust for u64 {
    fn is_dust(&self) -> bool {
        *self <= DUST_LIMIT_SATOSHI
    }
}

pub(crate) type SecpCtx = Secp256k1<All>;

/// Split `change` across the committed output slots of a stream funded by `funding_inputs`
/// inputs.
///
/// Slot 0 takes the bulk. Every further slot gets exactly `dust_limit`, as long as slot 0 stays
/// at or above `dust_limit` and there is an input left to pair the slot with. No slot is
/// returned for zero change. The slots always add up to `change`.
pub(crate) fn change_slots(change: u64, funding_inputs: usize, dust_limit: u64) -> Vec<u64> {
    if change == 0 || funding_inputs == 0 {
        return vec![];
    }

    let extra = match dust_limit {
        0 => 0,
        _ => std::cmp::min(
            (funding_inputs - 1) as u64,
            change.saturating_sub(dust_limit) / dust_limit,
        ),
    };

    iter::once(change - extra * dust_limit)
        .chain(iter::repeat(dust_limit).take(extra as usize))
        .collect()
}

/// Consensus serialization of `tx` in the pre-segwit layout
///
/// `bitcoin` switches to the extended layout for transactions without inputs, which chains
/// without segwit reject.
pub(crate) fn serialize_legacy(tx: &Transaction) -> Vec<u8> {
    let mut data = serialize(&tx.version);
    data.extend(serialize(&tx.input));
    data.extend(serialize(&tx.output));
    data.extend(serialize(&tx.lock_time));

    data
}

/// Hex encoded [`serialize_legacy`]
pub(crate) fn serialize_legacy_hex(tx: &Transaction) -> String {
    serialize_legacy(tx).to_hex()
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use bitcoin::consensus::encode::serialize_hex;
    use bitcoin::{OutPoint, Script, TxIn, TxOut};

    use super::*;

    #[test]
    fn test_serialize_legacy_without_inputs() {
        let tx = Transaction {
            version: 1,
            lock_time: 0x5f34_1b0d,
            input: vec![],
            output: vec![],
        };

        assert_eq!(serialize_legacy_hex(&tx), "0100000000000d1b345f");
    }

    #[test]
    fn test_serialize_legacy_matches_consensus() {
        let tx = Transaction {
            version: 1,
            lock_time: 0,
            input: vec![TxIn {
                previous_output: OutPoint::from_str(
                    "1aebb7d0776cec663cbbdd87f200bf15406adb0ef91916d102bcd7f86c86934e:1",
                )
                .unwrap(),
                script_sig: Script::from(vec![0x51]),
                sequence: 0xFFFF_FFFF,
                witness: vec![],
            }],
            output: vec![TxOut {
                value: 1_000,
                script_pubkey: Script::from(vec![0x51]),
            }],
        };

        assert_eq!(serialize_legacy_hex(&tx), serialize_hex(&tx));
    }

    #[test]
    fn test_is_dust() {
        assert!(546u64.is_dust());
        assert!(!547u64.is_dust());
    }

    #[test]
    fn test_change_slots_single_input() {
        assert_eq!(change_slots(1_900, 1, 500), vec![1_900]);
        assert_eq!(change_slots(100, 1, 500), vec![100]);
        assert!(change_slots(0, 1, 500).is_empty());
    }

    #[test]
    fn test_change_slots_small_change_stays_in_first() {
        assert_eq!(change_slots(500, 2, 500), vec![500]);
        assert_eq!(change_slots(900, 2, 500), vec![900]);
    }

    #[test]
    fn test_change_slots_dust_slots() {
        assert_eq!(change_slots(2_000, 3, 500), vec![1_000, 500, 500]);
        assert_eq!(change_slots(10_000, 3, 500), vec![9_000, 500, 500]);
        assert_eq!(change_slots(1_200, 3, 500), vec![700, 500]);
    }

    #[test]
    fn test_change_slots_sum() {
        for change in (0..5_000).step_by(37) {
            for inputs in 1..6 {
                let slots = change_slots(change, inputs, 500);
                assert_eq!(slots.iter().sum::<u64>(), change);
                assert!(slots.len() <= inputs);
            }
        }
    }

    #[test]
    fn test_change_slots_no_dust_limit() {
        assert_eq!(change_slots(1_000, 4, 0), vec![1_000]);
    }
}
