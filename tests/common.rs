#![allow(unused)]
use std::str::FromStr;
use std::sync::Arc;

use bitcoin::blockdata::script::Instruction;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Message, Secp256k1, Signature};
use bitcoin::{PublicKey, Script, Transaction, TxIn, TxOut, Txid};

use streamwallet::blockchain::MemoryIndex;
use streamwallet::wallet::sighash::signature_hash;
use streamwallet::*;

pub const WIF: &str = "cVt4o7BGAig1UXywgGSmARhxMdzP5qvQsxKkSsc1XEkw3tDTQFpy";

pub fn get_test_txid() -> Txid {
    Txid::from_str("1aebb7d0776cec663cbbdd87f200bf15406adb0ef91916d102bcd7f86c86934e").unwrap()
}

/// Return a wallet backed by a [`MemoryIndex`] that reports one output per value in `values`
/// for the wallet address.
pub fn get_indexed_wallet(values: &[u64]) -> (Wallet<Arc<MemoryIndex>>, Arc<MemoryIndex>) {
    let address = KeyPair::from_wif(WIF).unwrap().address();
    let utxos = values
        .iter()
        .enumerate()
        .map(|(vout, value)| IndexedUtxo {
            value: *value,
            txid: get_test_txid(),
            vout: vout as u32,
        })
        .collect();

    let mut index = MemoryIndex::new();
    index.add_utxos(&address, utxos);
    let index = Arc::new(index);

    let mut wallet = Wallet::new(Arc::clone(&index), WalletConfig::default());
    wallet.load_key(Some(WIF)).unwrap();

    (wallet, index)
}

/// Append an input and an output the way the payee of a stream does
pub fn extend_as_payee(tx: &Transaction, payee_value: u64) -> Transaction {
    let mut tx = tx.clone();
    tx.input.push(TxIn {
        previous_output: bitcoin::OutPoint::new(Txid::hash(b"payee"), 7),
        script_sig: Script::new(),
        sequence: 0xFFFF_FFFF,
        witness: vec![],
    });
    tx.output.push(TxOut {
        value: payee_value,
        script_pubkey: Script::from(vec![0x6a]),
    });

    tx
}

/// Check the pay-to-pubkey-hash signature of input `index` against the output it spends
pub fn verify_input(tx: &Transaction, index: usize, spent: &UnspentOutput) -> SighashPolicy {
    let pushes = tx.input[index]
        .script_sig
        .instructions()
        .map(|instruction| match instruction.unwrap() {
            Instruction::PushBytes(bytes) => bytes.to_vec(),
            Instruction::Op(op) => panic!("unexpected opcode {:?}", op),
        })
        .collect::<Vec<_>>();
    assert_eq!(pushes.len(), 2);

    let (hash_type, der) = pushes[0].split_last().unwrap();
    let policy = SighashPolicy::from_u32(*hash_type as u32).unwrap();
    let public_key = PublicKey::from_slice(&pushes[1]).unwrap();

    let hash = signature_hash(tx, index, &spent.txout.script_pubkey, spent.value(), policy);
    let message = Message::from_slice(&hash.into_inner()[..]).unwrap();
    Secp256k1::verification_only()
        .verify(&message, &Signature::from_der(der).unwrap(), &public_key.key)
        .unwrap();

    policy
}
