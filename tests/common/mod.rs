#![allow(dead_code)]

use order_escrow_rs::codec::cbor::encode_cbor;
use order_escrow_rs::config::{ProtocolParams, METADATA_LABEL, MIN_ORDER_LOVELACE};
use order_escrow_rs::credentials::{address_of, Network, PlutusScript};
use order_escrow_rs::models::{
    BlockEvent, Credentials, MintEntry, OutputAsset, TxEvent, TxInputRef, TxOutputEvent,
};
use order_escrow_rs::{Asset, BuiltTx, OrderContext, OutRef, ReferenceScript, Token, Utxo, Value};

pub const VALIDATOR: &str = "4e4d01000033222220051200120011";
pub const ALICE: &str = "9a1c7ee1e3e6b1a6b1c6e3b5a0d7e0c2a39f0dd2e5a07c6aa5e1fc2b";
pub const BOB: &str = "5d1e3b5a0d7e0c2a39f0dd2e5a07c6aa5e1fc2b9a1c7ee1e3e6b1a6b";
pub const POLICY_A: &str = "f13ac4d66b3ee19a6aa0f2a22298737bd907cc95121662fc971b5275";

pub fn protocol() -> ProtocolParams {
    ProtocolParams {
        plutus_v2_cost_model: vec![100_000; 175],
        ..ProtocolParams::default()
    }
}

pub fn bare_ctx() -> OrderContext {
    OrderContext::new(
        Network::Preprod,
        PlutusScript::from_hex(VALIDATOR).unwrap(),
        protocol(),
        MIN_ORDER_LOVELACE,
        METADATA_LABEL,
    )
    .unwrap()
}

pub fn ctx() -> OrderContext {
    bare_ctx().with_reference(ReferenceScript {
        out_ref: OutRef::new(&"ab".repeat(32), 0),
        script_hash: None,
    })
}

pub fn addr(payment: &str) -> String {
    address_of(Network::Preprod, &Credentials::new(payment, "")).unwrap()
}

pub fn token_b() -> Token {
    Token::Asset(Asset::from_text(POLICY_A, "tokenB"))
}

/// Two wallet outputs for `owner`: `value` plus a plain 5 ADA collateral candidate.
pub fn wallet(owner: &str, n: u32, value: Value) -> Vec<Utxo> {
    let tx_hash = format!("{:064x}", n);
    vec![
        Utxo {
            address: addr(owner),
            tx_hash: tx_hash.clone(),
            output_index: 0,
            value,
            data_hash: None,
            inline_datum: None,
            reference_script_hash: None,
        },
        Utxo {
            address: addr(owner),
            tx_hash,
            output_index: 1,
            value: Value::lovelace(5_000_000),
            data_hash: None,
            inline_datum: None,
            reference_script_hash: None,
        },
    ]
}

fn datum_hex(datum: &Option<ciborium::value::Value>) -> Option<String> {
    datum.as_ref().map(|v| hex::encode(encode_cbor(v).unwrap()))
}

/// Outputs a built transaction creates, as they will appear on chain.
pub fn outputs_as_utxos(built: &BuiltTx) -> Vec<Utxo> {
    built
        .tx
        .body
        .outputs
        .iter()
        .enumerate()
        .map(|(i, o)| Utxo {
            address: o.address.clone(),
            tx_hash: built.tx_hash.clone(),
            output_index: i as u32,
            value: o.value.clone(),
            data_hash: None,
            inline_datum: datum_hex(&o.inline_datum),
            reference_script_hash: o.script_ref.as_ref().map(|s| s.hash()),
        })
        .collect()
}

/// Feed record for a built transaction.
pub fn event_of(built: &BuiltTx) -> TxEvent {
    let body = &built.tx.body;
    TxEvent {
        hash: built.tx_hash.clone(),
        inputs: body
            .inputs
            .iter()
            .map(|i| TxInputRef {
                tx_hash: i.tx_hash.clone(),
                index: i.output_index,
            })
            .collect(),
        outputs: body
            .outputs
            .iter()
            .map(|o| TxOutputEvent {
                address: o.address.clone(),
                amount: o.value.coin,
                assets: o
                    .value
                    .native_assets()
                    .map(|(a, amount)| OutputAsset {
                        policy: a.policy_id,
                        asset: a.name_hex,
                        amount,
                    })
                    .collect(),
                inline_datum: datum_hex(&o.inline_datum),
            })
            .collect(),
        mint: body
            .mint
            .0
            .iter()
            .flat_map(|(policy, names)| {
                names.iter().map(move |(name, qty)| MintEntry {
                    policy: policy.clone(),
                    asset: name.clone(),
                    quantity: *qty,
                })
            })
            .collect(),
    }
}

pub fn block(txs: Vec<TxEvent>) -> BlockEvent {
    BlockEvent {
        slot: None,
        block_hash: None,
        transactions: txs,
    }
}
