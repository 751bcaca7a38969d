//! Records delivered by the chain-event feed (one per confirmed transaction).
//!
//! The field names follow the feed's JSON; aliases cover the variants emitted
//! by different feed filters.
use serde::{Deserialize, Serialize};

use crate::models::utxo::{deserialize_quantity, deserialize_signed_quantity};
use crate::models::{Asset, OutRef, Token, Value};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockEvent {
    #[serde(default)]
    pub slot: Option<u64>,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub transactions: Vec<TxEvent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxEvent {
    pub hash: String,
    #[serde(default)]
    pub inputs: Vec<TxInputRef>,
    #[serde(default)]
    pub outputs: Vec<TxOutputEvent>,
    #[serde(default)]
    pub mint: Vec<MintEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxInputRef {
    #[serde(alias = "tx_id")]
    pub tx_hash: String,
    pub index: u32,
}

impl TxInputRef {
    pub fn out_ref(&self) -> OutRef {
        OutRef::new(&self.tx_hash, self.index)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxOutputEvent {
    pub address: String,
    #[serde(deserialize_with = "deserialize_quantity")]
    pub amount: u64,
    #[serde(default)]
    pub assets: Vec<OutputAsset>,
    /// CBOR hex of the inline datum, if any.
    #[serde(default)]
    pub inline_datum: Option<String>,
}

impl TxOutputEvent {
    pub fn value(&self) -> Value {
        let mut value = Value::lovelace(self.amount);
        for a in &self.assets {
            value.add_token(&Token::Asset(Asset::new(&a.policy, &a.asset)), a.amount);
        }
        value
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputAsset {
    pub policy: String,
    /// Asset name, hex.
    pub asset: String,
    #[serde(deserialize_with = "deserialize_quantity")]
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintEntry {
    pub policy: String,
    pub asset: String,
    #[serde(deserialize_with = "deserialize_signed_quantity")]
    pub quantity: i64,
}

impl MintEntry {
    pub fn is_unit(&self, unit: &Asset) -> bool {
        self.policy.eq_ignore_ascii_case(&unit.policy_id) && self.asset.eq_ignore_ascii_case(&unit.name_hex)
    }
}
