use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OrderError;
use crate::models::{Token, Value};

/// Transaction output reference: `tx_hash#output_index`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutRef {
    pub tx_hash: String,
    pub output_index: u32,
}

impl OutRef {
    pub fn new(tx_hash: &str, output_index: u32) -> Self {
        Self {
            tx_hash: tx_hash.to_lowercase(),
            output_index,
        }
    }

    /// Kupo match pattern for exactly this output.
    pub fn kupo_pattern(&self) -> String {
        format!("{}@{}", self.output_index, self.tx_hash)
    }
}

impl fmt::Display for OutRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_hash, self.output_index)
    }
}

impl FromStr for OutRef {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hash, idx) = s
            .split_once('#')
            .ok_or_else(|| OrderError::OrderNotFound(format!("malformed outpoint {}", s)))?;
        let output_index = idx
            .parse::<u32>()
            .map_err(|e| OrderError::OrderNotFound(format!("malformed outpoint {}: {}", s, e)))?;
        if hash.len() != 64 || hex::decode(hash).is_err() {
            return Err(OrderError::OrderNotFound(format!(
                "malformed transaction hash in {}",
                s
            )));
        }
        Ok(OutRef::new(hash, output_index))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Utxo {
    pub address: String,
    pub tx_hash: String,
    pub output_index: u32,
    pub value: Value,
    pub data_hash: Option<String>,
    /// CBOR hex of an inline datum, when the indexer already resolved it.
    pub inline_datum: Option<String>,
    pub reference_script_hash: Option<String>,
}

impl Utxo {
    pub fn out_ref(&self) -> OutRef {
        OutRef::new(&self.tx_hash, self.output_index)
    }

    pub fn quantity_of(&self, token: &Token) -> u64 {
        self.value.quantity_of(token)
    }

    /// A UTxO holding nothing but lovelace, usable as collateral.
    pub fn is_pure_lovelace(&self) -> bool {
        !self.value.has_assets() && self.reference_script_hash.is_none() && self.data_hash.is_none()
    }
}

/// Accepts quantities encoded either as JSON numbers or decimal strings.
pub(crate) fn deserialize_quantity<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Q {
        Str(String),
        Num(u64),
    }
    match Q::deserialize(deserializer)? {
        Q::Str(s) => s.parse().map_err(serde::de::Error::custom),
        Q::Num(n) => Ok(n),
    }
}

/// Signed variant of [`deserialize_quantity`] for mint/burn entries.
pub(crate) fn deserialize_signed_quantity<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Q {
        Str(String),
        Num(i64),
    }
    match Q::deserialize(deserializer)? {
        Q::Str(s) => s.parse().map_err(serde::de::Error::custom),
        Q::Num(n) => Ok(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_ref_parse_and_display() {
        let hash = "a".repeat(64);
        let out_ref: OutRef = format!("{}#3", hash).parse().unwrap();
        assert_eq!(out_ref.output_index, 3);
        assert_eq!(out_ref.to_string(), format!("{}#3", hash));
        assert_eq!(out_ref.kupo_pattern(), format!("3@{}", hash));
    }

    #[test]
    fn out_ref_rejects_garbage() {
        assert!("nothash#0".parse::<OutRef>().is_err());
        assert!(format!("{}", "a".repeat(64)).parse::<OutRef>().is_err());
    }
}
