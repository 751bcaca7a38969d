//! Read access to the ledger's UTxO set, as used by the rescan loader and the
//! transaction service. The Kupo client is the production implementation.
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::codec::{decode_datum_hex, OrderDatum};
use crate::error::{OrderError, Result};
use crate::models::{OutRef, Utxo};

#[async_trait]
pub trait UtxoSource: Send + Sync {
    /// Unspent outputs currently sitting at `address`.
    async fn utxos_at(&self, address: &str) -> anyhow::Result<Vec<Utxo>>;

    /// Unspent outputs for the given outpoints; missing ones are simply absent.
    async fn utxos_by_out_ref(&self, out_refs: &[OutRef]) -> anyhow::Result<Vec<Utxo>>;

    /// CBOR hex of the datum with the given hash.
    async fn datum(&self, hash: &str) -> anyhow::Result<String>;
}

/// Fill in `inline_datum` from the source when the indexer only reported a hash.
pub async fn with_datum(source: &dyn UtxoSource, mut utxo: Utxo) -> Result<Utxo> {
    if utxo.inline_datum.is_none() {
        if let Some(hash) = utxo.data_hash.clone() {
            utxo.inline_datum = Some(source.datum(&hash).await?);
        }
    }
    Ok(utxo)
}

/// Decode the order datum attached to a UTxO.
pub fn order_datum_of(utxo: &Utxo) -> Result<OrderDatum> {
    let cbor = utxo.inline_datum.as_deref().ok_or_else(|| {
        OrderError::Decoding(format!("output {} carries no datum", utxo.out_ref()))
    })?;
    decode_datum_hex(cbor)
}

/// In-memory UTxO set, for fixtures and offline replays.
#[derive(Default)]
pub struct MemoryUtxoSource {
    utxos: RwLock<Vec<Utxo>>,
    datums: RwLock<HashMap<String, String>>,
}

impl MemoryUtxoSource {
    pub fn new(utxos: Vec<Utxo>) -> Self {
        Self {
            utxos: RwLock::new(utxos),
            datums: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert(&self, utxo: Utxo) {
        self.utxos.write().push(utxo);
    }

    pub fn insert_datum(&self, hash: &str, cbor_hex: &str) {
        self.datums.write().insert(hash.to_string(), cbor_hex.to_string());
    }

    /// Remove spent outputs.
    pub fn spend(&self, out_refs: &[OutRef]) {
        self.utxos
            .write()
            .retain(|u| !out_refs.contains(&u.out_ref()));
    }
}

#[async_trait]
impl UtxoSource for MemoryUtxoSource {
    async fn utxos_at(&self, address: &str) -> anyhow::Result<Vec<Utxo>> {
        Ok(self
            .utxos
            .read()
            .iter()
            .filter(|u| u.address == address)
            .cloned()
            .collect())
    }

    async fn utxos_by_out_ref(&self, out_refs: &[OutRef]) -> anyhow::Result<Vec<Utxo>> {
        Ok(self
            .utxos
            .read()
            .iter()
            .filter(|u| out_refs.contains(&u.out_ref()))
            .cloned()
            .collect())
    }

    async fn datum(&self, hash: &str) -> anyhow::Result<String> {
        self.datums
            .read()
            .get(hash)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No datum found for {}", hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    fn hashed_output() -> Utxo {
        Utxo {
            address: "addr_test1wqxyz".to_string(),
            tx_hash: "ab".repeat(32),
            output_index: 0,
            value: Value::lovelace(2_000_000),
            data_hash: Some("cafe".to_string()),
            inline_datum: None,
            reference_script_hash: None,
        }
    }

    #[tokio::test]
    async fn datum_is_fetched_by_hash() {
        let source = MemoryUtxoSource::default();
        source.insert_datum("cafe", "d87980");
        let utxo = with_datum(&source, hashed_output()).await.unwrap();
        assert_eq!(utxo.inline_datum.as_deref(), Some("d87980"));
    }

    #[tokio::test]
    async fn unknown_datum_is_an_indexer_error() {
        let source = MemoryUtxoSource::new(vec![hashed_output()]);
        let err = with_datum(&source, hashed_output()).await.unwrap_err();
        assert!(matches!(err, OrderError::Indexer(_)));
        assert!(matches!(order_datum_of(&hashed_output()), Err(OrderError::Decoding(_))));
    }
}
