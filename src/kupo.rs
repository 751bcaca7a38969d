use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Asset, OutRef, Token, Utxo, Value};
use crate::source::UtxoSource;

const RETRIES: u32 = 10;
const BASE_DELAY_MS: u64 = 1000;

/// Kupo indexer client.
pub struct KupoApi {
    api_url: String,
    client: reqwest::Client,
}

impl KupoApi {
    pub fn new(api_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300)) // large script addresses take a while
            .build()?;
        Ok(Self::with_client(api_url, client))
    }

    pub fn with_client(api_url: &str, client: reqwest::Client) -> Self {
        Self {
            api_url: crate::utils::remove_trailing_slash(api_url),
            client,
        }
    }

    fn build_matches_url(&self, match_pattern: &str, unspent: bool) -> String {
        let base = format!("{}/matches/{}", self.api_url, match_pattern);
        if unspent {
            format!("{}?unspent", base)
        } else {
            base
        }
    }

    fn build_datum_url(&self, hash: &str) -> String {
        format!("{}/datums/{}", self.api_url, hash)
    }

    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value> {
        let response = self.client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(anyhow::anyhow!("rate_limited"));
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Matches for a Kupo pattern (address, `idx@tx`, ...).
    pub async fn get(&self, match_pattern: &str, unspent: bool) -> Result<Vec<Utxo>> {
        let url = self.build_matches_url(match_pattern, unspent);
        crate::utils::retry(RETRIES, BASE_DELAY_MS, || async {
            let parsed = self.fetch_json(&url).await?;
            let values = match parsed {
                serde_json::Value::Array(arr) => arr,
                other => vec![other],
            };
            values.iter().map(parse_match).collect()
        })
        .await
    }

    pub async fn datum(&self, hash: &str) -> Result<String> {
        let url = self.build_datum_url(hash);
        crate::utils::retry(RETRIES, BASE_DELAY_MS, || async {
            let response = self.fetch_json(&url).await?;
            let datum = response
                .get("datum")
                .and_then(|d| d.as_str())
                .ok_or_else(|| anyhow::anyhow!("No datum found for {}", hash))?;
            Ok(datum.to_string())
        })
        .await
    }
}

fn quantity(v: &serde_json::Value) -> Result<u64> {
    if let Some(s) = v.as_str() {
        Ok(s.parse()?)
    } else {
        v.as_u64()
            .ok_or_else(|| anyhow::anyhow!("invalid quantity {}", v))
    }
}

/// Convert one Kupo match object into a `Utxo`.
fn parse_match(v: &serde_json::Value) -> Result<Utxo> {
    let field = |name: &str| v.get(name).and_then(|a| a.as_str());
    let address = field("address")
        .ok_or_else(|| anyhow::anyhow!("match without address: {}", v))?
        .to_string();
    let tx_hash = field("transaction_id")
        .ok_or_else(|| anyhow::anyhow!("match without transaction_id: {}", v))?
        .to_string();
    let output_index = v
        .get("output_index")
        .and_then(|a| a.as_u64())
        .ok_or_else(|| anyhow::anyhow!("match without output_index: {}", v))? as u32;

    let raw_value = v.get("value").unwrap_or(&serde_json::Value::Null);
    let mut value = Value::lovelace(match raw_value.get("coins") {
        Some(c) => quantity(c)?,
        None => 0,
    });
    if let Some(assets) = raw_value.get("assets").and_then(|a| a.as_object()) {
        for (unit, qty) in assets {
            // Kupo writes units as `policy.name`, or bare `policy` for an empty name.
            let asset = Asset::from_identifier(unit)
                .ok_or_else(|| anyhow::anyhow!("malformed asset unit {:?}", unit))?;
            value.add_token(&Token::Asset(asset), quantity(qty)?);
        }
    }

    Ok(Utxo {
        address,
        tx_hash,
        output_index,
        value,
        data_hash: field("datum_hash").map(String::from),
        inline_datum: None,
        reference_script_hash: field("script_hash").map(String::from),
    })
}

#[async_trait]
impl UtxoSource for KupoApi {
    async fn utxos_at(&self, address: &str) -> Result<Vec<Utxo>> {
        self.get(address, true).await
    }

    async fn utxos_by_out_ref(&self, out_refs: &[OutRef]) -> Result<Vec<Utxo>> {
        let mut found = Vec::with_capacity(out_refs.len());
        for out_ref in out_refs {
            found.extend(self.get(&out_ref.kupo_pattern(), true).await?);
        }
        Ok(found)
    }

    async fn datum(&self, hash: &str) -> Result<String> {
        KupoApi::datum(self, hash).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_drop_trailing_slash() {
        let kupo = KupoApi::with_client("http://localhost:1442/", reqwest::Client::new());
        assert_eq!(
            kupo.build_matches_url("0@abcd", true),
            "http://localhost:1442/matches/0@abcd?unspent"
        );
        assert_eq!(kupo.build_datum_url("ff"), "http://localhost:1442/datums/ff");
    }

    #[test]
    fn parses_kupo_match() {
        let json = serde_json::json!({
            "transaction_index": 3,
            "transaction_id": "a1b2",
            "output_index": 1,
            "address": "addr_test1wqxyz",
            "value": {
                "coins": 2000010,
                "assets": {
                    "f13ac4d66b3ee19a6aa0f2a22298737bd907cc95121662fc971b5275.746f6b656e42": "5"
                }
            },
            "datum_hash": "cafe",
            "datum_type": "inline",
            "script_hash": null,
            "created_at": {"slot_no": 1, "header_hash": "00"},
            "spent_at": null
        });
        let utxo = parse_match(&json).unwrap();
        assert_eq!(utxo.out_ref(), OutRef::new("a1b2", 1));
        assert_eq!(utxo.value.coin, 2_000_010);
        let token = Token::Asset(Asset::from_text(
            "f13ac4d66b3ee19a6aa0f2a22298737bd907cc95121662fc971b5275",
            "tokenB",
        ));
        assert_eq!(utxo.quantity_of(&token), 5);
        assert_eq!(utxo.data_hash.as_deref(), Some("cafe"));
        assert!(utxo.reference_script_hash.is_none());
    }

    #[test]
    fn malformed_asset_unit_is_an_error() {
        let json = serde_json::json!({
            "transaction_id": "a1b2",
            "output_index": 0,
            "address": "addr_test1wqxyz",
            "value": {
                "coins": 2000000,
                "assets": {"f13ac4d66b3ee19a6aa0f2a22298737bd907cc95121662fc971b527é.00": "1"}
            }
        });
        let err = parse_match(&json).unwrap_err();
        assert!(err.to_string().contains("malformed asset unit"));
    }

    #[test]
    fn rejects_match_without_outpoint() {
        assert!(parse_match(&serde_json::json!({"address": "addr1"})).is_err());
    }
}
