//! Submission of signed transactions.
//!
//! Failures are passed through verbatim, except the input-race class
//! (spending an output the node has not seen yet), which becomes
//! [`OrderError::MissingInput`].
use async_trait::async_trait;

use crate::error::{OrderError, Result};

const MISSING_INPUT_MARKERS: [&str; 3] = [
    "TranslationLogicMissingInput",
    "BadInputsUTxO",
    "MissingInput",
];

#[async_trait]
pub trait TxSubmitter: Send + Sync {
    /// Submit a signed transaction (CBOR bytes) and return its hash.
    async fn submit(&self, signed_tx: &[u8]) -> Result<String>;
}

/// Map a node or gateway error message onto the error taxonomy.
pub fn classify_submit_error(message: &str) -> OrderError {
    if MISSING_INPUT_MARKERS.iter().any(|m| message.contains(m)) {
        OrderError::MissingInput(message.to_string())
    } else {
        OrderError::Submit(message.to_string())
    }
}

/// Blockfrost `POST /tx/submit` client.
pub struct BlockfrostSubmitter {
    api_url: String,
    project_id: String,
    client: reqwest::Client,
}

impl BlockfrostSubmitter {
    pub fn new(api_url: &str, project_id: &str) -> Self {
        Self::with_client(api_url, project_id, reqwest::Client::new())
    }

    pub fn with_client(api_url: &str, project_id: &str, client: reqwest::Client) -> Self {
        Self {
            api_url: crate::utils::remove_trailing_slash(api_url),
            project_id: project_id.to_string(),
            client,
        }
    }

    fn submit_url(&self) -> String {
        format!("{}/tx/submit", self.api_url)
    }
}

#[async_trait]
impl TxSubmitter for BlockfrostSubmitter {
    async fn submit(&self, signed_tx: &[u8]) -> Result<String> {
        let response = self
            .client
            .post(self.submit_url())
            .header("project_id", &self.project_id)
            .header(reqwest::header::CONTENT_TYPE, "application/cbor")
            .body(signed_tx.to_vec())
            .send()
            .await
            .map_err(|e| OrderError::Submit(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| OrderError::Submit(e.to_string()))?;
        if !status.is_success() {
            tracing::warn!(%status, body = %body, "submission rejected");
            return Err(classify_submit_error(&body));
        }

        // Blockfrost answers with the hash as a JSON string.
        let tx_hash = serde_json::from_str::<String>(&body).unwrap_or_else(|_| body.trim().to_string());
        tracing::info!(tx_hash = %tx_hash, "transaction submitted");
        Ok(tx_hash)
    }
}
