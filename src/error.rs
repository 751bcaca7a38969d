use thiserror::Error;

/// Errors surfaced by the order escrow core.
///
/// Codec failures are never coerced into defaults: a datum that does not
/// match the schema must not reach the ledger, so it is always an error.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("datum encoding failed: {0}")]
    Encoding(String),

    #[error("datum decoding failed: {0}")]
    Decoding(String),

    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The outpoint is stale or already closed; usually someone else resolved it first.
    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("underfunded inputs: need {needed} lovelace-equivalent, available {available}")]
    UnderfundedInput { needed: String, available: String },

    #[error("reference script UTxO has not been resolved; run the deploy/bootstrap step first")]
    MissingReferenceScript,

    #[error("address {caller} is not the creator of order {out_ref}")]
    Unauthorized { caller: String, out_ref: String },

    #[error("Input missing. Please wait a few seconds and try again. ({0})")]
    MissingInput(String),

    #[error("transaction submission failed: {0}")]
    Submit(String),

    #[error("indexer request failed: {0}")]
    Indexer(#[from] anyhow::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, OrderError>;

impl OrderError {
    pub fn invalid_address(address: &str, reason: impl Into<String>) -> Self {
        OrderError::InvalidAddress {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// True for errors the caller can act on by retrying or picking another order.
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            OrderError::OrderNotFound(_)
                | OrderError::MissingInput(_)
                | OrderError::UnderfundedInput { .. }
                | OrderError::Unauthorized { .. }
        )
    }
}
