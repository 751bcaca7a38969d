use serde::{Deserialize, Serialize};

use crate::models::{OutRef, Token};

/// Lifecycle of an order as seen by the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Resolved,
    Canceled,
}

/// Denormalized view of one order, as returned by mirror queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub tx_hash: String,
    pub output_index: u32,
    /// Bech32 address rebuilt from the datum's sender credentials.
    pub sender: String,
    pub sent_asset: Token,
    pub sent_amount: u64,
    pub requested_asset: Token,
    pub requested_amount: u64,
    /// Set only when the order was resolved by a counterparty.
    pub receiver: Option<String>,
    pub consumed: bool,
}

impl Order {
    pub fn out_ref(&self) -> OutRef {
        OutRef::new(&self.tx_hash, self.output_index)
    }

    pub fn status(&self) -> OrderStatus {
        match (self.consumed, &self.receiver) {
            (false, _) => OrderStatus::Open,
            (true, Some(_)) => OrderStatus::Resolved,
            (true, None) => OrderStatus::Canceled,
        }
    }
}
