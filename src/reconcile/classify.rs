//! Open/close classification of feed transactions by the sign of their
//! control-token mint.
use crate::models::{Asset, TxEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    Open,
    Close,
}

/// Transactions of one batch that touch orders, split by kind.
#[derive(Debug, Default)]
pub struct Classified<'a> {
    pub opens: Vec<&'a TxEvent>,
    pub closes: Vec<&'a TxEvent>,
}

impl Classified<'_> {
    pub fn is_empty(&self) -> bool {
        self.opens.is_empty() && self.closes.is_empty()
    }
}

/// Net quantity of `control` minted (positive) or burned (negative) by `tx`.
pub fn control_delta(tx: &TxEvent, control: &Asset) -> i64 {
    tx.mint
        .iter()
        .filter(|m| m.is_unit(control))
        .map(|m| m.quantity)
        .sum()
}

pub fn kind_of(tx: &TxEvent, control: &Asset) -> Option<TxKind> {
    match control_delta(tx, control) {
        d if d > 0 => Some(TxKind::Open),
        d if d < 0 => Some(TxKind::Close),
        _ => None,
    }
}

/// Drop unrelated transactions and partition the rest into opens and closes.
pub fn classify<'a>(txs: &'a [TxEvent], control: &Asset) -> Classified<'a> {
    let (opens, closes): (Vec<_>, Vec<_>) = txs
        .iter()
        .filter_map(|tx| kind_of(tx, control).map(|k| (k, tx)))
        .partition(|(k, _)| *k == TxKind::Open);
    Classified {
        opens: opens.into_iter().map(|(_, tx)| tx).collect(),
        closes: closes.into_iter().map(|(_, tx)| tx).collect(),
    }
}
