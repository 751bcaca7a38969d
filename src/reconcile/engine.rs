//! Applies classified feed transactions to the order mirror.
//!
//! The feed gives no ordering or exactly-once guarantee: opens are upserts,
//! and a close whose order is not mirrored yet is parked under the spent
//! outpoint until the open shows up or its retry budget runs out.
use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::codec::{decode_datum_hex, OrderDatum};
use crate::context::OrderContext;
use crate::credentials::{address_of, credentials_of};
use crate::error::{OrderError, Result};
use crate::mirror::{CloseOutcome, Closure, NewOrder, OpenOutcome, OrderMirror};
use crate::models::{BlockEvent, OutRef, Token, TxEvent, TxOutputEvent, Value};
use crate::reconcile::classify::{classify, control_delta};

/// A close seen before its open.
#[derive(Debug, Clone)]
struct PendingClose {
    closing_tx: String,
    /// Output addresses of the closing transaction, minus the script address.
    payees: Vec<String>,
    /// Blocks waited so far.
    age: u32,
}

/// Control tokens burned by a closing transaction and how many of its
/// orders have been closed so far.
#[derive(Debug, Clone, Copy)]
struct CloseProgress {
    burned: usize,
    matched: usize,
}

/// Counters for one applied batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub opened: usize,
    pub replayed: usize,
    pub closed: usize,
    pub parked: usize,
    pub dropped: usize,
    pub skipped: usize,
}

impl BatchReport {
    pub fn merge(&mut self, other: &BatchReport) {
        self.opened += other.opened;
        self.replayed += other.replayed;
        self.closed += other.closed;
        self.parked += other.parked;
        self.dropped += other.dropped;
        self.skipped += other.skipped;
    }
}

pub struct Reconciler {
    ctx: Arc<OrderContext>,
    mirror: Arc<OrderMirror>,
    pending: DashMap<OutRef, PendingClose>,
    /// Closing transactions that still have parked inputs.
    closings: DashMap<String, CloseProgress>,
    pending_budget: u32,
}

impl Reconciler {
    pub fn new(ctx: Arc<OrderContext>, mirror: Arc<OrderMirror>, pending_budget: u32) -> Self {
        Self {
            ctx,
            mirror,
            pending: DashMap::new(),
            closings: DashMap::new(),
            pending_budget,
        }
    }

    pub fn mirror(&self) -> &Arc<OrderMirror> {
        &self.mirror
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Apply one confirmed block, then age parked closes.
    pub fn apply_block(&self, block: &BlockEvent) -> BatchReport {
        let mut report = self.apply_transactions(&block.transactions);
        report.dropped += self.age_pending();
        tracing::debug!(
            slot = ?block.slot,
            transactions = block.transactions.len(),
            ?report,
            "block reconciled"
        );
        report
    }

    pub fn replay(&self, blocks: &[BlockEvent]) -> BatchReport {
        let mut total = BatchReport::default();
        for block in blocks {
            total.merge(&self.apply_block(block));
        }
        total
    }

    /// Apply a batch of transactions without advancing the pending clock.
    pub fn apply_transactions(&self, txs: &[TxEvent]) -> BatchReport {
        let classified = classify(txs, &self.ctx.control_token);
        let mut report = BatchReport::default();
        for tx in classified.opens {
            self.apply_open(tx, &mut report);
        }
        for tx in classified.closes {
            self.apply_close(tx, &mut report);
        }
        report
    }

    fn apply_open(&self, tx: &TxEvent, report: &mut BatchReport) {
        let control = self.ctx.control_token();
        for (index, output) in tx.outputs.iter().enumerate() {
            if output.address != self.ctx.script_address {
                continue;
            }
            let value = output.value();
            if value.quantity_of(&control) != 1 {
                continue;
            }
            let out_ref = OutRef::new(&tx.hash, index as u32);
            let order = match self.order_from_output(&out_ref, output, &value) {
                Ok(order) => order,
                Err(e) => {
                    tracing::warn!(out_ref = %out_ref, error = %e, "skipping undecodable order output");
                    report.skipped += 1;
                    continue;
                }
            };
            let sender = order.sender.clone();
            let mut closed_by = None;
            let outcome = self.mirror.open_with(order, |key| {
                self.pending.remove(key).map(|(_, pending)| {
                    tracing::info!(
                        out_ref = %key,
                        closing_tx = %pending.closing_tx,
                        "applying close that arrived before its open"
                    );
                    let receiver = receiver_among(&pending.payees, &sender);
                    closed_by = Some(pending.closing_tx);
                    Closure { receiver }
                })
            });
            match outcome {
                OpenOutcome::Inserted => report.opened += 1,
                OpenOutcome::InsertedClosed => {
                    report.opened += 1;
                    report.closed += 1;
                    if let Some(closing_tx) = closed_by {
                        if self.note_match(&closing_tx) {
                            self.settle(&closing_tx);
                        }
                    }
                }
                OpenOutcome::Unchanged => report.replayed += 1,
            }
        }
    }

    fn apply_close(&self, tx: &TxEvent, report: &mut BatchReport) {
        let payees: Vec<String> = tx
            .outputs
            .iter()
            .map(|o| o.address.clone())
            .filter(|a| *a != self.ctx.script_address)
            .collect();

        // Every spent input is checked on its own: one transaction may close several orders.
        let burned = control_delta(tx, &self.ctx.control_token).unsigned_abs() as usize;
        self.closings
            .insert(tx.hash.clone(), CloseProgress { burned, matched: 0 });
        let mut parked = 0;
        for input in &tx.inputs {
            let out_ref = input.out_ref();
            let outcome = self.mirror.close_or_else(
                &out_ref,
                |sender| receiver_among(&payees, sender),
                || {
                    self.pending.insert(
                        out_ref.clone(),
                        PendingClose {
                            closing_tx: tx.hash.clone(),
                            payees: payees.clone(),
                            age: 0,
                        },
                    );
                },
            );
            match outcome {
                CloseOutcome::Closed => {
                    tracing::info!(out_ref = %out_ref, closing_tx = %tx.hash, "order closed");
                    report.closed += 1;
                    self.note_match(&tx.hash);
                }
                CloseOutcome::AlreadyClosed => {
                    report.replayed += 1;
                    self.note_match(&tx.hash);
                }
                CloseOutcome::Missing => parked += 1,
            }
        }

        // A missing entry means a late open already completed this close.
        let complete = self
            .closings
            .get(&tx.hash)
            .map_or(true, |p| p.matched >= p.burned);
        if complete {
            self.settle(&tx.hash);
        } else {
            tracing::debug!(closing_tx = %tx.hash, parked, "close parked until its open arrives");
            report.parked += parked;
        }
    }

    /// Count one more order closed by `closing_tx`. Returns true once every
    /// burned control token is matched.
    fn note_match(&self, closing_tx: &str) -> bool {
        match self.closings.get_mut(closing_tx) {
            Some(mut progress) => {
                progress.matched += 1;
                progress.matched >= progress.burned
            }
            None => false,
        }
    }

    /// Forget a fully matched close: its remaining parked inputs were plain
    /// wallet funds, not orders.
    fn settle(&self, closing_tx: &str) {
        self.closings.remove(closing_tx);
        self.pending.retain(|_, p| p.closing_tx != closing_tx);
    }

    /// Age parked closes by one block and drop those past the budget.
    fn age_pending(&self) -> usize {
        let budget = self.pending_budget;
        let mut dropped = 0;
        self.pending.retain(|out_ref, pending| {
            pending.age += 1;
            if pending.age > budget {
                tracing::warn!(
                    out_ref = %out_ref,
                    closing_tx = %pending.closing_tx,
                    blocks = pending.age,
                    "dropping close with no matching order; run a full rescan to repair"
                );
                dropped += 1;
                false
            } else {
                true
            }
        });
        let waiting: HashSet<String> = self.pending.iter().map(|p| p.closing_tx.clone()).collect();
        self.closings.retain(|hash, _| waiting.contains(hash));
        dropped
    }

    fn order_from_output(&self, out_ref: &OutRef, output: &TxOutputEvent, value: &Value) -> Result<NewOrder> {
        let cbor = output.inline_datum.as_deref().ok_or_else(|| {
            OrderError::Decoding(format!("order output {} has no inline datum", out_ref))
        })?;
        let datum = decode_datum_hex(cbor)?;
        if datum.control_token != self.ctx.control_token {
            return Err(OrderError::Decoding(format!(
                "order output {} names a foreign control token",
                out_ref
            )));
        }
        order_from_parts(&self.ctx, out_ref.clone(), &datum, value)
    }
}

/// Mirror row for an order output, recovering what was locked from its value.
///
/// Any native asset other than the control token is the sent asset;
/// otherwise the sender locked lovelace above the order deposit.
pub fn order_from_parts(
    ctx: &OrderContext,
    out_ref: OutRef,
    datum: &OrderDatum,
    value: &Value,
) -> Result<NewOrder> {
    let sender = address_of(ctx.network, &datum.sender)?;
    let sent = value
        .native_assets()
        .find(|(asset, _)| *asset != ctx.control_token)
        .map(|(asset, qty)| (Token::Asset(asset), qty))
        .unwrap_or_else(|| {
            (
                Token::Lovelace,
                value.coin.saturating_sub(ctx.min_order_lovelace),
            )
        });
    Ok(NewOrder {
        out_ref,
        sender,
        sent_asset: sent.0,
        sent_amount: sent.1,
        requested_asset: datum.requested_asset.clone(),
        requested_amount: datum.requested_quantity(),
    })
}

/// First payee that is not the order's sender.
///
/// Addresses are compared by payment credential, so a refund to the sender
/// under a different stake part is still the sender. Undecodable addresses
/// fall back to plain string comparison.
fn receiver_among(payees: &[String], sender: &str) -> Option<String> {
    let payment = |address: &str| credentials_of(address).ok().map(|c| c.payment);
    let sender_payment = payment(sender);
    payees
        .iter()
        .find(|p| match (&sender_payment, payment(p.as_str())) {
            (Some(ours), Some(theirs)) => *ours != theirs,
            _ => p.as_str() != sender,
        })
        .cloned()
}
