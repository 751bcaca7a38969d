//! Full-rescan loader: rebuilds the mirror from the UTxOs currently at the
//! script address, without the event feed.
use std::collections::HashSet;

use serde::Serialize;

use crate::context::OrderContext;
use crate::error::{OrderError, Result};
use crate::mirror::{CloseOutcome, NewOrder, OpenOutcome, OrderMirror};
use crate::models::OutRef;
use crate::reconcile::order_from_parts;
use crate::source::{order_datum_of, with_datum, UtxoSource};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RescanReport {
    /// Live orders found at the script address.
    pub found: usize,
    pub inserted: usize,
    /// Retired rows whose UTxO turned out to be live after all.
    pub reopened: usize,
    /// Mirror rows that were open but are gone from the ledger.
    pub retired: usize,
    pub skipped: usize,
}

/// Decode every genuine order output at the script address.
///
/// Outputs without exactly one control token, or whose datum does not
/// decode, are not orders and are skipped.
pub async fn scan_orders(ctx: &OrderContext, source: &dyn UtxoSource) -> Result<(Vec<NewOrder>, usize)> {
    let utxos = source.utxos_at(&ctx.script_address).await?;
    let control = ctx.control_token();
    let mut orders = Vec::new();
    let mut skipped = 0;

    for utxo in utxos {
        if utxo.quantity_of(&control) != 1 {
            skipped += 1;
            continue;
        }
        let out_ref = utxo.out_ref();
        let decoded = match with_datum(source, utxo).await {
            Ok(utxo) => order_datum_of(&utxo).and_then(|datum| {
                if datum.control_token != ctx.control_token {
                    return Err(OrderError::Decoding("foreign control token".to_string()));
                }
                order_from_parts(ctx, out_ref.clone(), &datum, &utxo.value)
            }),
            Err(e) => Err(e),
        };
        match decoded {
            Ok(order) => orders.push(order),
            Err(e) => {
                tracing::warn!(out_ref = %out_ref, error = %e, "skipping script output");
                skipped += 1;
            }
        }
    }
    Ok((orders, skipped))
}

/// Bring `mirror` in line with the ledger: insert orders it is missing,
/// reopen retired rows that are live again and retire open rows whose UTxO
/// no longer exists.
pub async fn full_rescan(
    ctx: &OrderContext,
    source: &dyn UtxoSource,
    mirror: &OrderMirror,
) -> Result<RescanReport> {
    let (orders, skipped) = scan_orders(ctx, source).await?;
    let live: HashSet<OutRef> = orders.iter().map(|o| o.out_ref.clone()).collect();
    let mut report = RescanReport {
        found: orders.len(),
        skipped,
        ..RescanReport::default()
    };

    for order in orders {
        let out_ref = order.out_ref.clone();
        match mirror.upsert_open(order) {
            OpenOutcome::Inserted => report.inserted += 1,
            OpenOutcome::Unchanged if mirror.reopen(&out_ref) => report.reopened += 1,
            _ => {}
        }
    }
    for out_ref in mirror.open_refs() {
        if !live.contains(&out_ref) && mirror.close(&out_ref, None) == CloseOutcome::Closed {
            report.retired += 1;
        }
    }

    tracing::info!(
        found = report.found,
        inserted = report.inserted,
        reopened = report.reopened,
        retired = report.retired,
        skipped = report.skipped,
        "full rescan complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_datum_hex, OrderDatum};
    use crate::config::{ProtocolParams, METADATA_LABEL, MIN_ORDER_LOVELACE};
    use crate::credentials::{Network, PlutusScript};
    use crate::models::{Asset, Credentials, Token, Utxo, Value};
    use crate::source::MemoryUtxoSource;

    const VALIDATOR: &str = "4e4d01000033222220051200120011";
    const ALICE: &str = "9a1c7ee1e3e6b1a6b1c6e3b5a0d7e0c2a39f0dd2e5a07c6aa5e1fc2b";
    const POLICY_A: &str = "f13ac4d66b3ee19a6aa0f2a22298737bd907cc95121662fc971b5275";

    fn ctx() -> OrderContext {
        OrderContext::new(
            Network::Preprod,
            PlutusScript::from_hex(VALIDATOR).unwrap(),
            ProtocolParams::default(),
            MIN_ORDER_LOVELACE,
            METADATA_LABEL,
        )
        .unwrap()
    }

    fn order_utxo(ctx: &OrderContext, seed: u8, value: Value) -> Utxo {
        let datum = OrderDatum {
            sender: Credentials::new(ALICE, ""),
            requested_asset: Token::Lovelace,
            requested_amount: 7_000_000,
            control_token: ctx.control_token.clone(),
        };
        Utxo {
            address: ctx.script_address.clone(),
            tx_hash: hex::encode([seed; 32]),
            output_index: 0,
            value,
            data_hash: None,
            inline_datum: Some(encode_datum_hex(&datum).unwrap()),
            reference_script_hash: None,
        }
    }

    #[tokio::test]
    async fn empty_address_yields_no_rows() {
        let ctx = ctx();
        let mirror = OrderMirror::new();
        let report = full_rescan(&ctx, &MemoryUtxoSource::default(), &mirror).await.unwrap();
        assert_eq!(report, RescanReport::default());
        assert!(mirror.is_empty());
    }

    #[tokio::test]
    async fn recovers_sent_asset_and_skips_strays() {
        let ctx = ctx();
        let token = Token::Asset(Asset::from_text(POLICY_A, "tokenB"));
        let source = MemoryUtxoSource::new(vec![
            order_utxo(
                &ctx,
                1,
                Value::lovelace(MIN_ORDER_LOVELACE).with_token(&token, 40).with_token(&ctx.control_token(), 1),
            ),
            order_utxo(&ctx, 2, Value::lovelace(MIN_ORDER_LOVELACE + 3_000_000).with_token(&ctx.control_token(), 1)),
            // plain payment to the script address
            order_utxo(&ctx, 3, Value::lovelace(9_000_000)),
        ]);
        let mirror = OrderMirror::new();
        let report = full_rescan(&ctx, &source, &mirror).await.unwrap();
        assert_eq!(report.found, 2);
        assert_eq!(report.skipped, 1);

        let open = mirror.list_open_orders();
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].sent_asset, token);
        assert_eq!(open[0].sent_amount, 40);
        assert_eq!(open[1].sent_asset, Token::Lovelace);
        assert_eq!(open[1].sent_amount, 3_000_000);
    }

    #[tokio::test]
    async fn vanished_orders_are_retired() {
        let ctx = ctx();
        let live = order_utxo(&ctx, 1, Value::lovelace(MIN_ORDER_LOVELACE + 5).with_token(&ctx.control_token(), 1));
        let source = MemoryUtxoSource::new(vec![live.clone()]);
        let mirror = OrderMirror::new();
        full_rescan(&ctx, &source, &mirror).await.unwrap();

        source.spend(&[live.out_ref()]);
        let report = full_rescan(&ctx, &source, &mirror).await.unwrap();
        assert_eq!(report.retired, 1);
        let row = mirror.get(&live.out_ref()).unwrap();
        assert!(row.consumed);
        assert!(row.receiver.is_none());
    }

    #[tokio::test]
    async fn retired_order_seen_again_is_reopened() {
        let ctx = ctx();
        let live = order_utxo(&ctx, 1, Value::lovelace(MIN_ORDER_LOVELACE + 5).with_token(&ctx.control_token(), 1));
        let source = MemoryUtxoSource::new(vec![live.clone()]);
        let mirror = OrderMirror::new();
        full_rescan(&ctx, &source, &mirror).await.unwrap();

        // indexer briefly behind: the output looks spent
        source.spend(&[live.out_ref()]);
        assert_eq!(full_rescan(&ctx, &source, &mirror).await.unwrap().retired, 1);

        source.insert(live.clone());
        let report = full_rescan(&ctx, &source, &mirror).await.unwrap();
        assert_eq!(report.found, 1);
        assert_eq!(report.inserted, 0);
        assert_eq!(report.reopened, 1);
        assert!(!mirror.get(&live.out_ref()).unwrap().consumed);
        assert_eq!(mirror.list_open_orders().len(), 1);

        // steady state: nothing left to reopen
        let again = full_rescan(&ctx, &source, &mirror).await.unwrap();
        assert_eq!(again.reopened, 0);
    }
}
