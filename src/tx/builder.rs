//! Start, resolve, cancel and deploy builders.
//!
//! Builders are pure: they read the context and caller-supplied UTxO
//! snapshots and return a balanced, unsigned transaction. Nothing here
//! touches the network.
use serde::{Deserialize, Serialize};

use crate::codec::cbor::constr;
use crate::codec::{datum_to_plutus, OrderAction, OrderDatum, OrderRedeemer};
use crate::context::OrderContext;
use crate::credentials::{address_of, credentials_of};
use crate::error::{OrderError, Result};
use crate::models::{Mint, OutRef, Token, Utxo, Value};
use crate::source::order_datum_of;
use crate::tx::balance::{balance, Draft, ScriptInput};
use crate::tx::fee::min_lovelace;
use crate::tx::model::{Metadata, Transaction, TxOutput};

pub const START_MESSAGE: &str = "Start Order";
pub const RESOLVE_MESSAGE: &str = "Resolve Order";
pub const CANCEL_MESSAGE: &str = "Cancel Order";

/// What the sender locks and what they want back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartParams {
    pub send_asset: Token,
    pub send_amount: u64,
    pub request_asset: Token,
    pub request_amount: u64,
}

/// A balanced transaction ready for external signing.
#[derive(Debug, Clone)]
pub struct BuiltTx {
    pub tx: Transaction,
    pub tx_hash: String,
    pub fee: u64,
}

impl BuiltTx {
    fn new(tx: Transaction) -> Result<Self> {
        Ok(Self {
            tx_hash: tx.hash()?,
            fee: tx.body.fee,
            tx,
        })
    }

    pub fn cbor(&self) -> Result<Vec<u8>> {
        self.tx.to_cbor()
    }

    pub fn cbor_hex(&self) -> Result<String> {
        self.cbor().map(hex::encode)
    }

    /// Net mint of `token` in this transaction.
    pub fn minted(&self, token: &Token) -> i64 {
        token
            .as_asset()
            .map(|a| self.tx.body.mint.quantity_of(a))
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct StartTx {
    pub built: BuiltTx,
    /// Index of the order output, known before the transaction is confirmed.
    pub output_index: u32,
    pub datum: OrderDatum,
}

impl StartTx {
    pub fn order_ref(&self) -> OutRef {
        OutRef::new(&self.built.tx_hash, self.output_index)
    }
}

#[derive(Debug, Clone)]
pub struct DeployTx {
    pub built: BuiltTx,
    pub policy_id: String,
    pub order_address: String,
    /// Outpoint of the reference script once the transaction lands.
    pub reference: OutRef,
}

/// Lock `params.send_amount` of `params.send_asset` at the script address
/// and mint one control token alongside it.
pub fn build_start(
    ctx: &OrderContext,
    params: &StartParams,
    sender_address: &str,
    wallet: &[Utxo],
) -> Result<StartTx> {
    let reference = ctx.reference()?;
    let sender = credentials_of(sender_address)?;
    let requested_amount = i64::try_from(params.request_amount).map_err(|_| {
        OrderError::Encoding(format!(
            "requested amount {} does not fit a Plutus integer",
            params.request_amount
        ))
    })?;

    let datum = OrderDatum {
        sender: sender.clone(),
        requested_asset: params.request_asset.clone(),
        requested_amount,
        control_token: ctx.control_token.clone(),
    };

    let locked = Value::lovelace(ctx.min_order_lovelace)
        .with_token(&params.send_asset, params.send_amount)
        .with_token(&ctx.control_token(), 1);
    let order_output =
        TxOutput::new(&ctx.script_address, locked).with_inline_datum(datum_to_plutus(&datum)?);
    let floor = min_lovelace(&order_output, &ctx.params)?;
    if order_output.value.coin < floor {
        return Err(OrderError::UnderfundedInput {
            needed: format!("{} lovelace in the order output", floor),
            available: format!("{} lovelace", order_output.value.coin),
        });
    }

    let draft = Draft {
        outputs: vec![order_output],
        mint: Mint::single(&ctx.control_token, 1),
        mint_redeemer: Some((ctx.policy_id.clone(), OrderRedeemer::Mint.to_plutus())),
        reference_inputs: vec![reference.out_ref.clone()],
        required_signers: vec![sender.payment.clone()],
        metadata: Some(Metadata::message(ctx.metadata_label, START_MESSAGE)),
        ..Draft::default()
    };
    let tx = balance(draft, wallet, sender_address, &ctx.params)?;

    let output_index = tx
        .body
        .outputs
        .iter()
        .position(|o| o.address == ctx.script_address)
        .ok_or_else(|| OrderError::Encoding("order output missing after balancing".to_string()))?
        as u32;
    let built = BuiltTx::new(tx)?;
    tracing::info!(
        tx_hash = %built.tx_hash,
        output_index,
        fee = built.fee,
        "built start transaction"
    );
    Ok(StartTx {
        built,
        output_index,
        datum,
    })
}

/// Spend `order` with `ResolveOrder`, burn its control token and pay the
/// requested amount to the sender recorded in the datum.
pub fn build_resolve(
    ctx: &OrderContext,
    order: &Utxo,
    receiver_address: &str,
    wallet: &[Utxo],
) -> Result<BuiltTx> {
    let reference = ctx.reference()?;
    let datum = live_order_datum(ctx, order)?;
    let receiver = credentials_of(receiver_address)?;
    let sender_address = address_of(ctx.network, &datum.sender)?;

    let mut payout = TxOutput::new(
        &sender_address,
        Value::default().with_token(&datum.requested_asset, datum.requested_quantity()),
    );
    payout.value.coin = payout.value.coin.max(min_lovelace(&payout, &ctx.params)?);

    let draft = Draft {
        script_inputs: vec![ScriptInput {
            utxo: order.clone(),
            redeemer: OrderRedeemer::Spend(OrderAction::ResolveOrder).to_plutus(),
        }],
        outputs: vec![payout],
        mint: Mint::single(&ctx.control_token, -1),
        mint_redeemer: Some((ctx.policy_id.clone(), OrderRedeemer::Mint.to_plutus())),
        reference_inputs: vec![reference.out_ref.clone()],
        required_signers: vec![receiver.payment],
        metadata: Some(Metadata::message(ctx.metadata_label, RESOLVE_MESSAGE)),
    };
    let built = BuiltTx::new(balance(draft, wallet, receiver_address, &ctx.params)?)?;
    tracing::info!(
        tx_hash = %built.tx_hash,
        order = %order.out_ref(),
        fee = built.fee,
        "built resolve transaction"
    );
    Ok(built)
}

/// Return a sender's locked funds.
///
/// The order is re-located among `script_utxos` by transaction hash; the
/// caller-supplied index is only a preference.
pub fn build_cancel(
    ctx: &OrderContext,
    out_ref: &OutRef,
    sender_address: &str,
    script_utxos: &[Utxo],
    wallet: &[Utxo],
) -> Result<BuiltTx> {
    let caller = credentials_of(sender_address)?;
    let order = locate_order(ctx, out_ref, script_utxos)?;
    let datum = live_order_datum(ctx, order)?;
    if datum.sender.payment != caller.payment {
        return Err(OrderError::Unauthorized {
            caller: sender_address.to_string(),
            out_ref: order.out_ref().to_string(),
        });
    }
    let reference = ctx.reference()?;

    let draft = Draft {
        script_inputs: vec![ScriptInput {
            utxo: order.clone(),
            redeemer: OrderRedeemer::Spend(OrderAction::CancelOrder).to_plutus(),
        }],
        mint: Mint::single(&ctx.control_token, -1),
        mint_redeemer: Some((ctx.policy_id.clone(), OrderRedeemer::Mint.to_plutus())),
        reference_inputs: vec![reference.out_ref.clone()],
        required_signers: vec![caller.payment],
        metadata: Some(Metadata::message(ctx.metadata_label, CANCEL_MESSAGE)),
        ..Draft::default()
    };
    let built = BuiltTx::new(balance(draft, wallet, sender_address, &ctx.params)?)?;
    tracing::info!(
        tx_hash = %built.tx_hash,
        order = %order.out_ref(),
        fee = built.fee,
        "built cancel transaction"
    );
    Ok(built)
}

/// Store the validator as a reference script at the unspendable burn address.
pub fn build_deploy(ctx: &OrderContext, wallet: &[Utxo], change_address: &str) -> Result<DeployTx> {
    let mut output = TxOutput::new(&ctx.burn_address, Value::default())
        .with_inline_datum(constr(0, vec![]))
        .with_script_ref(ctx.validator.clone());
    output.value.coin = min_lovelace(&output, &ctx.params)?;

    let draft = Draft {
        outputs: vec![output],
        ..Draft::default()
    };
    let built = BuiltTx::new(balance(draft, wallet, change_address, &ctx.params)?)?;
    let reference = OutRef::new(&built.tx_hash, 0);
    tracing::info!(
        tx_hash = %built.tx_hash,
        policy_id = %ctx.policy_id,
        "built deploy transaction"
    );
    Ok(DeployTx {
        built,
        policy_id: ctx.policy_id.clone(),
        order_address: ctx.script_address.clone(),
        reference,
    })
}

fn is_live_order(ctx: &OrderContext, utxo: &Utxo) -> bool {
    utxo.address == ctx.script_address && utxo.quantity_of(&ctx.control_token()) == 1
}

fn locate_order<'a>(ctx: &OrderContext, out_ref: &OutRef, script_utxos: &'a [Utxo]) -> Result<&'a Utxo> {
    let mut same_tx = script_utxos
        .iter()
        .filter(|u| u.tx_hash.eq_ignore_ascii_case(&out_ref.tx_hash) && is_live_order(ctx, u));
    let first = same_tx
        .next()
        .ok_or_else(|| OrderError::OrderNotFound(out_ref.to_string()))?;
    if first.output_index == out_ref.output_index {
        return Ok(first);
    }
    Ok(same_tx
        .find(|u| u.output_index == out_ref.output_index)
        .unwrap_or(first))
}

fn live_order_datum(ctx: &OrderContext, utxo: &Utxo) -> Result<OrderDatum> {
    if !is_live_order(ctx, utxo) {
        return Err(OrderError::OrderNotFound(utxo.out_ref().to_string()));
    }
    let datum = order_datum_of(utxo)?;
    if datum.control_token != ctx.control_token {
        return Err(OrderError::OrderNotFound(utxo.out_ref().to_string()));
    }
    Ok(datum)
}
