//! Async front door: fetches UTxO snapshots, hands them to the pure
//! builders, and exposes the mirror queries.
use std::path::Path;
use std::sync::Arc;

use crate::codec::{decode_datum_hex, DatumInfo};
use crate::config::Config;
use crate::context::OrderContext;
use crate::credentials::address_of;
use crate::error::{OrderError, Result};
use crate::kupo::KupoApi;
use crate::mirror::OrderMirror;
use crate::models::{BlockEvent, Order, OutRef, Utxo};
use crate::reconcile::{BatchReport, Reconciler};
use crate::rescan::{full_rescan, RescanReport};
use crate::source::{with_datum, UtxoSource};
use crate::submit::{BlockfrostSubmitter, TxSubmitter};
use crate::tx::{self, BuiltTx, DeployTx, StartParams, StartTx};

pub struct OrderService {
    ctx: Arc<OrderContext>,
    source: Arc<dyn UtxoSource>,
    submitter: Option<Arc<dyn TxSubmitter>>,
    reconciler: Reconciler,
}

impl OrderService {
    pub fn new(
        ctx: Arc<OrderContext>,
        source: Arc<dyn UtxoSource>,
        mirror: Arc<OrderMirror>,
        pending_close_budget: u32,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(ctx.clone(), mirror, pending_close_budget),
            ctx,
            source,
            submitter: None,
        }
    }

    pub fn with_submitter(mut self, submitter: Arc<dyn TxSubmitter>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    /// Wire up Kupo, Blockfrost and the mirror from configuration, resolving
    /// the reference script if a deploy transaction is configured.
    pub async fn bootstrap(config: &Config) -> Result<Self> {
        let kupo = Arc::new(KupoApi::new(&config.kupo_url)?);
        let mut ctx = OrderContext::from_config(config)?;
        match &config.reference_tx_hash {
            Some(hash) => ctx = ctx.resolve_reference(kupo.as_ref(), hash).await?,
            None => tracing::warn!("no reference transaction configured; order transactions cannot be built"),
        }

        let mirror = match &config.snapshot_path {
            Some(path) if Path::new(path).exists() => OrderMirror::load(path)?,
            _ => OrderMirror::new(),
        };

        let mut service = Self::new(
            Arc::new(ctx),
            kupo,
            Arc::new(mirror),
            config.pending_close_budget,
        );
        if let Some(project_id) = &config.blockfrost_project_id {
            service = service.with_submitter(Arc::new(BlockfrostSubmitter::new(
                &config.submit_url,
                project_id,
            )));
        }
        tracing::info!(
            script_address = %service.ctx.script_address,
            policy_id = %service.ctx.policy_id,
            "order service ready"
        );
        Ok(service)
    }

    pub fn context(&self) -> &OrderContext {
        &self.ctx
    }

    pub fn mirror(&self) -> &Arc<OrderMirror> {
        self.reconciler.mirror()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    async fn wallet(&self, address: &str) -> Result<Vec<Utxo>> {
        Ok(self.source.utxos_at(address).await?)
    }

    pub async fn build_start(&self, params: &StartParams, sender_address: &str) -> Result<StartTx> {
        let wallet = self.wallet(sender_address).await?;
        tx::build_start(&self.ctx, params, sender_address, &wallet)
    }

    pub async fn build_resolve(&self, out_ref: &OutRef, receiver_address: &str) -> Result<BuiltTx> {
        let order = self
            .source
            .utxos_by_out_ref(std::slice::from_ref(out_ref))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OrderError::OrderNotFound(out_ref.to_string()))?;
        let order = with_datum(self.source.as_ref(), order).await?;
        let wallet = self.wallet(receiver_address).await?;
        tx::build_resolve(&self.ctx, &order, receiver_address, &wallet)
    }

    pub async fn build_cancel(&self, out_ref: &OutRef, sender_address: &str) -> Result<BuiltTx> {
        let mut candidates = Vec::new();
        for utxo in self.source.utxos_at(&self.ctx.script_address).await? {
            if utxo.tx_hash.eq_ignore_ascii_case(&out_ref.tx_hash) {
                candidates.push(with_datum(self.source.as_ref(), utxo).await?);
            }
        }
        let wallet = self.wallet(sender_address).await?;
        tx::build_cancel(&self.ctx, out_ref, sender_address, &candidates, &wallet)
    }

    pub async fn build_deploy(&self, address: &str) -> Result<DeployTx> {
        let wallet = self.wallet(address).await?;
        tx::build_deploy(&self.ctx, &wallet, address)
    }

    pub fn list_open_orders(&self) -> Vec<Order> {
        self.mirror().list_open_orders()
    }

    pub fn list_order_history(&self, address: &str) -> Vec<Order> {
        self.mirror().list_order_history(address)
    }

    /// Full rescan of the script address into the mirror.
    pub async fn reload(&self) -> Result<RescanReport> {
        full_rescan(&self.ctx, self.source.as_ref(), self.mirror()).await
    }

    pub fn apply_block(&self, block: &BlockEvent) -> BatchReport {
        self.reconciler.apply_block(block)
    }

    pub async fn submit(&self, signed_tx_hex: &str) -> Result<String> {
        let submitter = self
            .submitter
            .as_ref()
            .ok_or_else(|| OrderError::Config("no submission endpoint configured".to_string()))?;
        let bytes = hex::decode(signed_tx_hex)
            .map_err(|e| OrderError::Submit(format!("transaction is not hex: {}", e)))?;
        submitter.submit(&bytes).await
    }

    pub fn datum_info(&self, cbor_hex: &str) -> Result<DatumInfo> {
        datum_info(&self.ctx, cbor_hex)
    }
}

/// Display shape of an order datum.
pub fn datum_info(ctx: &OrderContext, cbor_hex: &str) -> Result<DatumInfo> {
    let datum = decode_datum_hex(cbor_hex)?;
    Ok(DatumInfo {
        sender_address: address_of(ctx.network, &datum.sender)?,
        requested_amount: datum.requested_quantity(),
        requested_asset: datum.requested_asset,
    })
}
