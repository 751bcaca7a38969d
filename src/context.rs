//! Process-wide protocol context.
//!
//! Everything here is derived once at start-up (script address, policy id,
//! control-token unit, the reference-script handle) and never mutated
//! afterwards. Components receive it by reference, so tests can build their
//! own fixture contexts.
use serde::{Deserialize, Serialize};

use crate::config::{Config, ProtocolParams, BURN_SCRIPT_HEX, CONTROL_TOKEN_NAME};
use crate::credentials::{policy_id_of, script_address_of, token_unit_of, Network, PlutusScript};
use crate::error::{OrderError, Result};
use crate::models::{Asset, OutRef, Token};
use crate::source::UtxoSource;

/// Handle to the deployed copy of the validator, read (not re-embedded) by
/// order transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceScript {
    pub out_ref: OutRef,
    pub script_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrderContext {
    pub network: Network,
    pub validator: PlutusScript,
    pub script_address: String,
    pub policy_id: String,
    pub control_token: Asset,
    pub burn_address: String,
    pub params: ProtocolParams,
    pub min_order_lovelace: u64,
    pub metadata_label: u64,
    reference: Option<ReferenceScript>,
}

impl OrderContext {
    pub fn new(
        network: Network,
        validator: PlutusScript,
        params: ProtocolParams,
        min_order_lovelace: u64,
        metadata_label: u64,
    ) -> Result<Self> {
        let script_address = script_address_of(network, &validator)?;
        let policy_id = policy_id_of(&validator);
        let control_token = token_unit_of(&policy_id, &hex::encode(CONTROL_TOKEN_NAME));
        let burn_address = script_address_of(network, &PlutusScript::from_hex(BURN_SCRIPT_HEX)?)?;
        Ok(Self {
            network,
            validator,
            script_address,
            policy_id,
            control_token,
            burn_address,
            params,
            min_order_lovelace,
            metadata_label,
            reference: None,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        Self::new(
            config.network,
            PlutusScript::from_hex(&config.validator_cbor_hex)?,
            config.protocol.clone(),
            config.min_order_lovelace,
            config.metadata_label,
        )
    }

    pub fn with_reference(mut self, reference: ReferenceScript) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Look up output 0 of the deploy transaction and pin it as the reference script.
    pub async fn resolve_reference(self, source: &dyn UtxoSource, tx_hash: &str) -> Result<Self> {
        let out_ref = OutRef::new(tx_hash, 0);
        let found = source.utxos_by_out_ref(std::slice::from_ref(&out_ref)).await?;
        let utxo = found
            .into_iter()
            .next()
            .ok_or(OrderError::MissingReferenceScript)?;
        match &utxo.reference_script_hash {
            Some(hash) if hash.eq_ignore_ascii_case(&self.policy_id) => {}
            other => {
                tracing::warn!(
                    out_ref = %out_ref,
                    found = ?other,
                    expected = %self.policy_id,
                    "reference UTxO does not hold the order validator"
                );
                return Err(OrderError::MissingReferenceScript);
            }
        }
        tracing::info!(out_ref = %out_ref, "reference script resolved");
        Ok(self.with_reference(ReferenceScript {
            out_ref,
            script_hash: utxo.reference_script_hash,
        }))
    }

    pub fn reference(&self) -> Result<&ReferenceScript> {
        self.reference.as_ref().ok_or(OrderError::MissingReferenceScript)
    }

    pub fn control_token(&self) -> Token {
        Token::Asset(self.control_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{METADATA_LABEL, MIN_ORDER_LOVELACE};
    use crate::models::{Utxo, Value};
    use crate::source::MemoryUtxoSource;

    const TEST_VALIDATOR: &str = "4e4d01000033222220051200120011";

    fn ctx() -> OrderContext {
        OrderContext::new(
            Network::Preprod,
            PlutusScript::from_hex(TEST_VALIDATOR).unwrap(),
            ProtocolParams::default(),
            MIN_ORDER_LOVELACE,
            METADATA_LABEL,
        )
        .unwrap()
    }

    #[test]
    fn derives_script_identity() {
        let ctx = ctx();
        assert!(ctx.script_address.starts_with("addr_test1w"));
        assert_eq!(ctx.control_token.policy_id, ctx.policy_id);
        assert_eq!(ctx.control_token.asset_name(), "controlToken");
        assert_ne!(ctx.burn_address, ctx.script_address);
        assert!(matches!(ctx.reference(), Err(OrderError::MissingReferenceScript)));
    }

    fn deploy_output(tx_hash: &str, script_hash: Option<String>) -> Utxo {
        Utxo {
            address: "addr_test1wburn".to_string(),
            tx_hash: tx_hash.to_string(),
            output_index: 0,
            value: Value::lovelace(20_000_000),
            data_hash: None,
            inline_datum: None,
            reference_script_hash: script_hash,
        }
    }

    #[tokio::test]
    async fn reference_must_hold_the_validator() {
        let ctx = ctx();
        let deploy = "cd".repeat(32);
        let source = MemoryUtxoSource::new(vec![deploy_output(&deploy, None)]);
        let result = ctx.resolve_reference(&source, &deploy).await;
        assert!(matches!(result, Err(OrderError::MissingReferenceScript)));

        let ctx = self::ctx();
        let source = MemoryUtxoSource::new(vec![deploy_output(&deploy, Some("00".repeat(28)))]);
        let result = ctx.resolve_reference(&source, &deploy).await;
        assert!(matches!(result, Err(OrderError::MissingReferenceScript)));
    }

    #[tokio::test]
    async fn reference_with_matching_hash_is_pinned() {
        let ctx = ctx();
        let deploy = "cd".repeat(32);
        let hash = ctx.policy_id.to_uppercase();
        let source = MemoryUtxoSource::new(vec![deploy_output(&deploy, Some(hash.clone()))]);
        let ctx = ctx.resolve_reference(&source, &deploy).await.unwrap();
        let reference = ctx.reference().unwrap();
        assert_eq!(reference.out_ref, OutRef::new(&deploy, 0));
        assert_eq!(reference.script_hash.as_deref(), Some(hash.as_str()));
    }

    #[tokio::test]
    async fn unknown_deploy_transaction_is_missing() {
        let result = ctx().resolve_reference(&MemoryUtxoSource::default(), &"cd".repeat(32)).await;
        assert!(matches!(result, Err(OrderError::MissingReferenceScript)));
    }
}
