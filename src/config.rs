//! Runtime configuration.
//!
//! Loaded from a TOML file, from `ESCROW_*` environment variables, or from a
//! file with environment overrides applied on top.
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::credentials::Network;
use crate::error::{OrderError, Result};

pub const DEFAULT_KUPO_URL: &str = "http://127.0.0.1:1442";
pub const DEFAULT_SUBMIT_URL: &str = "https://cardano-preprod.blockfrost.io/api/v0";

/// Native amount locked in every order output next to the control token.
pub const MIN_ORDER_LOVELACE: u64 = 2_000_000;

/// CIP-20 message metadata label.
pub const METADATA_LABEL: u64 = 674;

/// Name of the control (uniqueness) token, as text.
pub const CONTROL_TOKEN_NAME: &str = "controlToken";

/// Always-failing script used as the lock address for reference scripts.
pub const BURN_SCRIPT_HEX: &str =
    "581f581d01000022232632498cd5ce24810b6974206275726e7321212100120011";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: Network,
    pub kupo_url: String,
    pub submit_url: String,
    pub blockfrost_project_id: Option<String>,
    /// Hash of the deploy transaction whose output 0 holds the validator reference script.
    pub reference_tx_hash: Option<String>,
    /// Compiled order validator (CBOR hex, as found in the blueprint's `compiledCode`).
    pub validator_cbor_hex: String,
    pub min_order_lovelace: u64,
    pub metadata_label: u64,
    /// Blocks a close event may wait for its matching open event before being dropped.
    pub pending_close_budget: u32,
    /// Where the mirror snapshot is saved between runs.
    pub snapshot_path: Option<String>,
    pub protocol: ProtocolParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::Preprod,
            kupo_url: DEFAULT_KUPO_URL.to_string(),
            submit_url: DEFAULT_SUBMIT_URL.to_string(),
            blockfrost_project_id: None,
            reference_tx_hash: None,
            validator_cbor_hex: String::new(),
            min_order_lovelace: MIN_ORDER_LOVELACE,
            metadata_label: METADATA_LABEL,
            pending_close_budget: 20,
            snapshot_path: None,
            protocol: ProtocolParams::default(),
        }
    }
}

/// Ledger parameters needed to balance transactions offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolParams {
    pub min_fee_a: u64,
    pub min_fee_b: u64,
    pub coins_per_utxo_byte: u64,
    pub max_tx_size: usize,
    pub price_mem: Ratio,
    pub price_step: Ratio,
    pub collateral_percent: u64,
    /// Plutus V2 cost model, in ledger order.
    pub plutus_v2_cost_model: Vec<i64>,
    /// Execution budget reserved per spend of an order output.
    pub spend_ex_units: ExUnits,
    /// Execution budget reserved for the control-token mint or burn.
    pub mint_ex_units: ExUnits,
}

impl ProtocolParams {
    /// Script transactions hash the cost model into `script_data_hash`; it
    /// must match the ledger's, so an empty one is refused.
    pub fn check_cost_model(&self) -> Result<()> {
        if self.plutus_v2_cost_model.is_empty() {
            return Err(OrderError::Config(
                "protocol.plutus_v2_cost_model is empty; copy it from the network's protocol parameters"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            min_fee_a: 44,
            min_fee_b: 155_381,
            coins_per_utxo_byte: 4_310,
            max_tx_size: 16_384,
            price_mem: Ratio::new(577, 10_000),
            price_step: Ratio::new(721, 10_000_000),
            collateral_percent: 150,
            plutus_v2_cost_model: Vec::new(),
            spend_ex_units: ExUnits {
                mem: 2_000_000,
                steps: 700_000_000,
            },
            mint_ex_units: ExUnits {
                mem: 1_000_000,
                steps: 400_000_000,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratio {
    pub numerator: u64,
    pub denominator: u64,
}

impl Ratio {
    pub const fn new(numerator: u64, denominator: u64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// `ceil(self * quantity)`
    pub fn mul_ceil(&self, quantity: u64) -> u64 {
        if self.denominator == 0 {
            return 0;
        }
        let num = self.numerator as u128 * quantity as u128;
        let den = self.denominator as u128;
        num.div_ceil(den) as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExUnits {
    pub mem: u64,
    pub steps: u64,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| OrderError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let mut config: Config = toml::from_str(&text)
            .map_err(|e| OrderError::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("ESCROW_NETWORK") {
            self.network = v.parse()?;
        }
        if let Ok(v) = std::env::var("ESCROW_KUPO_URL") {
            self.kupo_url = v;
        }
        if let Ok(v) = std::env::var("ESCROW_SUBMIT_URL") {
            self.submit_url = v;
        }
        if let Ok(v) = std::env::var("BLOCKFROST_PROJECT_ID") {
            self.blockfrost_project_id = Some(v);
        }
        if let Ok(v) = std::env::var("ESCROW_REFERENCE_TX_HASH") {
            self.reference_tx_hash = Some(v);
        }
        if let Ok(v) = std::env::var("ESCROW_VALIDATOR") {
            self.validator_cbor_hex = v;
        }
        if let Ok(v) = std::env::var("ESCROW_SNAPSHOT_PATH") {
            self.snapshot_path = Some(v);
        }
        if let Ok(v) = std::env::var("ESCROW_PENDING_CLOSE_BUDGET") {
            self.pending_close_budget = v
                .parse()
                .map_err(|e| OrderError::Config(format!("ESCROW_PENDING_CLOSE_BUDGET: {}", e)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.validator_cbor_hex.is_empty() {
            return Err(OrderError::Config("validator_cbor_hex is not set".to_string()));
        }
        if self.min_order_lovelace == 0 {
            return Err(OrderError::Config("min_order_lovelace must be positive".to_string()));
        }
        self.protocol.check_cost_model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_rounds_up() {
        let r = Ratio::new(577, 10_000);
        assert_eq!(r.mul_ceil(10_000), 577);
        assert_eq!(r.mul_ceil(1), 1);
        assert_eq!(r.mul_ceil(0), 0);
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            network = "mainnet"
            validator_cbor_hex = "4e4d01000033222220051200120011"

            [protocol]
            min_fee_a = 50
            plutus_v2_cost_model = [205665, 812, 1, 1, 1000]
            "#,
        )
        .unwrap();
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.protocol.min_fee_a, 50);
        assert_eq!(config.protocol.min_fee_b, 155_381);
        assert_eq!(config.min_order_lovelace, MIN_ORDER_LOVELACE);
        assert_eq!(config.protocol.plutus_v2_cost_model.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_cost_model_is_rejected() {
        let config = Config {
            validator_cbor_hex: "4e4d01000033222220051200120011".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(OrderError::Config(msg)) if msg.contains("cost_model")));
    }

    #[test]
    fn missing_validator_is_rejected() {
        assert!(matches!(Config::default().validate(), Err(OrderError::Config(_))));
    }
}
