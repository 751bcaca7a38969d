//! # order-escrow-rs
//!
//! Peer-to-peer order escrow on Cardano. A sender locks an asset at the
//! order script address together with a datum naming what they want back;
//! anyone may resolve the order by paying that amount to the sender, or the
//! sender may cancel it. Each order output carries exactly one `controlToken`
//! minted by the validator, which is what makes it a genuine order.
//!
//! The crate covers the client side of that protocol:
//!
//! | Module | Role |
//! |--------|------|
//! | [`codec`] | Plutus-data codecs for the order datum and redeemers |
//! | [`credentials`] | Address ⇄ credential derivation, script hashes |
//! | [`tx`] | Start / resolve / cancel / deploy builders and balancing |
//! | [`mirror`] | Off-ledger relational mirror of order state |
//! | [`reconcile`] | Applies chain-event batches to the mirror |
//! | [`rescan`] | Rebuilds the mirror from the live UTxO set |
//! | [`kupo`] | Kupo client used as the UTxO source |
//! | [`submit`] | Blockfrost submission |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use order_escrow_rs::{Config, OrderService, StartParams, Token};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("escrow.toml")?;
//!     let service = OrderService::bootstrap(&config).await?;
//!
//!     service.reload().await?;
//!     for order in service.list_open_orders() {
//!         println!("{} wants {} {:?}", order.sender, order.requested_amount, order.requested_asset);
//!     }
//!
//!     let start = service
//!         .build_start(
//!             &StartParams {
//!                 send_asset: Token::Lovelace,
//!                 send_amount: 10_000_000,
//!                 request_asset: Token::Asset(order_escrow_rs::Asset::from_text(
//!                     "f13ac4d66b3ee19a6aa0f2a22298737bd907cc95121662fc971b5275",
//!                     "tokenB",
//!                 )),
//!                 request_amount: 5,
//!             },
//!             "addr_test1...",
//!         )
//!         .await?;
//!     println!("sign and submit: {}", start.built.cbor_hex()?);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod kupo;
pub mod mirror;
pub mod models;
pub mod reconcile;
pub mod rescan;
pub mod service;
pub mod source;
pub mod submit;
pub mod tx;
pub mod utils;

pub use config::Config;
pub use context::{OrderContext, ReferenceScript};
pub use error::{OrderError, Result};
pub use kupo::KupoApi;
pub use mirror::OrderMirror;
pub use models::{Asset, Order, OrderStatus, OutRef, Token, Utxo, Value};
pub use reconcile::Reconciler;
pub use service::OrderService;
pub use source::{MemoryUtxoSource, UtxoSource};
pub use tx::{BuiltTx, StartParams, StartTx};
