//! Transaction construction.
pub mod balance;
pub mod builder;
pub mod fee;
pub mod model;

pub use builder::{
    build_cancel, build_deploy, build_resolve, build_start, BuiltTx, DeployTx, StartParams, StartTx,
};
pub use model::{Metadata, Transaction, TxOutput};
