pub mod asset;
pub mod credential;
pub mod event;
pub mod order;
pub mod utxo;
pub mod value;

pub use asset::{token_identifier, Asset, Token};
pub use credential::Credentials;
pub use event::{BlockEvent, MintEntry, OutputAsset, TxEvent, TxInputRef, TxOutputEvent};
pub use order::{Order, OrderStatus};
pub use utxo::{OutRef, Utxo};
pub use value::{Mint, Value};
