//! Plutus-data codecs for the order datum and redeemers.
pub mod cbor;
pub mod datum;
pub mod redeemer;

pub use datum::{
    datum_to_plutus, decode_datum, decode_datum_hex, encode_datum, encode_datum_hex, DatumInfo,
    OrderDatum,
};
pub use redeemer::{decode_redeemer, encode_redeemer, OrderAction, OrderRedeemer};
