//! Redeemers passed to the order validator.
//!
//! The validator is a multi-purpose script: the outer constructor says which
//! purpose is being exercised (0 = mint/burn the control token, 1 = spend an
//! order output) and, for spends, wraps the inner action tag.
use ciborium::value::Value;
use serde::{Deserialize, Serialize};

use super::cbor::{constr, constr_parts, decode_cbor_bytes, encode_cbor};
use crate::error::{OrderError, Result};

/// What a spender wants to do with an order output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderAction {
    CancelOrder,
    ResolveOrder,
}

impl OrderAction {
    fn alternative(self) -> u64 {
        match self {
            OrderAction::CancelOrder => 0,
            OrderAction::ResolveOrder => 1,
        }
    }
}

/// Full redeemer as seen by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderRedeemer {
    /// Control token mint or burn: `Constr 0 []`.
    Mint,
    /// Spending an order output: `Constr 1 [action]`.
    Spend(OrderAction),
}

const MINT_ALT: u64 = 0;
const SPEND_ALT: u64 = 1;

impl OrderRedeemer {
    pub fn to_plutus(self) -> Value {
        match self {
            OrderRedeemer::Mint => constr(MINT_ALT, vec![]),
            OrderRedeemer::Spend(action) => {
                constr(SPEND_ALT, vec![constr(action.alternative(), vec![])])
            }
        }
    }

    pub fn from_plutus(value: &Value) -> Result<Self> {
        let (outer, fields) =
            constr_parts(value).map_err(|e| OrderError::Decoding(e.to_string()))?;
        match (outer, fields.as_slice()) {
            (MINT_ALT, []) => Ok(OrderRedeemer::Mint),
            (SPEND_ALT, [inner]) => {
                let (alt, inner_fields) =
                    constr_parts(inner).map_err(|e| OrderError::Decoding(e.to_string()))?;
                if !inner_fields.is_empty() {
                    return Err(OrderError::Decoding(format!(
                        "order action takes no fields, got {}",
                        inner_fields.len()
                    )));
                }
                match alt {
                    0 => Ok(OrderRedeemer::Spend(OrderAction::CancelOrder)),
                    1 => Ok(OrderRedeemer::Spend(OrderAction::ResolveOrder)),
                    other => Err(OrderError::Decoding(format!("unknown order action {}", other))),
                }
            }
            (alt, fields) => Err(OrderError::Decoding(format!(
                "unexpected redeemer constructor {} with {} fields",
                alt,
                fields.len()
            ))),
        }
    }
}

pub fn encode_redeemer(redeemer: OrderRedeemer) -> Result<Vec<u8>> {
    encode_cbor(&redeemer.to_plutus()).map_err(|e| OrderError::Encoding(e.to_string()))
}

pub fn decode_redeemer(bytes: &[u8]) -> Result<OrderRedeemer> {
    let value = decode_cbor_bytes(bytes).map_err(|e| OrderError::Decoding(e.to_string()))?;
    OrderRedeemer::from_plutus(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_bytes_match_validator_shape() {
        // Constr 1 [Constr 0 []] and Constr 1 [Constr 1 []]
        assert_eq!(
            hex::encode(encode_redeemer(OrderRedeemer::Spend(OrderAction::CancelOrder)).unwrap()),
            "d87a81d87980"
        );
        assert_eq!(
            hex::encode(encode_redeemer(OrderRedeemer::Spend(OrderAction::ResolveOrder)).unwrap()),
            "d87a81d87a80"
        );
        assert_eq!(hex::encode(encode_redeemer(OrderRedeemer::Mint).unwrap()), "d87980");
    }

    #[test]
    fn decode_inverts_encode() {
        for r in [
            OrderRedeemer::Mint,
            OrderRedeemer::Spend(OrderAction::CancelOrder),
            OrderRedeemer::Spend(OrderAction::ResolveOrder),
        ] {
            assert_eq!(decode_redeemer(&encode_redeemer(r).unwrap()).unwrap(), r);
        }
    }

    #[test]
    fn bare_action_is_rejected() {
        // The inner tag without its envelope is a structural mismatch.
        let bytes = encode_cbor(&constr(1, vec![])).unwrap();
        assert!(decode_redeemer(&bytes).is_err());
    }
}
