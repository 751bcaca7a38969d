//! Order datum codec.
//!
//! Wire shape (all constructors are alternative 0):
//!   Constr0[
//!     Constr0[                          ← sender info
//!       bytes,                          ← sender payment key hash
//!       bytes,                          ← sender staking key hash (may be empty)
//!       Constr0[                        ← requested value
//!         Constr0[bytes, bytes],        ← requested asset (policy, name); ("", "") = lovelace
//!         int,                          ← requested amount
//!       ],
//!     ],
//!     Constr0[bytes, bytes],            ← control token (policy, name)
//!   ]
use ciborium::value::Value;
use serde::{Deserialize, Serialize};

use super::cbor::{
    asset_constr, constr, decode_cbor_bytes, encode_cbor, expect_constr, hex_to_value,
    parse_asset_constr, value_to_hex, value_to_i64,
};
use crate::error::{OrderError, Result};
use crate::models::{Asset, Credentials, Token};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDatum {
    pub sender: Credentials,
    pub requested_asset: Token,
    pub requested_amount: i64,
    /// Uniqueness token that must sit in the order output.
    pub control_token: Asset,
}

impl OrderDatum {
    /// Requested amount as an unsigned quantity; decoding already rejects negatives.
    pub fn requested_quantity(&self) -> u64 {
        self.requested_amount.max(0).unsigned_abs()
    }
}

pub fn encode_datum(datum: &OrderDatum) -> Result<Vec<u8>> {
    encode_cbor(&datum_to_plutus(datum)?).map_err(|e| OrderError::Encoding(e.to_string()))
}

/// Validated Plutus data form of a datum, for embedding in an output.
pub fn datum_to_plutus(datum: &OrderDatum) -> Result<Value> {
    if datum.requested_amount < 0 {
        return Err(OrderError::Encoding(format!(
            "requested amount must not be negative, got {}",
            datum.requested_amount
        )));
    }
    if let Token::Asset(a) = &datum.requested_asset {
        a.validate()?;
    }
    datum.control_token.validate()?;
    check_key_hash("sender payment", &datum.sender.payment, false)?;
    check_key_hash("sender staking", &datum.sender.staking, true)?;

    datum_value(datum).map_err(|e| OrderError::Encoding(e.to_string()))
}

pub fn encode_datum_hex(datum: &OrderDatum) -> Result<String> {
    encode_datum(datum).map(hex::encode)
}

fn datum_value(datum: &OrderDatum) -> anyhow::Result<Value> {
    let (req_policy, req_name) = datum.requested_asset.to_pair();
    let requested = constr(
        0,
        vec![
            asset_constr(&req_policy, &req_name)?,
            Value::Integer(datum.requested_amount.into()),
        ],
    );
    let sender_info = constr(
        0,
        vec![
            hex_to_value(&datum.sender.payment)?,
            hex_to_value(&datum.sender.staking)?,
            requested,
        ],
    );
    let control = asset_constr(&datum.control_token.policy_id, &datum.control_token.name_hex)?;
    Ok(constr(0, vec![sender_info, control]))
}

fn check_key_hash(label: &str, hash_hex: &str, allow_empty: bool) -> Result<()> {
    let bytes = hex::decode(hash_hex)
        .map_err(|e| OrderError::Encoding(format!("{} hash {:?}: {}", label, hash_hex, e)))?;
    if (allow_empty && bytes.is_empty()) || bytes.len() == 28 {
        Ok(())
    } else {
        Err(OrderError::Encoding(format!(
            "{} hash must be 28 bytes, got {}",
            label,
            bytes.len()
        )))
    }
}

pub fn decode_datum(bytes: &[u8]) -> Result<OrderDatum> {
    let value = decode_cbor_bytes(bytes).map_err(|e| OrderError::Decoding(e.to_string()))?;
    parse_datum(&value).map_err(|e| OrderError::Decoding(e.to_string()))
}

pub fn decode_datum_hex(cbor_hex: &str) -> Result<OrderDatum> {
    let bytes = hex::decode(cbor_hex)
        .map_err(|e| OrderError::Decoding(format!("datum is not hex: {}", e)))?;
    decode_datum(&bytes)
}

fn parse_datum(value: &Value) -> anyhow::Result<OrderDatum> {
    let outer = expect_constr(value, 0, 2)?;
    let info = expect_constr(&outer[0], 0, 3)?;

    let payment = value_to_hex(&info[0])?;
    let staking = value_to_hex(&info[1])?;

    let requested = expect_constr(&info[2], 0, 2)?;
    let (req_policy, req_name) = parse_asset_constr(&requested[0])?;
    let requested_amount = value_to_i64(&requested[1])?;
    if requested_amount < 0 {
        anyhow::bail!("negative requested amount {}", requested_amount);
    }

    let (ctl_policy, ctl_name) = parse_asset_constr(&outer[1])?;
    if ctl_policy.is_empty() {
        anyhow::bail!("control token has an empty policy id");
    }

    Ok(OrderDatum {
        sender: Credentials::new(&payment, &staking),
        requested_asset: Token::from_pair(&req_policy, &req_name),
        requested_amount,
        control_token: Asset::new(&ctl_policy, &ctl_name),
    })
}

/// Display shape of a datum for feed consumers: sender address and what is requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatumInfo {
    pub sender_address: String,
    pub requested_asset: Token,
    pub requested_amount: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PAYMENT: &str = "9a1c7ee1e3e6b1a6b1c6e3b5a0d7e0c2a39f0dd2e5a07c6aa5e1fc2b";
    const STAKING: &str = "5d1e3b5a0d7e0c2a39f0dd2e5a07c6aa5e1fc2b9a1c7ee1e3e6b1a6b";
    const POLICY_A: &str = "f13ac4d66b3ee19a6aa0f2a22298737bd907cc95121662fc971b5275";
    const CONTROL_POLICY: &str = "feac2e2378bcf87cd735a6e1996c236ef40ae26e1d7176a5dae2864b";

    fn sample(requested: Token, amount: i64) -> OrderDatum {
        OrderDatum {
            sender: Credentials::new(PAYMENT, STAKING),
            requested_asset: requested,
            requested_amount: amount,
            control_token: Asset::from_text(CONTROL_POLICY, "controlToken"),
        }
    }

    #[test]
    fn scenario_tokenb_request_decodes() {
        let datum = sample(Token::Asset(Asset::from_text(POLICY_A, "tokenB")), 5);
        let decoded = decode_datum(&encode_datum(&datum).unwrap()).unwrap();
        assert_eq!(decoded.requested_amount, 5);
        assert_eq!(
            decoded.requested_asset,
            Token::Asset(Asset::from_text(POLICY_A, "tokenB"))
        );
        assert_eq!(decoded, datum);
    }

    #[test]
    fn lovelace_sentinel_round_trips() {
        let datum = sample(Token::Lovelace, 7_000_000);
        let bytes = encode_datum(&datum).unwrap();
        assert_eq!(decode_datum(&bytes).unwrap().requested_asset, Token::Lovelace);
    }

    #[test]
    fn empty_staking_is_allowed() {
        let mut datum = sample(Token::Lovelace, 1);
        datum.sender.staking = String::new();
        let decoded = decode_datum(&encode_datum(&datum).unwrap()).unwrap();
        assert!(!decoded.sender.has_staking());
    }

    #[test]
    fn legacy_lovelace_name_is_normalized() {
        let value = constr(
            0,
            vec![
                constr(
                    0,
                    vec![
                        hex_to_value(PAYMENT).unwrap(),
                        hex_to_value(STAKING).unwrap(),
                        constr(
                            0,
                            vec![
                                asset_constr("", &hex::encode("lovelace")).unwrap(),
                                Value::Integer(3.into()),
                            ],
                        ),
                    ],
                ),
                asset_constr(CONTROL_POLICY, &hex::encode("controlToken")).unwrap(),
            ],
        );
        let bytes = encode_cbor(&value).unwrap();
        assert_eq!(decode_datum(&bytes).unwrap().requested_asset, Token::Lovelace);
    }

    #[test]
    fn encode_rejects_negative_amount() {
        let datum = sample(Token::Lovelace, -1);
        assert!(matches!(encode_datum(&datum), Err(OrderError::Encoding(_))));
    }

    #[test]
    fn encode_rejects_long_asset_name() {
        let datum = sample(Token::Asset(Asset::new(POLICY_A, &"00".repeat(33))), 1);
        assert!(matches!(encode_datum(&datum), Err(OrderError::Encoding(_))));
    }

    #[test]
    fn decode_rejects_wrong_constructor() {
        let bytes = encode_cbor(&constr(1, vec![])).unwrap();
        assert!(matches!(decode_datum(&bytes), Err(OrderError::Decoding(_))));
    }

    #[test]
    fn decode_rejects_missing_field() {
        let value = constr(0, vec![asset_constr(CONTROL_POLICY, "").unwrap()]);
        let bytes = encode_cbor(&value).unwrap();
        assert!(matches!(decode_datum(&bytes), Err(OrderError::Decoding(_))));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode_datum(&[0xff, 0x00]), Err(OrderError::Decoding(_))));
        assert!(matches!(decode_datum_hex("zz"), Err(OrderError::Decoding(_))));
    }

    fn hash28() -> impl Strategy<Value = String> {
        proptest::collection::vec(any::<u8>(), 28).prop_map(hex::encode)
    }

    fn token() -> impl Strategy<Value = Token> {
        prop_oneof![
            Just(Token::Lovelace),
            (hash28(), proptest::collection::vec(any::<u8>(), 0..=32))
                .prop_map(|(p, n)| Token::Asset(Asset::new(&p, &hex::encode(n)))),
        ]
    }

    proptest! {
        #[test]
        fn datum_round_trip(
            payment in hash28(),
            staking in prop_oneof![Just(String::new()), hash28()],
            requested in token(),
            amount in 0i64..=i64::MAX,
            control_policy in hash28(),
            control_name in proptest::collection::vec(any::<u8>(), 0..=32),
        ) {
            let datum = OrderDatum {
                sender: Credentials::new(&payment, &staking),
                requested_asset: requested,
                requested_amount: amount,
                control_token: Asset::new(&control_policy, &hex::encode(control_name)),
            };
            let decoded = decode_datum(&encode_datum(&datum).unwrap()).unwrap();
            prop_assert_eq!(decoded, datum);
        }
    }
}
