/// CBOR helpers for Plutus data, shared by the datum and redeemer codecs and
/// the transaction serializer.
///
/// Plutus constructors are CBOR-tagged arrays:
///   - alternatives 0..=6    → Tag(121 + alt, [fields...])
///   - alternatives 7..=127  → Tag(1280 + alt - 7, [fields...])
///   - anything larger       → Tag(102, [alt, [fields...]])
use anyhow::{anyhow, Result};
use ciborium::value::Value;

const CONSTR_SMALL_BASE: u64 = 121;
const CONSTR_LARGE_BASE: u64 = 1280;
const CONSTR_GENERAL: u64 = 102;

/// Build a Plutus constructor value.
pub fn constr(alternative: u64, fields: Vec<Value>) -> Value {
    match alternative {
        0..=6 => Value::Tag(CONSTR_SMALL_BASE + alternative, Box::new(Value::Array(fields))),
        7..=127 => Value::Tag(
            CONSTR_LARGE_BASE + alternative - 7,
            Box::new(Value::Array(fields)),
        ),
        _ => Value::Tag(
            CONSTR_GENERAL,
            Box::new(Value::Array(vec![
                Value::Integer(alternative.into()),
                Value::Array(fields),
            ])),
        ),
    }
}

/// Constructor alternative and its fields.
pub fn constr_parts(v: &Value) -> Result<(u64, &Vec<Value>)> {
    match v {
        Value::Tag(tag @ 121..=127, inner) => match inner.as_ref() {
            Value::Array(fields) => Ok((tag - CONSTR_SMALL_BASE, fields)),
            _ => Err(anyhow!("Expected array inside constr tag")),
        },
        Value::Tag(tag @ 1280..=1400, inner) => match inner.as_ref() {
            Value::Array(fields) => Ok((tag - CONSTR_LARGE_BASE + 7, fields)),
            _ => Err(anyhow!("Expected array inside constr tag")),
        },
        Value::Tag(CONSTR_GENERAL, inner) => match inner.as_ref() {
            Value::Array(pair) if pair.len() == 2 => {
                let alt = value_to_u64(&pair[0])?;
                match &pair[1] {
                    Value::Array(fields) => Ok((alt, fields)),
                    _ => Err(anyhow!("Expected field array in general constr")),
                }
            }
            _ => Err(anyhow!("Malformed general constr")),
        },
        _ => Err(anyhow!("Expected CBOR tag for constr, got {:?}", v)),
    }
}

/// Fields of a constructor that must be the given alternative.
pub fn expect_constr(v: &Value, alternative: u64, arity: usize) -> Result<&Vec<Value>> {
    let (alt, fields) = constr_parts(v)?;
    if alt != alternative {
        return Err(anyhow!(
            "Expected constructor {}, got constructor {}",
            alternative,
            alt
        ));
    }
    if fields.len() != arity {
        return Err(anyhow!(
            "Constructor {} expected {} fields, got {}",
            alternative,
            arity,
            fields.len()
        ));
    }
    Ok(fields)
}

/// Read a u64 from a ciborium Integer value.
pub fn value_to_u64(v: &Value) -> Result<u64> {
    match v {
        Value::Integer(i) => {
            let n: i128 = (*i).into();
            u64::try_from(n).map_err(|_| anyhow!("Integer out of u64 range: {}", n))
        }
        _ => Err(anyhow!("Expected integer, got {:?}", v)),
    }
}

/// Read a possibly-negative i64 from a ciborium Integer value.
pub fn value_to_i64(v: &Value) -> Result<i64> {
    match v {
        Value::Integer(i) => {
            let n: i128 = (*i).into();
            i64::try_from(n).map_err(|_| anyhow!("Integer out of i64 range: {}", n))
        }
        _ => Err(anyhow!("Expected integer, got {:?}", v)),
    }
}

/// Read bytes from a ciborium Bytes value and return them as a lowercase hex string.
pub fn value_to_hex(v: &Value) -> Result<String> {
    match v {
        Value::Bytes(b) => Ok(hex::encode(b)),
        _ => Err(anyhow!("Expected bytes, got {:?}", v)),
    }
}

/// Hex string to a CBOR byte string.
pub fn hex_to_value(hex_str: &str) -> Result<Value> {
    let bytes = hex::decode(hex_str).map_err(|e| anyhow!("invalid hex {:?}: {}", hex_str, e))?;
    Ok(Value::Bytes(bytes))
}

/// Parse the two-field constr that represents a Cardano asset: (policy_bytes, name_bytes).
/// Returns `(policy_hex, name_hex)`.
pub fn parse_asset_constr(v: &Value) -> Result<(String, String)> {
    let fields = expect_constr(v, 0, 2)?;
    let policy = value_to_hex(&fields[0])?;
    let name = value_to_hex(&fields[1])?;
    Ok((policy, name))
}

pub fn asset_constr(policy_hex: &str, name_hex: &str) -> Result<Value> {
    Ok(constr(0, vec![hex_to_value(policy_hex)?, hex_to_value(name_hex)?]))
}

pub fn decode_cbor_bytes(bytes: &[u8]) -> Result<Value> {
    ciborium::de::from_reader(bytes).map_err(|e| anyhow!("CBOR decode error: {}", e))
}

pub fn encode_cbor(v: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(v, &mut buf).map_err(|e| anyhow!("CBOR encode error: {}", e))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constr_tags() {
        assert!(matches!(constr(0, vec![]), Value::Tag(121, _)));
        assert!(matches!(constr(6, vec![]), Value::Tag(127, _)));
        assert!(matches!(constr(7, vec![]), Value::Tag(1280, _)));
        assert!(matches!(constr(200, vec![]), Value::Tag(102, _)));
        for alt in [0u64, 1, 6, 7, 100, 200] {
            let (decoded, fields) = constr_parts(&constr(alt, vec![])).map(|(a, f)| (a, f.len())).unwrap();
            assert_eq!((decoded, fields), (alt, 0));
        }
    }

    #[test]
    fn unit_constr_bytes() {
        // Constr 0 [] is d87980 on the wire.
        assert_eq!(hex::encode(encode_cbor(&constr(0, vec![])).unwrap()), "d87980");
    }

    #[test]
    fn expect_constr_checks_alternative() {
        let v = constr(1, vec![]);
        assert!(expect_constr(&v, 0, 0).is_err());
        assert!(expect_constr(&v, 1, 1).is_err());
        assert!(expect_constr(&v, 1, 0).is_ok());
    }

    #[test]
    fn negative_integer_is_not_u64() {
        let v = Value::Integer((-5i64).into());
        assert!(value_to_u64(&v).is_err());
        assert_eq!(value_to_i64(&v).unwrap(), -5);
    }
}
