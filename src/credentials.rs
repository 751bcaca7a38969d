//! Address ⇄ credential derivation, script hashes and token units.
//!
//! Shelley address layout: one header byte (upper nibble = address type,
//! lower nibble = network id) followed by the 28-byte payment credential and,
//! for base addresses, the 28-byte staking credential.
use bech32::{Bech32, Hrp};
use ciborium::value::Value;
use serde::{Deserialize, Serialize};

use crate::codec::cbor::{decode_cbor_bytes, encode_cbor};
use crate::error::{OrderError, Result};
use crate::models::{Asset, Credentials};
use crate::utils::blake2b_224;

const HASH_LEN: usize = 28;

/// Plutus V2 language tag prefixed to the script bytes before hashing.
const PLUTUS_V2_TAG: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Preprod,
    Preview,
}

impl Network {
    pub fn id(self) -> u8 {
        match self {
            Network::Mainnet => 1,
            Network::Preprod | Network::Preview => 0,
        }
    }

    pub fn hrp(self) -> &'static str {
        match self {
            Network::Mainnet => "addr",
            Network::Preprod | Network::Preview => "addr_test",
        }
    }
}

impl std::str::FromStr for Network {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "preprod" => Ok(Network::Preprod),
            "preview" => Ok(Network::Preview),
            other => Err(OrderError::Config(format!("unknown network {:?}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Credential {
    Key(String),
    Script(String),
}

impl Credential {
    pub fn hash(&self) -> &str {
        match self {
            Credential::Key(h) | Credential::Script(h) => h,
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(self, Credential::Script(_))
    }
}

/// Decoded Shelley address with a payment part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShelleyAddress {
    pub network_id: u8,
    pub payment: Credential,
    pub stake: Option<Credential>,
}

impl ShelleyAddress {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let stake_is_script = self.stake.as_ref().map(Credential::is_script);
        let kind: u8 = match (self.payment.is_script(), stake_is_script) {
            (false, Some(false)) => 0,
            (true, Some(false)) => 1,
            (false, Some(true)) => 2,
            (true, Some(true)) => 3,
            (false, None) => 6,
            (true, None) => 7,
        };
        let mut bytes = Vec::with_capacity(1 + 2 * HASH_LEN);
        bytes.push((kind << 4) | (self.network_id & 0x0f));
        bytes.extend(hash_bytes(self.payment.hash())?);
        if let Some(stake) = &self.stake {
            bytes.extend(hash_bytes(stake.hash())?);
        }
        Ok(bytes)
    }

    pub fn to_bech32(&self) -> Result<String> {
        let hrp = if self.network_id == Network::Mainnet.id() {
            Network::Mainnet.hrp()
        } else {
            Network::Preprod.hrp()
        };
        let bytes = self.to_bytes()?;
        let hrp = Hrp::parse(hrp).map_err(|e| OrderError::Encoding(format!("bech32 HRP error: {}", e)))?;
        bech32::encode::<Bech32>(hrp, &bytes)
            .map_err(|e| OrderError::Encoding(format!("bech32 encode error: {}", e)))
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            self.payment.hash(),
            self.stake.as_ref().map(Credential::hash).unwrap_or(""),
        )
    }
}

fn hash_bytes(hash_hex: &str) -> Result<Vec<u8>> {
    let bytes = hex::decode(hash_hex)
        .map_err(|e| OrderError::Encoding(format!("credential hash {:?}: {}", hash_hex, e)))?;
    if bytes.len() != HASH_LEN {
        return Err(OrderError::Encoding(format!(
            "credential hash must be {} bytes, got {}",
            HASH_LEN,
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Raw address bytes from bech32.
pub fn address_to_bytes(address: &str) -> Result<Vec<u8>> {
    let (_, bytes) = bech32::decode(address)
        .map_err(|e| OrderError::invalid_address(address, format!("bech32 decode error: {}", e)))?;
    Ok(bytes)
}

pub fn decode_address(address: &str) -> Result<ShelleyAddress> {
    let bytes = address_to_bytes(address)?;
    let header = *bytes
        .first()
        .ok_or_else(|| OrderError::invalid_address(address, "empty address"))?;
    let kind = header >> 4;
    let network_id = header & 0x0f;

    let cred_at = |offset: usize, script: bool| -> Result<Credential> {
        let raw = bytes
            .get(offset..offset + HASH_LEN)
            .ok_or_else(|| OrderError::invalid_address(address, "address payload too short"))?;
        let hash = hex::encode(raw);
        Ok(if script {
            Credential::Script(hash)
        } else {
            Credential::Key(hash)
        })
    };

    match kind {
        0..=3 => Ok(ShelleyAddress {
            network_id,
            payment: cred_at(1, kind & 0b01 != 0)?,
            stake: Some(cred_at(1 + HASH_LEN, kind & 0b10 != 0)?),
        }),
        // Pointer addresses: the pointer is not a staking credential.
        4 | 5 | 6 | 7 => Ok(ShelleyAddress {
            network_id,
            payment: cred_at(1, kind & 0b01 != 0)?,
            stake: None,
        }),
        14 | 15 => Err(OrderError::invalid_address(
            address,
            "reward address has no payment credential",
        )),
        _ => Err(OrderError::invalid_address(
            address,
            format!("unsupported address type {}", kind),
        )),
    }
}

/// Payment and staking key hashes of an address.
///
/// Fails with `InvalidAddress` when the address has no payment credential.
pub fn credentials_of(address: &str) -> Result<Credentials> {
    Ok(decode_address(address)?.credentials())
}

/// Rebuild the key-credential address of a wallet; an empty staking hash
/// yields an enterprise address.
pub fn address_of(network: Network, credentials: &Credentials) -> Result<String> {
    ShelleyAddress {
        network_id: network.id(),
        payment: Credential::Key(credentials.payment.clone()),
        stake: if credentials.has_staking() {
            Some(Credential::Key(credentials.staking.clone()))
        } else {
            None
        },
    }
    .to_bech32()
}

/// A compiled Plutus V2 script, held as the single-CBOR-wrapped flat program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlutusScript {
    bytes: Vec<u8>,
}

impl PlutusScript {
    /// Accepts the flat program wrapped once or twice in CBOR byte strings,
    /// or the raw flat bytes.
    pub fn from_hex(script_hex: &str) -> Result<Self> {
        let raw = hex::decode(script_hex)
            .map_err(|e| OrderError::Config(format!("script is not hex: {}", e)))?;
        let bytes = match decode_cbor_bytes(&raw) {
            Ok(Value::Bytes(inner)) => match decode_cbor_bytes(&inner) {
                Ok(Value::Bytes(_)) => inner,
                _ => raw,
            },
            _ => encode_cbor(&Value::Bytes(raw)).map_err(|e| OrderError::Config(e.to_string()))?,
        };
        Ok(Self { bytes })
    }

    /// Script bytes as they appear inside witness sets and script references.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn hash(&self) -> String {
        let mut tagged = Vec::with_capacity(self.bytes.len() + 1);
        tagged.push(PLUTUS_V2_TAG);
        tagged.extend_from_slice(&self.bytes);
        hex::encode(blake2b_224(&tagged))
    }
}

/// Enterprise address of a spending script.
pub fn script_address_of(network: Network, script: &PlutusScript) -> Result<String> {
    ShelleyAddress {
        network_id: network.id(),
        payment: Credential::Script(script.hash()),
        stake: None,
    }
    .to_bech32()
}

/// Policy id of a minting script (its script hash).
pub fn policy_id_of(script: &PlutusScript) -> String {
    script.hash()
}

/// Asset unit for a policy and hex asset name.
pub fn token_unit_of(policy_id: &str, name_hex: &str) -> Asset {
    Asset::new(policy_id, name_hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYMENT: &str = "9a1c7ee1e3e6b1a6b1c6e3b5a0d7e0c2a39f0dd2e5a07c6aa5e1fc2b";
    const STAKING: &str = "5d1e3b5a0d7e0c2a39f0dd2e5a07c6aa5e1fc2b9a1c7ee1e3e6b1a6b";

    #[test]
    fn script_address_known_mainnet() {
        let addr = ShelleyAddress {
            network_id: 1,
            payment: Credential::Script(
                "ea07914e72654ca5a5c5e26a95596e6fa0b5c4c317e43e2f92457ea1".to_string(),
            ),
            stake: None,
        }
        .to_bech32()
        .unwrap();
        assert_eq!(
            addr,
            "addr1w84q0y2wwfj5efd9ch3x492edeh6pdwycvt7g030jfzhagg5ftr54"
        );
    }

    #[test]
    fn base_address_round_trip() {
        let creds = Credentials::new(PAYMENT, STAKING);
        let addr = address_of(Network::Preprod, &creds).unwrap();
        assert!(addr.starts_with("addr_test1q"));
        assert_eq!(credentials_of(&addr).unwrap(), creds);
    }

    #[test]
    fn enterprise_address_round_trip() {
        let creds = Credentials::new(PAYMENT, "");
        let addr = address_of(Network::Mainnet, &creds).unwrap();
        assert!(addr.starts_with("addr1v"));
        assert_eq!(credentials_of(&addr).unwrap(), creds);
    }

    #[test]
    fn reward_address_is_invalid() {
        let mut bytes = vec![0xe1];
        bytes.extend(hex::decode(STAKING).unwrap());
        let addr = bech32::encode::<Bech32>(Hrp::parse("stake").unwrap(), &bytes).unwrap();
        assert!(matches!(
            credentials_of(&addr),
            Err(OrderError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn script_wrapping_is_normalized() {
        let flat = vec![0x01, 0x00, 0x00, 0x22, 0x23];
        let single = encode_cbor(&Value::Bytes(flat.clone())).unwrap();
        let double = encode_cbor(&Value::Bytes(single.clone())).unwrap();
        let a = PlutusScript::from_hex(&hex::encode(&flat)).unwrap();
        let b = PlutusScript::from_hex(&hex::encode(&single)).unwrap();
        let c = PlutusScript::from_hex(&hex::encode(&double)).unwrap();
        assert_eq!(a.bytes(), single.as_slice());
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(policy_id_of(&a).len(), 56);
    }
}
