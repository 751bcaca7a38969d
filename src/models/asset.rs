use serde::{Deserialize, Serialize};

use crate::error::{OrderError, Result};

/// Ledger limit on asset name length, in bytes.
pub const MAX_ASSET_NAME_BYTES: usize = 32;

/// Length of a policy id in hex characters (28-byte blake2b-224 hash).
pub const POLICY_ID_HEX_LEN: usize = 56;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Asset {
    pub policy_id: String,
    pub name_hex: String,
}

impl Asset {
    pub fn new(policy_id: &str, name_hex: &str) -> Self {
        Self {
            policy_id: policy_id.to_lowercase(),
            name_hex: name_hex.to_lowercase(),
        }
    }

    /// Build an asset whose name is given as UTF-8 text, e.g. `"tokenB"`.
    pub fn from_text(policy_id: &str, name: &str) -> Self {
        Self::new(policy_id, &hex::encode(name.as_bytes()))
    }

    /// Parse `policy.name` or `policyname` (both hex). `None` unless the
    /// policy is a full 56-character id and both halves are hex.
    pub fn from_identifier(id: &str) -> Option<Asset> {
        let id = id.replace('.', "");
        let policy = id.get(..POLICY_ID_HEX_LEN)?;
        let name = id.get(POLICY_ID_HEX_LEN..)?;
        let is_hex = |s: &str| s.bytes().all(|b| b.is_ascii_hexdigit());
        if !is_hex(policy) || !is_hex(name) || name.len() % 2 != 0 {
            return None;
        }
        Some(Asset::new(policy, name))
    }

    pub fn identifier(&self, delimiter: &str) -> String {
        format!("{}{}{}", self.policy_id, delimiter, self.name_hex)
    }

    pub fn asset_name(&self) -> String {
        String::from_utf8_lossy(&hex::decode(&self.name_hex).unwrap_or_default()).to_string()
    }

    /// Reject malformed policy ids and names longer than the ledger allows.
    pub fn validate(&self) -> Result<()> {
        let policy = hex::decode(&self.policy_id)
            .map_err(|e| OrderError::Encoding(format!("policy id {}: {}", self.policy_id, e)))?;
        if policy.len() != POLICY_ID_HEX_LEN / 2 {
            return Err(OrderError::Encoding(format!(
                "policy id must be 28 bytes, got {}",
                policy.len()
            )));
        }
        let name = hex::decode(&self.name_hex)
            .map_err(|e| OrderError::Encoding(format!("asset name {}: {}", self.name_hex, e)))?;
        if name.len() > MAX_ASSET_NAME_BYTES {
            return Err(OrderError::Encoding(format!(
                "asset name is {} bytes, limit is {}",
                name.len(),
                MAX_ASSET_NAME_BYTES
            )));
        }
        Ok(())
    }
}

/// Either the native currency or a native asset.
///
/// On chain the native currency is the pair `(b"", b"")`; keeping it as its own
/// variant avoids guessing from empty strings at every call site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Token {
    Lovelace,
    Asset(Asset),
}

impl Token {
    pub fn as_asset(&self) -> Option<&Asset> {
        match self {
            Token::Lovelace => None,
            Token::Asset(a) => Some(a),
        }
    }

    /// `(policy_hex, name_hex)` as written into a datum.
    pub fn to_pair(&self) -> (String, String) {
        match self {
            Token::Lovelace => (String::new(), String::new()),
            Token::Asset(a) => (a.policy_id.clone(), a.name_hex.clone()),
        }
    }

    /// Inverse of [`Token::to_pair`]. An empty policy id is the native
    /// currency whatever the name bytes hold.
    pub fn from_pair(policy_hex: &str, name_hex: &str) -> Token {
        if policy_hex.is_empty() {
            Token::Lovelace
        } else {
            Token::Asset(Asset::new(policy_hex, name_hex))
        }
    }
}

pub fn token_identifier(token: &Token) -> String {
    match token {
        Token::Lovelace => "lovelace".to_string(),
        Token::Asset(a) => a.identifier(""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = "f13ac4d66b3ee19a6aa0f2a22298737bd907cc95121662fc971b5275";

    #[test]
    fn identifier_round_trip() {
        let asset = Asset::from_text(POLICY, "tokenB");
        let parsed = Asset::from_identifier(&asset.identifier(".")).unwrap();
        assert_eq!(parsed.asset_name(), "tokenB");
        assert_eq!(parsed, asset);
        assert_eq!(token_identifier(&Token::Asset(parsed)), asset.identifier(""));
    }

    #[test]
    fn malformed_identifiers_are_refused() {
        // multi-byte characters straddling the policy boundary
        let id = format!("{}é{}", &POLICY[..55], "00");
        assert_eq!(Asset::from_identifier(&id), None);
        assert_eq!(Asset::from_identifier(&format!("{}.ünit", POLICY)), None);
        assert_eq!(Asset::from_identifier("f13ac4"), None);
        assert_eq!(Asset::from_identifier(&format!("{}.abc", POLICY)), None);
        assert_eq!(Asset::from_identifier(POLICY), Some(Asset::new(POLICY, "")));
    }

    #[test]
    fn empty_policy_is_lovelace() {
        assert_eq!(Token::from_pair("", ""), Token::Lovelace);
        assert_eq!(Token::from_pair("", &hex::encode("lovelace")), Token::Lovelace);
        assert_eq!(token_identifier(&Token::Lovelace), "lovelace");
        assert_eq!(Token::Lovelace.to_pair(), (String::new(), String::new()));
    }

    #[test]
    fn rejects_long_asset_name() {
        let asset = Asset::new(POLICY, &"ab".repeat(33));
        assert!(matches!(asset.validate(), Err(OrderError::Encoding(_))));
        assert!(Asset::new(POLICY, &"ab".repeat(32)).validate().is_ok());
    }
}
