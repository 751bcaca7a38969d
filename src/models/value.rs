use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Asset, Token};

/// Multi-asset bundle: lovelace plus native assets keyed by policy then name (hex).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    pub coin: u64,
    pub assets: BTreeMap<String, BTreeMap<String, u64>>,
}

impl Value {
    pub fn lovelace(coin: u64) -> Self {
        Self {
            coin,
            assets: BTreeMap::new(),
        }
    }

    pub fn with_token(mut self, token: &Token, quantity: u64) -> Self {
        self.add_token(token, quantity);
        self
    }

    pub fn add_token(&mut self, token: &Token, quantity: u64) {
        match token {
            Token::Lovelace => self.coin += quantity,
            Token::Asset(a) => {
                if quantity == 0 {
                    return;
                }
                *self
                    .assets
                    .entry(a.policy_id.clone())
                    .or_default()
                    .entry(a.name_hex.clone())
                    .or_insert(0) += quantity;
            }
        }
    }

    pub fn quantity_of(&self, token: &Token) -> u64 {
        match token {
            Token::Lovelace => self.coin,
            Token::Asset(a) => self
                .assets
                .get(&a.policy_id)
                .and_then(|names| names.get(&a.name_hex))
                .copied()
                .unwrap_or(0),
        }
    }

    /// Every native asset with its quantity, in canonical (policy, name) order.
    pub fn native_assets(&self) -> impl Iterator<Item = (Asset, u64)> + '_ {
        self.assets.iter().flat_map(|(policy, names)| {
            names
                .iter()
                .map(move |(name, qty)| (Asset::new(policy, name), *qty))
        })
    }

    pub fn has_assets(&self) -> bool {
        self.assets.values().any(|names| !names.is_empty())
    }

    pub fn add(&mut self, other: &Value) {
        self.coin += other.coin;
        for (asset, qty) in other.native_assets() {
            self.add_token(&Token::Asset(asset), qty);
        }
    }

    /// `self - other`, or `None` if any component would go negative.
    pub fn checked_sub(&self, other: &Value) -> Option<Value> {
        let mut out = self.clone();
        out.coin = out.coin.checked_sub(other.coin)?;
        for (asset, qty) in other.native_assets() {
            let names = out.assets.get_mut(&asset.policy_id)?;
            let have = names.get_mut(&asset.name_hex)?;
            *have = have.checked_sub(qty)?;
            if *have == 0 {
                names.remove(&asset.name_hex);
            }
            if names.is_empty() {
                out.assets.remove(&asset.policy_id);
            }
        }
        Some(out)
    }

    /// True when every component of `other` is available in `self`.
    pub fn covers(&self, other: &Value) -> bool {
        self.checked_sub(other).is_some()
    }

    /// Components of `other` that `self` is missing.
    pub fn shortfall(&self, other: &Value) -> Value {
        let mut missing = Value::lovelace(other.coin.saturating_sub(self.coin));
        for (asset, qty) in other.native_assets() {
            let token = Token::Asset(asset);
            let have = self.quantity_of(&token);
            if have < qty {
                missing.add_token(&token, qty - have);
            }
        }
        missing
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} lovelace", self.coin)?;
        for (asset, qty) in self.native_assets() {
            write!(f, " + {} {}", qty, asset.identifier("."))?;
        }
        Ok(())
    }
}

/// Mint field of a transaction: signed quantities per (policy, name).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mint(pub BTreeMap<String, BTreeMap<String, i64>>);

impl Mint {
    pub fn single(asset: &Asset, quantity: i64) -> Self {
        let mut mint = Mint::default();
        mint.0
            .entry(asset.policy_id.clone())
            .or_default()
            .insert(asset.name_hex.clone(), quantity);
        mint
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|names| names.is_empty())
    }

    /// Split into the minted (positive) and burned (negative) halves.
    pub fn split(&self) -> (Value, Value) {
        let mut minted = Value::default();
        let mut burned = Value::default();
        for (policy, names) in &self.0 {
            for (name, qty) in names {
                let token = Token::Asset(Asset::new(policy, name));
                if *qty > 0 {
                    minted.add_token(&token, qty.unsigned_abs());
                } else if *qty < 0 {
                    burned.add_token(&token, qty.unsigned_abs());
                }
            }
        }
        (minted, burned)
    }

    pub fn policies(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn quantity_of(&self, asset: &Asset) -> i64 {
        self.0
            .get(&asset.policy_id)
            .and_then(|names| names.get(&asset.name_hex))
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = "f13ac4d66b3ee19a6aa0f2a22298737bd907cc95121662fc971b5275";

    #[test]
    fn checked_sub_removes_empty_entries() {
        let token = Token::Asset(Asset::from_text(POLICY, "tokenB"));
        let a = Value::lovelace(10).with_token(&token, 5);
        let b = Value::lovelace(4).with_token(&token, 5);
        let diff = a.checked_sub(&b).unwrap();
        assert_eq!(diff, Value::lovelace(6));
        assert!(!diff.has_assets());
    }

    #[test]
    fn checked_sub_fails_on_missing_asset() {
        let token = Token::Asset(Asset::from_text(POLICY, "tokenB"));
        let a = Value::lovelace(10);
        let b = Value::lovelace(1).with_token(&token, 1);
        assert!(a.checked_sub(&b).is_none());
        assert_eq!(a.shortfall(&b), Value::lovelace(0).with_token(&token, 1));
    }

    #[test]
    fn mint_split() {
        let asset = Asset::from_text(POLICY, "controlToken");
        let (minted, burned) = Mint::single(&asset, -1).split();
        assert_eq!(minted, Value::default());
        assert_eq!(burned.quantity_of(&Token::Asset(asset)), 1);
    }
}
