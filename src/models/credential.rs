use serde::{Deserialize, Serialize};

/// Payment and staking key hashes of a wallet, hex encoded.
///
/// `staking` is empty for addresses without a staking part; that empty
/// string is also what goes on chain in the datum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credentials {
    pub payment: String,
    pub staking: String,
}

impl Credentials {
    pub fn new(payment: &str, staking: &str) -> Self {
        Self {
            payment: payment.to_lowercase(),
            staking: staking.to_lowercase(),
        }
    }

    pub fn has_staking(&self) -> bool {
        !self.staking.is_empty()
    }
}
