use crate::config::ProtocolParams;
use crate::error::Result;
use crate::tx::model::{Transaction, TxOutput};

/// Per-output overhead the ledger adds before applying `coins_per_utxo_byte`.
const UTXO_ENTRY_OVERHEAD: u64 = 160;

/// `a * size + b`, plus the script execution price of every redeemer.
pub fn min_fee(tx: &Transaction, params: &ProtocolParams, signers: usize) -> Result<u64> {
    let size = tx.signed_size(signers)? as u64;
    let ex = tx.total_ex_units();
    let script_fee = params.price_mem.mul_ceil(ex.mem) + params.price_step.mul_ceil(ex.steps);
    Ok(params.min_fee_a * size + params.min_fee_b + script_fee)
}

/// Smallest lovelace amount the output must carry.
///
/// The size depends on the coin field itself, so the estimate is repeated
/// until it stops growing.
pub fn min_lovelace(output: &TxOutput, params: &ProtocolParams) -> Result<u64> {
    let mut probe = output.clone();
    let mut required = 0;
    for _ in 0..3 {
        probe.value.coin = probe.value.coin.max(required);
        let next = (UTXO_ENTRY_OVERHEAD + probe.encoded_len()? as u64) * params.coins_per_utxo_byte;
        if next <= required {
            break;
        }
        required = next;
    }
    Ok(required)
}

/// Collateral the ledger demands for a given fee.
pub fn required_collateral(fee: u64, params: &ProtocolParams) -> u64 {
    (fee as u128 * params.collateral_percent as u128).div_ceil(100) as u64
}
