//! Coin selection and fee balancing over a caller-supplied wallet snapshot.
use std::collections::BTreeSet;

use ciborium::value::Value as PlutusData;

use crate::config::ProtocolParams;
use crate::credentials::{decode_address, Credential};
use crate::error::{OrderError, Result};
use crate::models::{Mint, OutRef, Token, Utxo, Value};
use crate::tx::fee::{min_fee, min_lovelace, required_collateral};
use crate::tx::model::{Metadata, Redeemer, RedeemerTag, Transaction, TxBody, TxOutput};

const MAX_BALANCE_ROUNDS: usize = 8;

/// A script-locked input together with the redeemer it is spent with.
#[derive(Debug, Clone)]
pub struct ScriptInput {
    pub utxo: Utxo,
    pub redeemer: PlutusData,
}

/// Everything a builder decides; the balancer adds wallet inputs, change,
/// collateral and the fee.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub script_inputs: Vec<ScriptInput>,
    pub outputs: Vec<TxOutput>,
    pub mint: Mint,
    /// Policy id and redeemer for the minting script, when `mint` is non-empty.
    pub mint_redeemer: Option<(String, PlutusData)>,
    pub reference_inputs: Vec<OutRef>,
    pub required_signers: Vec<String>,
    pub metadata: Option<Metadata>,
}

impl Draft {
    fn runs_scripts(&self) -> bool {
        !self.script_inputs.is_empty() || self.mint_redeemer.is_some()
    }
}

/// Balance `draft` using `wallet` for funding and `change_address` for change.
pub fn balance(
    draft: Draft,
    wallet: &[Utxo],
    change_address: &str,
    params: &ProtocolParams,
) -> Result<Transaction> {
    if draft.runs_scripts() {
        params.check_cost_model()?;
    }
    let (minted, burned) = draft.mint.split();
    let mut fixed_in = minted;
    for input in &draft.script_inputs {
        fixed_in.add(&input.utxo.value);
    }
    let mut fixed_out = burned;
    for output in &draft.outputs {
        fixed_out.add(&output.value);
    }

    let excluded: BTreeSet<OutRef> = draft
        .script_inputs
        .iter()
        .map(|s| s.utxo.out_ref())
        .chain(draft.reference_inputs.iter().cloned())
        .collect();
    let mut candidates: Vec<&Utxo> = wallet
        .iter()
        .filter(|u| !excluded.contains(&u.out_ref()))
        .collect();
    candidates.sort_by(|a, b| b.value.coin.cmp(&a.value.coin));

    let collateral = if draft.runs_scripts() {
        Some(pick_collateral(&candidates)?)
    } else {
        None
    };

    let mut selected: Vec<Utxo> = Vec::new();
    let mut fee = params.min_fee_b;

    for round in 0..MAX_BALANCE_ROUNDS {
        let (change, dust) = select(
            &fixed_in,
            &fixed_out,
            fee,
            &mut selected,
            &mut candidates,
            change_address,
            params,
        )?;

        let tx = assemble(&draft, &selected, change, fee + dust, collateral, params)?;
        let signers = count_signers(&draft, &selected, collateral);
        let needed = min_fee(&tx, params, signers)?;

        if needed <= tx.body.fee {
            let size = tx.signed_size(signers)?;
            if size > params.max_tx_size {
                return Err(OrderError::Encoding(format!(
                    "transaction is {} bytes, limit is {}",
                    size, params.max_tx_size
                )));
            }
            if let Some(c) = collateral {
                let required = required_collateral(tx.body.fee, params);
                if c.value.coin < required {
                    return Err(OrderError::UnderfundedInput {
                        needed: format!("{} lovelace collateral", required),
                        available: format!("{} lovelace", c.value.coin),
                    });
                }
            }
            tracing::debug!(
                fee = tx.body.fee,
                inputs = tx.body.inputs.len(),
                outputs = tx.body.outputs.len(),
                rounds = round + 1,
                "transaction balanced"
            );
            return Ok(tx);
        }
        fee = needed;
    }

    Err(OrderError::UnderfundedInput {
        needed: format!("fee did not converge after {} rounds", MAX_BALANCE_ROUNDS),
        available: format!("{} wallet inputs", wallet.len()),
    })
}

/// Grow `selected` until inputs cover outputs plus `fee`, and return the
/// change (if any) and dust folded into the fee.
fn select(
    fixed_in: &Value,
    fixed_out: &Value,
    fee: u64,
    selected: &mut Vec<Utxo>,
    candidates: &mut Vec<&Utxo>,
    change_address: &str,
    params: &ProtocolParams,
) -> Result<(Option<TxOutput>, u64)> {
    let mut need = fixed_out.clone();
    need.coin += fee;

    loop {
        let mut have = fixed_in.clone();
        for u in selected.iter() {
            have.add(&u.value);
        }

        match have.checked_sub(&need) {
            Some(change) if change == Value::default() => return Ok((None, 0)),
            Some(change) => {
                let output = TxOutput::new(change_address, change);
                let min = min_lovelace(&output, params)?;
                if output.value.coin >= min {
                    return Ok((Some(output), 0));
                }
                match take_candidate(candidates, |_| true) {
                    Some(u) => selected.push(u.clone()),
                    // Pure-lovelace dust too small for its own output goes to the fee.
                    None if !output.value.has_assets() => return Ok((None, output.value.coin)),
                    None => return Err(underfunded(&need, &have, min)),
                }
            }
            None => {
                let missing = have.shortfall(&need);
                let wants_assets = missing.has_assets();
                let pick = take_candidate(candidates, |u| {
                    if wants_assets {
                        missing
                            .native_assets()
                            .any(|(a, _)| u.value.quantity_of(&Token::Asset(a)) > 0)
                    } else {
                        true
                    }
                });
                match pick {
                    Some(u) => selected.push(u.clone()),
                    None => return Err(underfunded(&need, &have, 0)),
                }
            }
        }
    }
}

fn take_candidate<'a>(
    candidates: &mut Vec<&'a Utxo>,
    pred: impl Fn(&Utxo) -> bool,
) -> Option<&'a Utxo> {
    let pos = candidates.iter().position(|u| pred(u))?;
    Some(candidates.remove(pos))
}

fn underfunded(need: &Value, have: &Value, change_min: u64) -> OrderError {
    let mut needed = need.clone();
    needed.coin += change_min;
    OrderError::UnderfundedInput {
        needed: needed.to_string(),
        available: have.to_string(),
    }
}

fn pick_collateral<'a>(candidates: &[&'a Utxo]) -> Result<&'a Utxo> {
    candidates
        .iter()
        .filter(|u| u.is_pure_lovelace())
        .max_by_key(|u| u.value.coin)
        .copied()
        .ok_or_else(|| OrderError::UnderfundedInput {
            needed: "a lovelace-only UTxO for collateral".to_string(),
            available: "none in wallet".to_string(),
        })
}

fn assemble(
    draft: &Draft,
    selected: &[Utxo],
    change: Option<TxOutput>,
    fee: u64,
    collateral: Option<&Utxo>,
    params: &ProtocolParams,
) -> Result<Transaction> {
    let mut inputs: Vec<OutRef> = draft
        .script_inputs
        .iter()
        .map(|s| s.utxo.out_ref())
        .chain(selected.iter().map(Utxo::out_ref))
        .collect();
    inputs.sort();
    inputs.dedup();

    let mut redeemers = Vec::new();
    for script_input in &draft.script_inputs {
        let out_ref = script_input.utxo.out_ref();
        let index = inputs
            .iter()
            .position(|i| *i == out_ref)
            .ok_or_else(|| OrderError::OrderNotFound(out_ref.to_string()))?;
        redeemers.push(Redeemer {
            tag: RedeemerTag::Spend,
            index: index as u32,
            data: script_input.redeemer.clone(),
            ex_units: params.spend_ex_units,
        });
    }
    if let Some((policy, data)) = &draft.mint_redeemer {
        let index = draft
            .mint
            .policies()
            .position(|p| p == policy)
            .ok_or_else(|| OrderError::Encoding(format!("mint redeemer for absent policy {}", policy)))?;
        redeemers.push(Redeemer {
            tag: RedeemerTag::Mint,
            index: index as u32,
            data: data.clone(),
            ex_units: params.mint_ex_units,
        });
    }

    let mut outputs = draft.outputs.clone();
    outputs.extend(change);

    let mut reference_inputs = draft.reference_inputs.clone();
    reference_inputs.sort();
    reference_inputs.dedup();

    let mut tx = Transaction {
        body: TxBody {
            inputs,
            outputs,
            fee,
            mint: draft.mint.clone(),
            collateral: collateral.map(|c| vec![c.out_ref()]).unwrap_or_default(),
            required_signers: draft.required_signers.clone(),
            reference_inputs,
            ..TxBody::default()
        },
        redeemers,
        metadata: draft.metadata.clone(),
    };
    tx.seal(params)?;
    Ok(tx)
}

/// Distinct key hashes that will have to sign.
fn count_signers(draft: &Draft, selected: &[Utxo], collateral: Option<&Utxo>) -> usize {
    let mut keys: BTreeSet<String> = draft.required_signers.iter().cloned().collect();
    for utxo in selected.iter().chain(collateral) {
        if let Ok(addr) = decode_address(&utxo.address) {
            if let Credential::Key(hash) = addr.payment {
                keys.insert(hash);
            }
        }
    }
    keys.len().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{address_of, Network};
    use crate::models::{Asset, Credentials};

    const PAYMENT: &str = "9a1c7ee1e3e6b1a6b1c6e3b5a0d7e0c2a39f0dd2e5a07c6aa5e1fc2b";
    const POLICY: &str = "f13ac4d66b3ee19a6aa0f2a22298737bd907cc95121662fc971b5275";

    fn wallet_addr() -> String {
        address_of(Network::Preprod, &Credentials::new(PAYMENT, "")).unwrap()
    }

    fn utxo(i: u32, value: Value) -> Utxo {
        Utxo {
            address: wallet_addr(),
            tx_hash: format!("{:064x}", i + 1),
            output_index: 0,
            value,
            data_hash: None,
            inline_datum: None,
            reference_script_hash: None,
        }
    }

    fn value_in(tx: &Transaction, wallet: &[Utxo]) -> Value {
        let mut v = Value::default();
        for i in &tx.body.inputs {
            if let Some(u) = wallet.iter().find(|u| u.out_ref() == *i) {
                v.add(&u.value);
            }
        }
        v
    }

    #[test]
    fn simple_payment_balances_exactly() {
        let params = ProtocolParams::default();
        let wallet = vec![utxo(0, Value::lovelace(10_000_000))];
        let draft = Draft {
            outputs: vec![TxOutput::new(&wallet_addr(), Value::lovelace(3_000_000))],
            ..Draft::default()
        };
        let tx = balance(draft, &wallet, &wallet_addr(), &params).unwrap();
        let mut out = Value::lovelace(tx.body.fee);
        for o in &tx.body.outputs {
            out.add(&o.value);
        }
        assert_eq!(out, value_in(&tx, &wallet));
        assert!(tx.body.fee >= min_fee(&tx, &params, 1).unwrap());
    }

    #[test]
    fn selects_input_holding_required_asset() {
        let params = ProtocolParams::default();
        let token = Token::Asset(Asset::from_text(POLICY, "tokenB"));
        let wallet = vec![
            utxo(0, Value::lovelace(50_000_000)),
            utxo(1, Value::lovelace(2_000_000).with_token(&token, 10)),
        ];
        let draft = Draft {
            outputs: vec![TxOutput::new(
                &wallet_addr(),
                Value::lovelace(2_000_000).with_token(&token, 5),
            )],
            ..Draft::default()
        };
        let tx = balance(draft, &wallet, &wallet_addr(), &params).unwrap();
        assert!(tx.body.inputs.contains(&wallet[1].out_ref()));
        let change = tx.body.outputs.last().unwrap();
        assert_eq!(change.value.quantity_of(&token), 5);
    }

    #[test]
    fn underfunded_wallet_is_reported() {
        let params = ProtocolParams::default();
        let wallet = vec![utxo(0, Value::lovelace(1_000_000))];
        let draft = Draft {
            outputs: vec![TxOutput::new(&wallet_addr(), Value::lovelace(5_000_000))],
            ..Draft::default()
        };
        assert!(matches!(
            balance(draft, &wallet, &wallet_addr(), &params),
            Err(OrderError::UnderfundedInput { .. })
        ));
    }
}
