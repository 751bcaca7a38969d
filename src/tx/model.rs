//! Babbage-era transaction model and its CBOR serialization.
//!
//!   transaction  = [body, witness_set, is_valid, auxiliary_data / null]
//!   body         = { 0: inputs, 1: outputs, 2: fee, 7: aux_data_hash, 9: mint,
//!                    11: script_data_hash, 13: collateral, 14: required_signers,
//!                    18: reference_inputs }
//!   output       = { 0: address, 1: value, 2: datum_option, 3: script_ref }
//!   witness_set  = { 0: vkey_witnesses, 5: redeemers }
use ciborium::value::Value;

use crate::codec::cbor::encode_cbor;
use crate::config::{ExUnits, ProtocolParams};
use crate::credentials::{address_to_bytes, PlutusScript};
use crate::error::{OrderError, Result};
use crate::models::{Mint, OutRef, Value as Assets};
use crate::utils::blake2b_256;

const PLUTUS_V2_LANGUAGE: u64 = 1;
const PLUTUS_V2_SCRIPT_REF: u64 = 2;
const CBOR_IN_CBOR_TAG: u64 = 24;

#[derive(Debug, Clone, PartialEq)]
pub struct TxOutput {
    pub address: String,
    pub value: Assets,
    /// Plutus data embedded in the output.
    pub inline_datum: Option<Value>,
    pub script_ref: Option<PlutusScript>,
}

impl TxOutput {
    pub fn new(address: &str, value: Assets) -> Self {
        Self {
            address: address.to_string(),
            value,
            inline_datum: None,
            script_ref: None,
        }
    }

    pub fn with_inline_datum(mut self, datum: Value) -> Self {
        self.inline_datum = Some(datum);
        self
    }

    pub fn with_script_ref(mut self, script: PlutusScript) -> Self {
        self.script_ref = Some(script);
        self
    }

    pub fn to_cbor_value(&self) -> Result<Value> {
        let mut fields = vec![
            (
                uint(0),
                Value::Bytes(address_to_bytes(&self.address)?),
            ),
            (uint(1), value_to_cbor(&self.value)?),
        ];
        if let Some(data) = &self.inline_datum {
            fields.push((uint(2), Value::Array(vec![uint(1), cbor_in_cbor(data)?])));
        }
        if let Some(script) = &self.script_ref {
            let script_value = Value::Array(vec![
                uint(PLUTUS_V2_SCRIPT_REF),
                Value::Bytes(script.bytes().to_vec()),
            ]);
            fields.push((uint(3), cbor_in_cbor(&script_value)?));
        }
        Ok(Value::Map(fields))
    }

    /// Serialized size, used for the min-UTxO rule.
    pub fn encoded_len(&self) -> Result<usize> {
        Ok(encode(&self.to_cbor_value()?)?.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemerTag {
    Spend,
    Mint,
}

impl RedeemerTag {
    fn code(self) -> u64 {
        match self {
            RedeemerTag::Spend => 0,
            RedeemerTag::Mint => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Redeemer {
    pub tag: RedeemerTag,
    pub index: u32,
    pub data: Value,
    pub ex_units: ExUnits,
}

impl Redeemer {
    fn to_cbor_value(&self) -> Value {
        Value::Array(vec![
            uint(self.tag.code()),
            uint(self.index as u64),
            self.data.clone(),
            Value::Array(vec![uint(self.ex_units.mem), uint(self.ex_units.steps)]),
        ])
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TxBody {
    /// Kept in ledger order (sorted by tx hash, then index).
    pub inputs: Vec<OutRef>,
    pub outputs: Vec<TxOutput>,
    pub fee: u64,
    pub auxiliary_data_hash: Option<[u8; 32]>,
    pub mint: Mint,
    pub script_data_hash: Option<[u8; 32]>,
    pub collateral: Vec<OutRef>,
    pub required_signers: Vec<String>,
    pub reference_inputs: Vec<OutRef>,
}

impl TxBody {
    pub fn to_cbor_value(&self) -> Result<Value> {
        let mut fields = vec![
            (uint(0), out_refs(&self.inputs)?),
            (
                uint(1),
                Value::Array(
                    self.outputs
                        .iter()
                        .map(TxOutput::to_cbor_value)
                        .collect::<Result<Vec<_>>>()?,
                ),
            ),
            (uint(2), uint(self.fee)),
        ];
        if let Some(hash) = &self.auxiliary_data_hash {
            fields.push((uint(7), Value::Bytes(hash.to_vec())));
        }
        if !self.mint.is_empty() {
            fields.push((uint(9), mint_to_cbor(&self.mint)?));
        }
        if let Some(hash) = &self.script_data_hash {
            fields.push((uint(11), Value::Bytes(hash.to_vec())));
        }
        if !self.collateral.is_empty() {
            fields.push((uint(13), out_refs(&self.collateral)?));
        }
        if !self.required_signers.is_empty() {
            fields.push((
                uint(14),
                Value::Array(
                    self.required_signers
                        .iter()
                        .map(|s| hex_bytes(s))
                        .collect::<Result<Vec<_>>>()?,
                ),
            ));
        }
        if !self.reference_inputs.is_empty() {
            fields.push((uint(18), out_refs(&self.reference_inputs)?));
        }
        Ok(Value::Map(fields))
    }

    pub fn hash(&self) -> Result<String> {
        Ok(hex::encode(blake2b_256(&encode(&self.to_cbor_value()?)?)))
    }
}

/// Transaction ready for signing: body, redeemers and message metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub body: TxBody,
    pub redeemers: Vec<Redeemer>,
    pub metadata: Option<Metadata>,
}

impl Transaction {
    fn witness_set(&self, placeholder_signers: usize) -> Value {
        let mut fields = Vec::new();
        if placeholder_signers > 0 {
            // Zeroed vkey witnesses stand in for real signatures when sizing the fee.
            let witness = Value::Array(vec![
                Value::Bytes(vec![0; 32]),
                Value::Bytes(vec![0; 64]),
            ]);
            fields.push((uint(0), Value::Array(vec![witness; placeholder_signers])));
        }
        if !self.redeemers.is_empty() {
            fields.push((uint(5), self.redeemers_value()));
        }
        Value::Map(fields)
    }

    fn redeemers_value(&self) -> Value {
        Value::Array(self.redeemers.iter().map(Redeemer::to_cbor_value).collect())
    }

    fn to_cbor_value(&self, placeholder_signers: usize) -> Result<Value> {
        Ok(Value::Array(vec![
            self.body.to_cbor_value()?,
            self.witness_set(placeholder_signers),
            Value::Bool(true),
            match &self.metadata {
                Some(m) => m.to_cbor_value(),
                None => Value::Null,
            },
        ]))
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        encode(&self.to_cbor_value(0)?)
    }

    /// Size once `signers` vkey witnesses are attached.
    pub fn signed_size(&self, signers: usize) -> Result<usize> {
        Ok(encode(&self.to_cbor_value(signers)?)?.len())
    }

    pub fn hash(&self) -> Result<String> {
        self.body.hash()
    }

    /// Recompute the body hashes that commit to witnesses and metadata.
    pub fn seal(&mut self, params: &ProtocolParams) -> Result<()> {
        self.body.auxiliary_data_hash = match &self.metadata {
            Some(m) => Some(blake2b_256(&encode(&m.to_cbor_value())?)),
            None => None,
        };
        self.body.script_data_hash = if self.redeemers.is_empty() {
            None
        } else {
            params.check_cost_model()?;
            let mut preimage = encode(&self.redeemers_value())?;
            preimage.extend(encode(&language_views(params))?);
            Some(blake2b_256(&preimage))
        };
        Ok(())
    }

    pub fn total_ex_units(&self) -> ExUnits {
        self.redeemers.iter().fold(ExUnits::default(), |acc, r| ExUnits {
            mem: acc.mem + r.ex_units.mem,
            steps: acc.steps + r.ex_units.steps,
        })
    }
}

/// CIP-20 transaction message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub label: u64,
    pub messages: Vec<String>,
}

impl Metadata {
    pub fn message(label: u64, msg: &str) -> Self {
        Self {
            label,
            messages: vec![msg.to_string()],
        }
    }

    fn to_cbor_value(&self) -> Value {
        let msgs = Value::Array(self.messages.iter().cloned().map(Value::Text).collect());
        Value::Map(vec![(
            uint(self.label),
            Value::Map(vec![(Value::Text("msg".to_string()), msgs)]),
        )])
    }
}

/// Plutus V2 language view: `{ 1: [cost model...] }`.
fn language_views(params: &ProtocolParams) -> Value {
    Value::Map(vec![(
        uint(PLUTUS_V2_LANGUAGE),
        Value::Array(
            params
                .plutus_v2_cost_model
                .iter()
                .map(|c| Value::Integer((*c).into()))
                .collect(),
        ),
    )])
}

fn uint(n: u64) -> Value {
    Value::Integer(n.into())
}

fn hex_bytes(h: &str) -> Result<Value> {
    hex::decode(h)
        .map(Value::Bytes)
        .map_err(|e| OrderError::Encoding(format!("invalid hex {:?}: {}", h, e)))
}

fn cbor_in_cbor(v: &Value) -> Result<Value> {
    Ok(Value::Tag(CBOR_IN_CBOR_TAG, Box::new(Value::Bytes(encode(v)?))))
}

fn out_refs(refs: &[OutRef]) -> Result<Value> {
    Ok(Value::Array(
        refs.iter()
            .map(|r| -> Result<Value> {
                Ok(Value::Array(vec![hex_bytes(&r.tx_hash)?, uint(r.output_index as u64)]))
            })
            .collect::<Result<Vec<_>>>()?,
    ))
}

fn value_to_cbor(value: &Assets) -> Result<Value> {
    if !value.has_assets() {
        return Ok(uint(value.coin));
    }
    let mut policies = Vec::new();
    for (policy, names) in &value.assets {
        if names.is_empty() {
            continue;
        }
        let entries = names
            .iter()
            .map(|(name, qty)| -> Result<(Value, Value)> { Ok((hex_bytes(name)?, uint(*qty))) })
            .collect::<Result<Vec<_>>>()?;
        policies.push((hex_bytes(policy)?, Value::Map(entries)));
    }
    Ok(Value::Array(vec![uint(value.coin), Value::Map(policies)]))
}

fn mint_to_cbor(mint: &Mint) -> Result<Value> {
    let mut policies = Vec::new();
    for (policy, names) in &mint.0 {
        let entries = names
            .iter()
            .map(|(name, qty)| -> Result<(Value, Value)> {
                Ok((hex_bytes(name)?, Value::Integer((*qty).into())))
            })
            .collect::<Result<Vec<_>>>()?;
        policies.push((hex_bytes(policy)?, Value::Map(entries)));
    }
    Ok(Value::Map(policies))
}

fn encode(v: &Value) -> Result<Vec<u8>> {
    encode_cbor(v).map_err(|e| OrderError::Encoding(e.to_string()))
}
