//! Console output for the operator commands.

use serde::{Serialize, Serializer};
use solana_sdk::pubkey::Pubkey;
use std::fmt::Display;

use crate::randomness::{RandomValue, confirmed_value};
use crate::state::VrfAccountData;

/// Width the label column is padded to.
const LABEL_WIDTH: usize = 24;

/// `label` padded to the label column, then the value.
pub fn account_line(label: &str, value: impl Display) -> String {
    format!("{label:<width$} {value}", width = LABEL_WIDTH)
}

/// A shell `export` hint for an environment variable.
pub fn export_line(name: &str, value: impl Display) -> String {
    format!("\texport {name}={value}")
}

pub(crate) fn serialize_display<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

fn serialize_optional_display<T: Display, S: Serializer>(
    value: &Option<T>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.collect_str(v),
        None => serializer.serialize_none(),
    }
}

/// JSON view of a VRF account with keys rendered as base58.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VrfStateView {
    #[serde(serialize_with = "serialize_display")]
    pub pubkey: Pubkey,
    pub min_proof_confirmations: u32,
    pub num_proof_confirmations: u32,
    pub lock_configs: bool,
    #[serde(serialize_with = "serialize_optional_display")]
    pub randomness_producer_pubkey: Option<Pubkey>,
    #[serde(serialize_with = "serialize_optional_display")]
    pub fulfillment_manager_pubkey: Option<Pubkey>,
    pub value: Vec<u8>,
    /// Present once the value is confirmed.
    pub randomness: Option<RandomValue>,
}

impl VrfStateView {
    pub fn new(pubkey: Pubkey, state: &VrfAccountData) -> Self {
        Self {
            pubkey,
            min_proof_confirmations: state.min_proof_confirmations,
            num_proof_confirmations: state.num_proof_confirmations,
            lock_configs: state.lock_configs,
            randomness_producer_pubkey: state.randomness_producer,
            fulfillment_manager_pubkey: state.fulfillment_manager,
            value: state.value.clone(),
            randomness: confirmed_value(&pubkey, state).ok(),
        }
    }
}
