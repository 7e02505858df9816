//! Reading confirmed randomness out of a VRF account.
//!
//! A value is only trusted once `num_proof_confirmations` has reached
//! `min_proof_confirmations`. [`read_randomness`] checks that once,
//! [`await_randomness`] keeps checking on a fixed interval.

use num_bigint::BigUint;
use serde::{Serialize, Serializer};
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::VrfError;
use crate::ledger::LedgerClient;
use crate::poll::{PollConfig, PollOutcome, poll_until};
use crate::state::{DecodeError, VrfAccountData};
use crate::vrf::fetch_state;

/// Bytes of the VRF value that make up the random number.
const VALUE_LEN: usize = 8;

/// A confirmed random number: the first eight value bytes, big-endian.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RandomValue(BigUint);

impl RandomValue {
    /// `None` when fewer than eight value bytes are present.
    pub fn from_value_bytes(value: &[u8]) -> Option<Self> {
        value.get(..VALUE_LEN).map(|be| Self(BigUint::from_bytes_be(be)))
    }

    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self.0.to_u64_digits().as_slice() {
            [] => Some(0),
            [digit] => Some(*digit),
            _ => None,
        }
    }
}

impl From<u64> for RandomValue {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl fmt::Display for RandomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for RandomValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

/// Decode the value of an account whose confirmations are complete.
pub fn confirmed_value(vrf: &Pubkey, state: &VrfAccountData) -> Result<RandomValue, VrfError> {
    if !state.is_confirmed() {
        return Err(VrfError::InsufficientConfirmations {
            confirmations: state.num_proof_confirmations,
            required: state.min_proof_confirmations,
        });
    }
    RandomValue::from_value_bytes(&state.value).ok_or(VrfError::InvalidAccountData {
        account: *vrf,
        source: DecodeError::TooShort {
            needed: VALUE_LEN,
            actual: state.value.len(),
        },
    })
}

/// Single read of the VRF account.
pub async fn read_randomness(ledger: &dyn LedgerClient, vrf: &Pubkey) -> Result<RandomValue, VrfError> {
    let state = fetch_state(ledger, vrf).await?;
    confirmed_value(vrf, &state)
}

/// Poll the VRF account until its value is confirmed.
///
/// Transient read failures consume an attempt. Running out of attempts or
/// past the deadline gives [`VrfError::ConfirmationTimeout`]; flipping
/// `cancel` to `true` gives [`VrfError::Cancelled`].
#[instrument(skip(ledger, cancel), fields(vrf = %vrf))]
pub async fn await_randomness(
    ledger: &dyn LedgerClient,
    vrf: &Pubkey,
    config: &PollConfig,
    cancel: Option<watch::Receiver<bool>>,
) -> Result<RandomValue, VrfError> {
    let mut last_seen: Option<u32> = None;

    let outcome = poll_until(
        || fetch_state(ledger, vrf),
        |state: &VrfAccountData| {
            let confirmations = state.num_proof_confirmations;
            match last_seen {
                Some(previous) if confirmations < previous => {
                    warn!(previous, confirmations, "Proof confirmations decreased between reads");
                }
                _ => {}
            }
            last_seen = Some(confirmations);
            debug!(confirmations, required = state.min_proof_confirmations, "Polled VRF account");
            state.is_confirmed()
        },
        config,
        cancel,
    )
    .await;

    match outcome {
        PollOutcome::Ready(state) => {
            let value = confirmed_value(vrf, &state)?;
            info!(%value, confirmations = state.num_proof_confirmations, "Randomness confirmed");
            Ok(value)
        }
        PollOutcome::TimedOut { attempts, last_error } => {
            if let Some(e) = last_error {
                warn!(attempts, error = %e, "Gave up waiting for randomness");
            }
            Err(VrfError::ConfirmationTimeout { attempts })
        }
        PollOutcome::Cancelled { attempts } => Err(VrfError::Cancelled { attempts }),
        PollOutcome::Error(e) => Err(e),
    }
}
