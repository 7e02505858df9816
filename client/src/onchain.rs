//! On-chain verification through the `vrf-consumer` program.
//!
//! The consumer program's `read_result` instruction loads the VRF account,
//! refuses values without enough proof confirmations, and emits a
//! `VrfValueRead` Anchor event. Anchor events are logged as base64
//! `Program data:` entries prefixed with `sha256("event:<Name>")[..8]`.

use base64::Engine;
use serde::Serialize;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use tracing::{debug, info, instrument, warn};

use crate::display::serialize_display;
use crate::error::VrfError;
use crate::ledger::LedgerClient;
use crate::randomness::read_randomness;

/// Upper bound (exclusive) of the result the consumer program derives.
pub const MAX_VALUE: u64 = 25_000;

const EVENT_NAME: &str = "VrfValueRead";
const LOG_DATA_PREFIX: &str = "Program data: ";

/// Anchor instruction discriminator: `sha256("global:<name>")[..8]`.
fn instruction_discriminator(name: &str) -> [u8; 8] {
    discriminator(&format!("global:{name}"))
}

/// Anchor event discriminator: `sha256("event:<Name>")[..8]`.
fn event_discriminator(name: &str) -> [u8; 8] {
    discriminator(&format!("event:{name}"))
}

fn discriminator(preimage: &str) -> [u8; 8] {
    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(preimage.as_bytes());
    let mut disc = [0u8; 8];
    disc.copy_from_slice(&hash[..8]);
    disc
}

/// Parsed `VrfValueRead` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VrfValueRead {
    #[serde(serialize_with = "serialize_display")]
    pub vrf: Pubkey,
    pub value: u64,
    /// `value % MAX_VALUE`
    pub result: u64,
}

impl VrfValueRead {
    /// Borsh layout after the discriminator: `vrf (32) + value (8) + result (8)`.
    const LEN: usize = 32 + 8 + 8;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(8 + Self::LEN);
        data.extend_from_slice(&event_discriminator(EVENT_NAME));
        data.extend_from_slice(self.vrf.as_ref());
        data.extend_from_slice(&self.value.to_le_bytes());
        data.extend_from_slice(&self.result.to_le_bytes());
        data
    }

    /// Decode an event body including its discriminator.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let (disc, body) = data.split_at_checked(8)?;
        if disc != event_discriminator(EVENT_NAME) || body.len() < Self::LEN {
            return None;
        }
        Some(Self {
            vrf: Pubkey::try_from(&body[0..32]).ok()?,
            value: u64::from_le_bytes(body[32..40].try_into().ok()?),
            result: u64::from_le_bytes(body[40..48].try_into().ok()?),
        })
    }

    /// The log line the program emits for this event.
    pub fn to_log_line(&self) -> String {
        format!(
            "{LOG_DATA_PREFIX}{}",
            base64::engine::general_purpose::STANDARD.encode(self.to_bytes())
        )
    }
}

/// Scan transaction logs for the first `VrfValueRead` event.
pub fn parse_value_read(logs: &[String]) -> Option<VrfValueRead> {
    logs.iter().find_map(|line| {
        let data = line.strip_prefix(LOG_DATA_PREFIX)?;
        match base64::engine::general_purpose::STANDARD.decode(data.trim()) {
            Ok(decoded) => VrfValueRead::from_bytes(&decoded),
            Err(e) => {
                debug!(error = %e, "Failed to decode base64 log data");
                None
            }
        }
    })
}

pub fn read_result_instruction(consumer_program: &Pubkey, vrf: &Pubkey) -> Instruction {
    Instruction {
        program_id: *consumer_program,
        accounts: vec![AccountMeta::new_readonly(*vrf, false)],
        data: instruction_discriminator("read_result").to_vec(),
    }
}

/// Outcome of an on-chain read.
#[derive(Debug, Clone, Serialize)]
pub struct OnchainRead {
    #[serde(serialize_with = "serialize_display")]
    pub signature: Signature,
    pub logs: Vec<String>,
    pub event: Option<VrfValueRead>,
}

/// Have the consumer program read the VRF value and return its logs.
///
/// The value is checked off-chain first so an unconfirmed account fails
/// with [`VrfError::InsufficientConfirmations`] instead of a program error.
#[instrument(skip(ledger, payer), fields(vrf = %vrf))]
pub async fn read_onchain(
    ledger: &dyn LedgerClient,
    payer: &Keypair,
    consumer_program: &Pubkey,
    vrf: &Pubkey,
) -> Result<OnchainRead, VrfError> {
    let expected = read_randomness(ledger, vrf).await?;

    let ix = read_result_instruction(consumer_program, vrf);
    let signature = ledger
        .submit_instructions(&[ix], payer, &[])
        .await
        .map_err(|e| e.rejected_as(VrfError::RejectedRequest))?;
    let logs = ledger.await_finalization(&signature).await?;

    let event = parse_value_read(&logs);
    match &event {
        Some(read) if expected.as_u64() != Some(read.value) => {
            warn!(onchain = read.value, %expected, "On-chain value differs from the account read");
        }
        Some(read) => info!(result = read.result, "On-chain read complete"),
        None => warn!(%signature, "No VrfValueRead event in transaction logs"),
    }

    Ok(OnchainRead {
        signature,
        logs,
        event,
    })
}
