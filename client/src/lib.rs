//! VRF account lifecycle, permits, randomness requests and confirmation
//! polling against an oracle program on Solana.

pub mod accounts;
pub mod commands;
pub mod config;
pub mod display;
pub mod error;
pub mod fulfillment;
pub mod instruction;
pub mod keystore;
pub mod ledger;
pub mod onchain;
pub mod permit;
pub mod poll;
pub mod randomness;
pub mod request;
pub mod sim;
pub mod state;
pub mod vrf;

pub use error::{LedgerError, VrfError};
pub use ledger::{LedgerClient, RpcLedger};
pub use poll::{PollConfig, PollOutcome, poll_until};
pub use randomness::RandomValue;
pub use state::PermitRole;
