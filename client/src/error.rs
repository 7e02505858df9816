//! Error taxonomy for VRF account, permit and request operations.
//!
//! Ledger-level failures arrive as [`LedgerError`]. Each operation decides
//! which [`VrfError`] variant a program rejection means for it (a rejected
//! permit is an [`VrfError::AuthorizationError`], a rejected request is a
//! [`VrfError::RejectedRequest`]). [`VrfError::ConfigLocked`] is reported
//! only for an account whose lock flag is set. Rejections are never retried.

use solana_sdk::pubkey::Pubkey;
use std::path::PathBuf;
use thiserror::Error;

use crate::poll::Transient;
use crate::state::DecodeError;

/// Failures reported by a [`LedgerClient`](crate::ledger::LedgerClient).
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    /// The ledger or the oracle program refused the transaction.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// A signer required by one of the instructions was not supplied.
    #[error("missing required signature: {0}")]
    MissingSignature(String),

    /// The account does not exist (or holds no data) on the ledger.
    #[error("account {0} not found")]
    AccountNotFound(Pubkey),

    /// RPC / network failure. Safe to retry.
    #[error("ledger transport error: {0}")]
    Transport(String),

    /// The transaction did not reach the requested commitment in time.
    #[error("timed out waiting for transaction {0}")]
    Timeout(String),
}

impl LedgerError {
    /// Convert a program rejection into the operation-specific variant.
    ///
    /// Missing signatures are always an [`VrfError::AuthorizationError`];
    /// transport and lookup failures pass through unchanged.
    pub fn rejected_as(self, kind: impl FnOnce(String) -> VrfError) -> VrfError {
        match self {
            LedgerError::Rejected(reason) => kind(reason),
            LedgerError::MissingSignature(signer) => {
                VrfError::AuthorizationError(format!("missing required signature: {signer}"))
            }
            other => VrfError::Ledger(other),
        }
    }
}

impl Transient for LedgerError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            LedgerError::Transport(_) | LedgerError::AccountNotFound(_) | LedgerError::Timeout(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum VrfError {
    #[error("keypair file already exists at {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("keypair file not found at {}", path.display())]
    NotFound { path: PathBuf },

    #[error("invalid keypair file {}: {reason}", path.display())]
    InvalidKeypair { path: PathBuf, reason: String },

    #[error("keypair file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("account allocation rejected: {0}")]
    AllocationError(String),

    #[error("authorization rejected: {0}")]
    AuthorizationError(String),

    #[error("randomness request rejected: {0}")]
    RejectedRequest(String),

    #[error("configuration is locked: {0}")]
    ConfigLocked(String),

    #[error("insufficient proof confirmations: have {confirmations}, need {required}")]
    InsufficientConfirmations { confirmations: u32, required: u32 },

    #[error("randomness not confirmed after {attempts} attempts")]
    ConfirmationTimeout { attempts: u32 },

    #[error("polling cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },

    #[error("account {account} holds invalid data: {source}")]
    InvalidAccountData {
        account: Pubkey,
        #[source]
        source: DecodeError,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl Transient for VrfError {
    fn is_transient(&self) -> bool {
        match self {
            VrfError::Ledger(err) => err.is_transient(),
            _ => false,
        }
    }
}
