use anchor_lang::prelude::*;

/// Error codes for the consumer program.
///
/// Anchor encodes these as `6000 + variant index` in on-chain error responses.
#[error_code]
pub enum VrfConsumerError {
    /// The account data is not a VRF account of the oracle program.
    #[msg("Invalid VRF account")]
    InvalidVrfAccount,
    /// Fewer proofs than `min_proof_confirmations` back the current value.
    #[msg("insufficient proof confirmations")]
    InsufficientConfirmations,
    /// The value holds fewer than eight bytes.
    #[msg("VRF value too short")]
    ValueTooShort,
}
