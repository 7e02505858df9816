use anchor_lang::prelude::*;

pub mod errors;
pub mod events;
pub mod state;

use errors::VrfConsumerError;
use events::VrfValueRead;
use state::VrfView;

declare_id!("5CtSuAdaKUTiCvZRRAZDeGqfdNJ5ikogYoGX49pAhQkt");

/// Oracle program that owns VRF accounts.
pub const ORACLE_PROGRAM_ID: Pubkey = anchor_lang::solana_program::pubkey!("7azgmy1pFXHikv36q1zZASvFq5vFa39TT9NweVugKKTU");

/// Results are reduced to `[0, MAX_VALUE)`.
pub const MAX_VALUE: u64 = 25_000;

/// Example consumer of VRF accounts.
///
/// `read_result` only accepts a value once the VRF account holds at least
/// `min_proof_confirmations` proofs, so a program can act on it without
/// trusting the caller.
#[program]
pub mod vrf_consumer {
    use super::*;

    /// Read the verified VRF value and log `value % MAX_VALUE`.
    pub fn read_result(ctx: Context<ReadResult>) -> Result<()> {
        let vrf = &ctx.accounts.vrf;
        let data = vrf.try_borrow_data()?;
        let value = VrfView::parse(&data)?.verified_value()?;
        let result = value % MAX_VALUE;

        emit!(VrfValueRead {
            vrf: vrf.key(),
            value,
            result,
        });

        msg!("Current VRF Value [0 - {}) = {}!", MAX_VALUE, result);
        Ok(())
    }
}

/// Accounts for [`vrf_consumer::read_result`].
#[derive(Accounts)]
pub struct ReadResult<'info> {
    /// CHECK: owner is checked here, layout and confirmations in the handler.
    #[account(owner = ORACLE_PROGRAM_ID @ VrfConsumerError::InvalidVrfAccount)]
    pub vrf: UncheckedAccount<'info>,
}
