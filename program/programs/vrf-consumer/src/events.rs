use anchor_lang::prelude::*;

/// Emitted by `read_result` with the verified value and the derived result.
#[event]
pub struct VrfValueRead {
    pub vrf: Pubkey,
    pub value: u64,
    pub result: u64,
}
