use anchor_lang::prelude::*;

use crate::errors::VrfConsumerError;

/// Account type tag of VRF accounts.
const VRF_TAG: u8 = 3;

/// Byte offsets into a VRF account.
///
/// `tag | min u32 | num u32 | lock u8 | producer (1 + 32) | fm (1 + 32) | value_len u32 | value`
const MIN_OFFSET: usize = 1;
const NUM_OFFSET: usize = 5;
const VALUE_LEN_OFFSET: usize = 1 + 4 + 4 + 1 + 33 + 33;
const VALUE_OFFSET: usize = VALUE_LEN_OFFSET + 4;

/// Read-only view of the oracle program's VRF account.
pub struct VrfView<'a> {
    pub min_proof_confirmations: u32,
    pub num_proof_confirmations: u32,
    pub value: &'a [u8],
}

impl<'a> VrfView<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < VALUE_OFFSET || data[0] != VRF_TAG {
            return err!(VrfConsumerError::InvalidVrfAccount);
        }
        let value_len = read_u32(data, VALUE_LEN_OFFSET) as usize;
        let value = data
            .get(VALUE_OFFSET..VALUE_OFFSET + value_len)
            .ok_or(VrfConsumerError::InvalidVrfAccount)?;

        Ok(Self {
            min_proof_confirmations: read_u32(data, MIN_OFFSET),
            num_proof_confirmations: read_u32(data, NUM_OFFSET),
            value,
        })
    }

    /// First eight value bytes as a big-endian integer, once enough proofs
    /// confirm it.
    pub fn verified_value(&self) -> Result<u64> {
        require!(
            self.num_proof_confirmations >= self.min_proof_confirmations,
            VrfConsumerError::InsufficientConfirmations
        );
        let bytes: [u8; 8] = self
            .value
            .get(..8)
            .and_then(|b| b.try_into().ok())
            .ok_or(VrfConsumerError::ValueTooShort)?;
        Ok(u64::from_be_bytes(bytes))
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(raw)
}
