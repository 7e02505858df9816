//! Instruction encoding for the oracle program and the system program.
//!
//! Oracle instructions are a one-byte tag followed by a fixed payload.
//! Optional configuration fields are announced by a presence bitmask so a
//! single `SetVrfConfig` can touch any subset of fields.

use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

use crate::state::{AccountType, AuthPermissions, FulfillmentManagerConfig, PermitRole};

/// Fields of a VRF configuration update. `None` leaves a field untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VrfConfigUpdate {
    pub min_proof_confirmations: Option<u32>,
    pub lock_configs: Option<bool>,
    pub randomness_producer: Option<Pubkey>,
    pub fulfillment_manager: Option<Pubkey>,
}

impl VrfConfigUpdate {
    const MIN_CONFIRMATIONS: u8 = 1 << 0;
    const LOCK: u8 = 1 << 1;
    const PRODUCER: u8 = 1 << 2;
    const FULFILLMENT_MANAGER: u8 = 1 << 3;

    pub fn locks(&self) -> bool {
        self.lock_configs == Some(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleInstruction {
    /// Stamp an allocated account with its type.
    InitAccount { account_type: AccountType },
    SetFulfillmentManagerConfig(FulfillmentManagerConfig),
    CreateFulfillmentManagerAuth(AuthPermissions),
    SetVrfConfig(VrfConfigUpdate),
    SetVrfPermit { enabled: bool, role: PermitRole },
    RequestRandomness,
}

impl OracleInstruction {
    const INIT_ACCOUNT: u8 = 0;
    const SET_FM_CONFIG: u8 = 1;
    const CREATE_FM_AUTH: u8 = 2;
    const SET_VRF_CONFIG: u8 = 3;
    const SET_VRF_PERMIT: u8 = 4;
    const REQUEST_RANDOMNESS: u8 = 5;

    pub fn pack(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(1 + 1 + 4 + 1 + 64);
        match self {
            Self::InitAccount { account_type } => {
                data.push(Self::INIT_ACCOUNT);
                data.push(*account_type as u8);
            }
            Self::SetFulfillmentManagerConfig(config) => {
                data.push(Self::SET_FM_CONFIG);
                data.push(config.heartbeat_auth_required as u8);
                data.push(config.usage_auth_required as u8);
                data.push(config.lock as u8);
            }
            Self::CreateFulfillmentManagerAuth(permissions) => {
                data.push(Self::CREATE_FM_AUTH);
                data.push(permissions.authorize_heartbeat as u8);
                data.push(permissions.authorize_usage as u8);
            }
            Self::SetVrfConfig(update) => {
                data.push(Self::SET_VRF_CONFIG);
                let mut mask = 0u8;
                if update.min_proof_confirmations.is_some() {
                    mask |= VrfConfigUpdate::MIN_CONFIRMATIONS;
                }
                if update.lock_configs.is_some() {
                    mask |= VrfConfigUpdate::LOCK;
                }
                if update.randomness_producer.is_some() {
                    mask |= VrfConfigUpdate::PRODUCER;
                }
                if update.fulfillment_manager.is_some() {
                    mask |= VrfConfigUpdate::FULFILLMENT_MANAGER;
                }
                data.push(mask);
                if let Some(min) = update.min_proof_confirmations {
                    data.extend_from_slice(&min.to_le_bytes());
                }
                if let Some(lock) = update.lock_configs {
                    data.push(lock as u8);
                }
                if let Some(producer) = update.randomness_producer {
                    data.extend_from_slice(producer.as_ref());
                }
                if let Some(fm) = update.fulfillment_manager {
                    data.extend_from_slice(fm.as_ref());
                }
            }
            Self::SetVrfPermit { enabled, role } => {
                data.push(Self::SET_VRF_PERMIT);
                data.push(*enabled as u8);
                data.push(*role as u8);
            }
            Self::RequestRandomness => data.push(Self::REQUEST_RANDOMNESS),
        }
        data
    }

    /// Decode instruction data. Returns `None` for anything malformed.
    pub fn unpack(data: &[u8]) -> Option<Self> {
        let (&tag, rest) = data.split_first()?;
        let flag = |b: u8| match b {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        };

        let ix = match tag {
            Self::INIT_ACCOUNT => Self::InitAccount {
                account_type: AccountType::from_tag(*rest.first()?)?,
            },
            Self::SET_FM_CONFIG => {
                let [heartbeat, usage, lock] = rest.get(..3)?.try_into().ok()?;
                Self::SetFulfillmentManagerConfig(FulfillmentManagerConfig {
                    heartbeat_auth_required: flag(heartbeat)?,
                    usage_auth_required: flag(usage)?,
                    lock: flag(lock)?,
                })
            }
            Self::CREATE_FM_AUTH => {
                let [heartbeat, usage] = rest.get(..2)?.try_into().ok()?;
                Self::CreateFulfillmentManagerAuth(AuthPermissions {
                    authorize_heartbeat: flag(heartbeat)?,
                    authorize_usage: flag(usage)?,
                })
            }
            Self::SET_VRF_CONFIG => {
                let (&mask, mut body) = rest.split_first()?;
                let mut update = VrfConfigUpdate::default();
                if mask & VrfConfigUpdate::MIN_CONFIRMATIONS != 0 {
                    update.min_proof_confirmations =
                        Some(u32::from_le_bytes(body.get(..4)?.try_into().ok()?));
                    body = &body[4..];
                }
                if mask & VrfConfigUpdate::LOCK != 0 {
                    update.lock_configs = Some(flag(*body.first()?)?);
                    body = &body[1..];
                }
                if mask & VrfConfigUpdate::PRODUCER != 0 {
                    update.randomness_producer = Some(Pubkey::try_from(body.get(..32)?).ok()?);
                    body = &body[32..];
                }
                if mask & VrfConfigUpdate::FULFILLMENT_MANAGER != 0 {
                    update.fulfillment_manager = Some(Pubkey::try_from(body.get(..32)?).ok()?);
                }
                Self::SetVrfConfig(update)
            }
            Self::SET_VRF_PERMIT => {
                let [enabled, role] = rest.get(..2)?.try_into().ok()?;
                Self::SetVrfPermit {
                    enabled: flag(enabled)?,
                    role: PermitRole::from_tag(role).ok()?,
                }
            }
            Self::REQUEST_RANDOMNESS => Self::RequestRandomness,
            _ => return None,
        };
        Some(ix)
    }
}

/// System program `CreateAccount`: allocate `space` bytes owned by `owner`.
pub fn create_account(
    payer: &Pubkey,
    new_account: &Pubkey,
    lamports: u64,
    space: u64,
    owner: &Pubkey,
) -> Instruction {
    // Bincode layout: u32 variant index (0) + lamports + space + owner.
    let mut data = Vec::with_capacity(4 + 8 + 8 + 32);
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    data.extend_from_slice(&space.to_le_bytes());
    data.extend_from_slice(owner.as_ref());

    Instruction {
        program_id: solana_sdk_ids::system_program::ID,
        accounts: vec![
            AccountMeta::new(*payer, true),       // funding account
            AccountMeta::new(*new_account, true), // new account
        ],
        data,
    }
}

/// Decode a system `CreateAccount` payload into `(lamports, space, owner)`.
pub fn unpack_create_account(data: &[u8]) -> Option<(u64, u64, Pubkey)> {
    if data.len() < 52 || data[0..4] != 0u32.to_le_bytes() {
        return None;
    }
    let lamports = u64::from_le_bytes(data[4..12].try_into().ok()?);
    let space = u64::from_le_bytes(data[12..20].try_into().ok()?);
    let owner = Pubkey::try_from(&data[20..52]).ok()?;
    Some((lamports, space, owner))
}

pub fn init_account(program_id: &Pubkey, account: &Pubkey, account_type: AccountType) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![AccountMeta::new(*account, true)],
        data: OracleInstruction::InitAccount { account_type }.pack(),
    }
}

pub fn set_fulfillment_manager_config(
    program_id: &Pubkey,
    fulfillment_manager: &Pubkey,
    config: FulfillmentManagerConfig,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![AccountMeta::new(*fulfillment_manager, true)],
        data: OracleInstruction::SetFulfillmentManagerConfig(config).pack(),
    }
}

pub fn create_fulfillment_manager_auth(
    program_id: &Pubkey,
    auth: &Pubkey,
    fulfillment_manager: &Pubkey,
    grantee: &Pubkey,
    permissions: AuthPermissions,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*auth, true),                         // auth account
            AccountMeta::new_readonly(*fulfillment_manager, true), // granting manager
            AccountMeta::new_readonly(*grantee, false),            // authorized account
        ],
        data: OracleInstruction::CreateFulfillmentManagerAuth(permissions).pack(),
    }
}

/// `SetVrfConfig`. A newly bound producer or fulfillment manager must
/// co-sign, so it is appended as a read-only signer.
pub fn set_vrf_config(program_id: &Pubkey, vrf: &Pubkey, update: VrfConfigUpdate) -> Instruction {
    let mut accounts = vec![AccountMeta::new(*vrf, true)];
    if let Some(producer) = update.randomness_producer {
        accounts.push(AccountMeta::new_readonly(producer, true));
    }
    if let Some(fm) = update.fulfillment_manager {
        accounts.push(AccountMeta::new_readonly(fm, true));
    }

    Instruction {
        program_id: *program_id,
        accounts,
        data: OracleInstruction::SetVrfConfig(update).pack(),
    }
}

pub fn set_vrf_permit(
    program_id: &Pubkey,
    permit: &Pubkey,
    granter: &Pubkey,
    subject_vrf: &Pubkey,
    role: PermitRole,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*permit, true),                 // permit (writable)
            AccountMeta::new_readonly(*granter, true),       // granter
            AccountMeta::new_readonly(*subject_vrf, false),  // subject VRF
        ],
        data: OracleInstruction::SetVrfPermit { enabled: true, role }.pack(),
    }
}

pub fn request_randomness(
    program_id: &Pubkey,
    vrf: &Pubkey,
    consumer_permit: &Pubkey,
    producer_permit: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*vrf, true),                        // VRF account (writable)
            AccountMeta::new_readonly(*consumer_permit, false),  // consumer permit
            AccountMeta::new_readonly(*producer_permit, false),  // producer permit
        ],
        data: OracleInstruction::RequestRandomness.pack(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vrf_config_packs_only_present_fields() {
        let lock_only = VrfConfigUpdate {
            min_proof_confirmations: Some(1),
            lock_configs: Some(true),
            ..Default::default()
        };
        let data = OracleInstruction::SetVrfConfig(lock_only).pack();
        assert_eq!(data, vec![3, 0b0011, 1, 0, 0, 0, 1]);
        assert_eq!(
            OracleInstruction::unpack(&data),
            Some(OracleInstruction::SetVrfConfig(lock_only))
        );
    }

    #[test]
    fn binding_a_producer_requires_its_signature() {
        let program = Pubkey::new_unique();
        let vrf = Pubkey::new_unique();
        let producer = Pubkey::new_unique();
        let ix = set_vrf_config(
            &program,
            &vrf,
            VrfConfigUpdate {
                randomness_producer: Some(producer),
                ..Default::default()
            },
        );

        assert_eq!(ix.accounts.len(), 2);
        assert_eq!(ix.accounts[1].pubkey, producer);
        assert!(ix.accounts[1].is_signer);
        assert!(!ix.accounts[1].is_writable);
    }

    #[test]
    fn request_references_permits_read_only() {
        let program = Pubkey::new_unique();
        let (vrf, consumer, producer) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let ix = request_randomness(&program, &vrf, &consumer, &producer);

        assert!(ix.accounts[0].is_writable && ix.accounts[0].is_signer);
        assert!(ix.accounts[1..].iter().all(|m| !m.is_writable && !m.is_signer));
        assert_eq!(OracleInstruction::unpack(&ix.data), Some(OracleInstruction::RequestRandomness));
    }

    #[test]
    fn create_account_layout() {
        let (payer, new, owner) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let ix = create_account(&payer, &new, 1_000, 250, &owner);
        assert_eq!(ix.data.len(), 52);
        assert_eq!(unpack_create_account(&ix.data), Some((1_000, 250, owner)));
    }

    #[test]
    fn unknown_or_truncated_data_is_rejected() {
        assert_eq!(OracleInstruction::unpack(&[]), None);
        assert_eq!(OracleInstruction::unpack(&[99]), None);
        assert_eq!(OracleInstruction::unpack(&[1, 1]), None);
        assert_eq!(OracleInstruction::unpack(&[4, 2, 0]), None);
    }
}
