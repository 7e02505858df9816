//! Fixed-layout decoding of oracle program accounts.
//!
//! Every account owned by the oracle program starts with a one-byte
//! [`AccountType`] tag. The payload that follows is little-endian, with
//! optional public keys stored as a presence byte plus 32 key bytes.
//!
//! ```text
//! VRF:        tag | min u32 | num u32 | lock u8 | producer? | fm? | value_len u32 | value
//! permit:     tag | enabled u8 | role u8 | granter [32] | grantee [32] | subject [32]
//! fm:         tag | heartbeat_auth u8 | usage_auth u8 | lock u8
//! fm auth:    tag | fm [32] | grantee [32] | authorize_heartbeat u8 | authorize_usage u8
//! ```

use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Account type tag stored in the first byte of every oracle account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum AccountType {
    Uninitialized = 0,
    FulfillmentManager = 1,
    FulfillmentManagerAuth = 2,
    Vrf = 3,
    VrfPermit = 4,
}

impl AccountType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Uninitialized),
            1 => Some(Self::FulfillmentManager),
            2 => Some(Self::FulfillmentManagerAuth),
            3 => Some(Self::Vrf),
            4 => Some(Self::VrfPermit),
            _ => None,
        }
    }

    /// Bytes allocated for an account of this type.
    pub const fn space(self) -> usize {
        match self {
            Self::Vrf => VrfAccountData::SPACE,
            _ => 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("data too short: need {needed} bytes, have {actual}")]
    TooShort { needed: usize, actual: usize },

    #[error("expected {expected:?} account, found tag {found}")]
    WrongType { expected: AccountType, found: u8 },

    #[error("invalid boolean byte {0}")]
    InvalidFlag(u8),

    #[error("unknown permit role {0}")]
    UnknownRole(u8),
}

/// Which side of the protocol a permit authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PermitRole {
    /// The fulfillment manager lets the VRF account use it; the grantee is
    /// the VRF account itself.
    Consumer = 0,
    /// A producer permits itself to fulfill the VRF account's requests.
    Producer = 1,
}

impl PermitRole {
    pub fn from_tag(tag: u8) -> Result<Self, DecodeError> {
        match tag {
            0 => Ok(Self::Consumer),
            1 => Ok(Self::Producer),
            other => Err(DecodeError::UnknownRole(other)),
        }
    }

    /// The account this permit is issued to.
    pub fn grantee(self, granter: Pubkey, subject: Pubkey) -> Pubkey {
        match self {
            Self::Consumer => subject,
            Self::Producer => granter,
        }
    }
}

/// Decoded state of a VRF account.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VrfAccountData {
    pub min_proof_confirmations: u32,
    pub num_proof_confirmations: u32,
    pub lock_configs: bool,
    pub randomness_producer: Option<Pubkey>,
    pub fulfillment_manager: Option<Pubkey>,
    pub value: Vec<u8>,
}

impl VrfAccountData {
    /// Allocation size requested for new VRF accounts.
    pub const SPACE: usize = 1000;

    /// Header size before the variable-length value bytes.
    const HEADER_LEN: usize = 1 + 4 + 4 + 1 + 33 + 33 + 4;

    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        r.expect_type(AccountType::Vrf)?;
        r.require(Self::HEADER_LEN - 1)?;

        let min_proof_confirmations = r.u32()?;
        let num_proof_confirmations = r.u32()?;
        let lock_configs = r.flag()?;
        let randomness_producer = r.optional_pubkey()?;
        let fulfillment_manager = r.optional_pubkey()?;
        let value_len = r.u32()? as usize;
        let value = r.bytes(value_len)?.to_vec();

        Ok(Self {
            min_proof_confirmations,
            num_proof_confirmations,
            lock_configs,
            randomness_producer,
            fulfillment_manager,
            value,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::HEADER_LEN + self.value.len());
        buf.push(AccountType::Vrf as u8);
        buf.extend_from_slice(&self.min_proof_confirmations.to_le_bytes());
        buf.extend_from_slice(&self.num_proof_confirmations.to_le_bytes());
        buf.push(self.lock_configs as u8);
        put_optional_pubkey(&mut buf, self.randomness_producer.as_ref());
        put_optional_pubkey(&mut buf, self.fulfillment_manager.as_ref());
        buf.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.value);
        buf
    }

    /// Whether enough independent proofs back the current value.
    pub fn is_confirmed(&self) -> bool {
        self.num_proof_confirmations >= self.min_proof_confirmations
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrfPermitData {
    pub enabled: bool,
    pub role: PermitRole,
    pub granter: Pubkey,
    pub grantee: Pubkey,
    pub subject: Pubkey,
}

impl VrfPermitData {
    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        r.expect_type(AccountType::VrfPermit)?;
        Ok(Self {
            enabled: r.flag()?,
            role: PermitRole::from_tag(r.u8()?)?,
            granter: r.pubkey()?,
            grantee: r.pubkey()?,
            subject: r.pubkey()?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + 2 + 96);
        buf.push(AccountType::VrfPermit as u8);
        buf.push(self.enabled as u8);
        buf.push(self.role as u8);
        buf.extend_from_slice(self.granter.as_ref());
        buf.extend_from_slice(self.grantee.as_ref());
        buf.extend_from_slice(self.subject.as_ref());
        buf
    }
}

/// Fulfillment manager configuration. Immutable once `lock` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentManagerConfig {
    pub heartbeat_auth_required: bool,
    pub usage_auth_required: bool,
    pub lock: bool,
}

impl FulfillmentManagerConfig {
    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        r.expect_type(AccountType::FulfillmentManager)?;
        Ok(Self {
            heartbeat_auth_required: r.flag()?,
            usage_auth_required: r.flag()?,
            lock: r.flag()?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        vec![
            AccountType::FulfillmentManager as u8,
            self.heartbeat_auth_required as u8,
            self.usage_auth_required as u8,
            self.lock as u8,
        ]
    }
}

/// Permissions a fulfillment manager grants to one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPermissions {
    pub authorize_heartbeat: bool,
    pub authorize_usage: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentManagerAuthData {
    pub fulfillment_manager: Pubkey,
    pub grantee: Pubkey,
    pub permissions: AuthPermissions,
}

impl FulfillmentManagerAuthData {
    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        r.expect_type(AccountType::FulfillmentManagerAuth)?;
        Ok(Self {
            fulfillment_manager: r.pubkey()?,
            grantee: r.pubkey()?,
            permissions: AuthPermissions {
                authorize_heartbeat: r.flag()?,
                authorize_usage: r.flag()?,
            },
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + 64 + 2);
        buf.push(AccountType::FulfillmentManagerAuth as u8);
        buf.extend_from_slice(self.fulfillment_manager.as_ref());
        buf.extend_from_slice(self.grantee.as_ref());
        buf.push(self.permissions.authorize_heartbeat as u8);
        buf.push(self.permissions.authorize_usage as u8);
        buf
    }
}

/// Read the type tag without decoding the payload.
pub fn account_type(data: &[u8]) -> Option<AccountType> {
    data.first().copied().and_then(AccountType::from_tag)
}

fn put_optional_pubkey(buf: &mut Vec<u8>, key: Option<&Pubkey>) {
    match key {
        Some(key) => {
            buf.push(1);
            buf.extend_from_slice(key.as_ref());
        }
        None => buf.extend_from_slice(&[0u8; 33]),
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn require(&self, len: usize) -> Result<(), DecodeError> {
        let needed = self.pos + len;
        if self.data.len() < needed {
            return Err(DecodeError::TooShort {
                needed,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.require(len)?;
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.bytes(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.bytes(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn flag(&mut self) -> Result<bool, DecodeError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidFlag(other)),
        }
    }

    fn pubkey(&mut self) -> Result<Pubkey, DecodeError> {
        let mut raw = [0u8; 32];
        raw.copy_from_slice(self.bytes(32)?);
        Ok(Pubkey::new_from_array(raw))
    }

    fn optional_pubkey(&mut self) -> Result<Option<Pubkey>, DecodeError> {
        let present = self.flag()?;
        let key = self.pubkey()?;
        Ok(present.then_some(key))
    }

    fn expect_type(&mut self, expected: AccountType) -> Result<(), DecodeError> {
        let found = self.u8()?;
        if found != expected as u8 {
            return Err(DecodeError::WrongType { expected, found });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vrf() -> VrfAccountData {
        VrfAccountData {
            min_proof_confirmations: 5,
            num_proof_confirmations: 2,
            lock_configs: true,
            randomness_producer: Some(Pubkey::new_unique()),
            fulfillment_manager: None,
            value: vec![0, 0, 0, 0, 0, 0, 0, 42],
        }
    }

    #[test]
    fn vrf_layout_is_stable() {
        let vrf = sample_vrf();
        let mut bytes = vrf.to_bytes();
        // Trailing allocation padding is ignored.
        bytes.resize(VrfAccountData::SPACE, 0);

        assert_eq!(bytes[0], AccountType::Vrf as u8);
        assert_eq!(&bytes[1..5], &5u32.to_le_bytes());
        assert_eq!(VrfAccountData::from_bytes(&bytes).unwrap(), vrf);
    }

    #[test]
    fn rejects_wrong_account_type() {
        let permit = VrfPermitData {
            enabled: true,
            role: PermitRole::Consumer,
            granter: Pubkey::new_unique(),
            grantee: Pubkey::new_unique(),
            subject: Pubkey::new_unique(),
        };
        let err = VrfAccountData::from_bytes(&permit.to_bytes()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::WrongType {
                expected: AccountType::Vrf,
                found: AccountType::VrfPermit as u8
            }
        );
    }

    #[test]
    fn truncated_vrf_is_too_short() {
        let bytes = sample_vrf().to_bytes();
        let err = VrfAccountData::from_bytes(&bytes[..20]).unwrap_err();
        assert!(matches!(err, DecodeError::TooShort { .. }));
    }

    #[test]
    fn uninitialized_account_is_not_vrf() {
        let zeroed = vec![0u8; VrfAccountData::SPACE];
        assert_eq!(account_type(&zeroed), Some(AccountType::Uninitialized));
        assert!(VrfAccountData::from_bytes(&zeroed).is_err());
    }

    #[test]
    fn invalid_flag_byte_is_rejected() {
        let mut bytes = sample_vrf().to_bytes();
        bytes[9] = 7;
        assert_eq!(
            VrfAccountData::from_bytes(&bytes).unwrap_err(),
            DecodeError::InvalidFlag(7)
        );
    }

    #[test]
    fn permit_role_selects_grantee() {
        let granter = Pubkey::new_unique();
        let subject = Pubkey::new_unique();
        assert_eq!(PermitRole::Consumer.grantee(granter, subject), subject);
        assert_eq!(PermitRole::Producer.grantee(granter, subject), granter);
        assert_eq!(PermitRole::from_tag(9), Err(DecodeError::UnknownRole(9)));
    }

    #[test]
    fn confirmation_threshold() {
        let mut vrf = sample_vrf();
        assert!(!vrf.is_confirmed());
        vrf.num_proof_confirmations = 5;
        assert!(vrf.is_confirmed());
    }
}
