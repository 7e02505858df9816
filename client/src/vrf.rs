//! VRF account lifecycle.
//!
//! ```text
//! Uninitialized -> Initialized -> Configured (unlocked) -> Configured (locked)
//! ```
//!
//! Only a locked account can take randomness requests. Locking is one-way:
//! after it the confirmation threshold and both bindings are frozen and every
//! further configuration attempt fails with [`VrfError::ConfigLocked`].
//! Other rejections (an account that was never initialized, say) surface as
//! [`VrfError::InvalidAccountData`] or [`VrfError::Ledger`].

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use tracing::{info, instrument, warn};

use crate::accounts;
use crate::error::{LedgerError, VrfError};
use crate::instruction::{self, VrfConfigUpdate};
use crate::ledger::LedgerClient;
use crate::state::{AccountType, VrfAccountData};

/// Settings applied by [`set_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VrfSettings {
    /// Proofs required before the value is trusted.
    pub min_proof_confirmations: u32,
    /// Freeze the configuration. Irreversible.
    pub lock_configs: bool,
}

impl Default for VrfSettings {
    fn default() -> Self {
        Self {
            min_proof_confirmations: 1,
            lock_configs: true,
        }
    }
}

/// Allocate a VRF-sized account owned by the oracle program.
pub async fn create_account(
    ledger: &dyn LedgerClient,
    payer: &Keypair,
    program_id: &Pubkey,
) -> Result<Keypair, VrfError> {
    accounts::allocate(ledger, payer, program_id, VrfAccountData::SPACE).await
}

/// Mark an allocated account as a VRF account. Not idempotent.
#[instrument(skip_all, fields(vrf = %vrf.pubkey()))]
pub async fn initialize(
    ledger: &dyn LedgerClient,
    payer: &Keypair,
    program_id: &Pubkey,
    vrf: &Keypair,
) -> Result<Signature, VrfError> {
    let ix = instruction::init_account(program_id, &vrf.pubkey(), AccountType::Vrf);
    ledger
        .submit_instructions(&[ix], payer, &[vrf])
        .await
        .map_err(|e| e.rejected_as(VrfError::AllocationError))
}

#[instrument(skip_all, fields(vrf = %vrf.pubkey(), min = settings.min_proof_confirmations, lock = settings.lock_configs))]
pub async fn set_config(
    ledger: &dyn LedgerClient,
    payer: &Keypair,
    program_id: &Pubkey,
    vrf: &Keypair,
    settings: VrfSettings,
) -> Result<Signature, VrfError> {
    let update = VrfConfigUpdate {
        min_proof_confirmations: Some(settings.min_proof_confirmations),
        lock_configs: Some(settings.lock_configs),
        ..Default::default()
    };
    if update.locks() {
        warn!(vrf = %vrf.pubkey(), "Locking VRF configuration; this cannot be undone");
    }

    let sig = configure(ledger, payer, program_id, vrf, update, &[]).await?;
    info!(signature = %sig, "VRF configuration set");
    Ok(sig)
}

/// Designate the oracle allowed to fulfill requests for `vrf`.
pub async fn bind_producer(
    ledger: &dyn LedgerClient,
    payer: &Keypair,
    program_id: &Pubkey,
    vrf: &Keypair,
    producer: &Keypair,
) -> Result<Signature, VrfError> {
    let update = VrfConfigUpdate {
        randomness_producer: Some(producer.pubkey()),
        ..Default::default()
    };
    configure(ledger, payer, program_id, vrf, update, &[producer]).await
}

/// Designate the fulfillment manager mediating requests for `vrf`.
pub async fn bind_fulfillment_manager(
    ledger: &dyn LedgerClient,
    payer: &Keypair,
    program_id: &Pubkey,
    vrf: &Keypair,
    fulfillment_manager: &Keypair,
) -> Result<Signature, VrfError> {
    let update = VrfConfigUpdate {
        fulfillment_manager: Some(fulfillment_manager.pubkey()),
        ..Default::default()
    };
    configure(ledger, payer, program_id, vrf, update, &[fulfillment_manager]).await
}

async fn configure(
    ledger: &dyn LedgerClient,
    payer: &Keypair,
    program_id: &Pubkey,
    vrf: &Keypair,
    update: VrfConfigUpdate,
    cosigners: &[&Keypair],
) -> Result<Signature, VrfError> {
    if fetch_state(ledger, &vrf.pubkey()).await?.lock_configs {
        return Err(VrfError::ConfigLocked(format!("vrf account {} is locked", vrf.pubkey())));
    }

    let ix = instruction::set_vrf_config(program_id, &vrf.pubkey(), update);
    let mut signers = vec![vrf];
    signers.extend_from_slice(cosigners);

    ledger
        .submit_instructions(&[ix], payer, &signers)
        .await
        .map_err(|e| e.rejected_as(|reason| VrfError::Ledger(LedgerError::Rejected(reason))))
}

/// Read and decode the current state of a VRF account.
pub async fn fetch_state(ledger: &dyn LedgerClient, vrf: &Pubkey) -> Result<VrfAccountData, VrfError> {
    let data = ledger.read_account_state(vrf).await?;
    VrfAccountData::from_bytes(&data).map_err(|source| VrfError::InvalidAccountData {
        account: *vrf,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedLedger;

    async fn setup() -> (SimulatedLedger, Keypair, Pubkey, Keypair) {
        let program = Pubkey::new_unique();
        let ledger = SimulatedLedger::new(program);
        let payer = Keypair::new();
        ledger.fund(&payer.pubkey(), 1_000_000_000);
        let vrf = create_account(&ledger, &payer, &program).await.unwrap();
        (ledger, payer, program, vrf)
    }

    #[tokio::test]
    async fn initialize_twice_is_rejected() {
        let (ledger, payer, program, vrf) = setup().await;
        initialize(&ledger, &payer, &program, &vrf).await.unwrap();

        let state = fetch_state(&ledger, &vrf.pubkey()).await.unwrap();
        assert_eq!(state, VrfAccountData::default());

        let err = initialize(&ledger, &payer, &program, &vrf).await.unwrap_err();
        assert!(matches!(err, VrfError::AllocationError(_)));
    }

    #[tokio::test]
    async fn uninitialized_account_is_invalid_data() {
        let (ledger, _payer, _program, vrf) = setup().await;
        let err = fetch_state(&ledger, &vrf.pubkey()).await.unwrap_err();
        assert!(matches!(err, VrfError::InvalidAccountData { account, .. } if account == vrf.pubkey()));
    }

    #[tokio::test]
    async fn bindings_are_stored_and_frozen_by_lock() {
        let (ledger, payer, program, vrf) = setup().await;
        let producer = Keypair::new();
        let fm = Keypair::new();
        initialize(&ledger, &payer, &program, &vrf).await.unwrap();

        bind_producer(&ledger, &payer, &program, &vrf, &producer).await.unwrap();
        bind_fulfillment_manager(&ledger, &payer, &program, &vrf, &fm).await.unwrap();
        set_config(&ledger, &payer, &program, &vrf, VrfSettings::default()).await.unwrap();

        let state = fetch_state(&ledger, &vrf.pubkey()).await.unwrap();
        assert_eq!(state.randomness_producer, Some(producer.pubkey()));
        assert_eq!(state.fulfillment_manager, Some(fm.pubkey()));
        assert!(state.lock_configs);

        let err = bind_producer(&ledger, &payer, &program, &vrf, &Keypair::new())
            .await
            .unwrap_err();
        assert!(matches!(err, VrfError::ConfigLocked(_)));
    }

    #[tokio::test]
    async fn configuring_uninitialized_account_is_not_a_lock() {
        let (ledger, payer, program, vrf) = setup().await;

        let err = set_config(&ledger, &payer, &program, &vrf, VrfSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VrfError::InvalidAccountData { account, .. } if account == vrf.pubkey()));
    }

    #[tokio::test]
    async fn unlocked_config_can_be_changed() {
        let (ledger, payer, program, vrf) = setup().await;
        initialize(&ledger, &payer, &program, &vrf).await.unwrap();

        let unlocked = VrfSettings {
            min_proof_confirmations: 2,
            lock_configs: false,
        };
        set_config(&ledger, &payer, &program, &vrf, unlocked).await.unwrap();
        set_config(&ledger, &payer, &program, &vrf, VrfSettings { min_proof_confirmations: 3, ..unlocked })
            .await
            .unwrap();

        let state = fetch_state(&ledger, &vrf.pubkey()).await.unwrap();
        assert_eq!(state.min_proof_confirmations, 3);
        assert!(!state.lock_configs);
    }
}
