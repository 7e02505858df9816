//! Fulfillment manager accounts and the oracles registered with them.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use tracing::{info, instrument, warn};

use crate::accounts;
use crate::error::{LedgerError, VrfError};
use crate::instruction;
use crate::ledger::LedgerClient;
use crate::state::{AccountType, AuthPermissions, FulfillmentManagerAuthData, FulfillmentManagerConfig};

/// Allocate and initialize a fulfillment manager account.
pub async fn create_fulfillment_manager(
    ledger: &dyn LedgerClient,
    payer: &Keypair,
    program_id: &Pubkey,
) -> Result<Keypair, VrfError> {
    accounts::publish(ledger, payer, program_id, AccountType::FulfillmentManager).await
}

#[instrument(skip_all, fields(fm = %fulfillment_manager.pubkey()))]
pub async fn set_fulfillment_manager_config(
    ledger: &dyn LedgerClient,
    payer: &Keypair,
    program_id: &Pubkey,
    fulfillment_manager: &Keypair,
    config: FulfillmentManagerConfig,
) -> Result<Signature, VrfError> {
    let current = fetch_fulfillment_manager(ledger, &fulfillment_manager.pubkey()).await?;
    if current.lock {
        return Err(VrfError::ConfigLocked(format!(
            "fulfillment manager {} is locked",
            fulfillment_manager.pubkey()
        )));
    }
    if config.lock {
        warn!("Locking fulfillment manager configuration; this cannot be undone");
    }

    let ix = instruction::set_fulfillment_manager_config(program_id, &fulfillment_manager.pubkey(), config);
    let sig = ledger
        .submit_instructions(&[ix], payer, &[fulfillment_manager])
        .await
        .map_err(|e| e.rejected_as(|reason| VrfError::Ledger(LedgerError::Rejected(reason))))?;

    info!(signature = %sig, ?config, "Fulfillment manager configured");
    Ok(sig)
}

/// Register `grantee` (an oracle) with the fulfillment manager.
///
/// Creates the auth account and writes its permissions in a second
/// transaction co-signed by the manager.
#[instrument(skip_all, fields(fm = %fulfillment_manager.pubkey(), grantee = %grantee))]
pub async fn create_fulfillment_manager_auth(
    ledger: &dyn LedgerClient,
    payer: &Keypair,
    program_id: &Pubkey,
    fulfillment_manager: &Keypair,
    grantee: &Pubkey,
    permissions: AuthPermissions,
) -> Result<Keypair, VrfError> {
    let auth = accounts::allocate(ledger, payer, program_id, AccountType::FulfillmentManagerAuth.space()).await?;

    let ix = instruction::create_fulfillment_manager_auth(
        program_id,
        &auth.pubkey(),
        &fulfillment_manager.pubkey(),
        grantee,
        permissions,
    );
    ledger
        .submit_instructions(&[ix], payer, &[&auth, fulfillment_manager])
        .await
        .map_err(|e| e.rejected_as(VrfError::AuthorizationError))?;

    info!(auth = %auth.pubkey(), "Oracle registered with fulfillment manager");
    Ok(auth)
}

pub async fn fetch_fulfillment_manager(
    ledger: &dyn LedgerClient,
    fulfillment_manager: &Pubkey,
) -> Result<FulfillmentManagerConfig, VrfError> {
    let data = ledger.read_account_state(fulfillment_manager).await?;
    FulfillmentManagerConfig::from_bytes(&data).map_err(|source| VrfError::InvalidAccountData {
        account: *fulfillment_manager,
        source,
    })
}

pub async fn fetch_fulfillment_manager_auth(
    ledger: &dyn LedgerClient,
    auth: &Pubkey,
) -> Result<FulfillmentManagerAuthData, VrfError> {
    let data = ledger.read_account_state(auth).await?;
    FulfillmentManagerAuthData::from_bytes(&data).map_err(|source| VrfError::InvalidAccountData {
        account: *auth,
        source,
    })
}
