//! Permit issuance for both sides of a VRF account.
//!
//! A consumer permit lets the VRF account use a fulfillment manager (the
//! manager is the granter). A producer permit lets an oracle fulfill the VRF
//! account's requests (the oracle grants itself). Both are the same account
//! layout and go through [`issue_permit`].

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tracing::{info, instrument};

use crate::accounts;
use crate::error::VrfError;
use crate::instruction;
use crate::ledger::LedgerClient;
use crate::state::{AccountType, PermitRole, VrfPermitData};

/// Publish a permit account and enable it for `role` over `subject_vrf`.
///
/// The permit is co-signed by payer, permit and granter. Returns the permit
/// keypair; its public key is what requests reference.
#[instrument(skip_all, fields(vrf = %subject_vrf, granter = %granter.pubkey(), role = ?role))]
pub async fn issue_permit(
    ledger: &dyn LedgerClient,
    payer: &Keypair,
    program_id: &Pubkey,
    subject_vrf: &Pubkey,
    granter: &Keypair,
    role: PermitRole,
) -> Result<Keypair, VrfError> {
    let permit = accounts::publish(ledger, payer, program_id, AccountType::VrfPermit).await?;

    let ix = instruction::set_vrf_permit(program_id, &permit.pubkey(), &granter.pubkey(), subject_vrf, role);
    let sig = ledger
        .submit_instructions(&[ix], payer, &[&permit, granter])
        .await
        .map_err(|e| e.rejected_as(VrfError::AuthorizationError))?;

    info!(permit = %permit.pubkey(), signature = %sig, "Permit enabled");
    Ok(permit)
}

pub async fn fetch_permit(ledger: &dyn LedgerClient, permit: &Pubkey) -> Result<VrfPermitData, VrfError> {
    let data = ledger.read_account_state(permit).await?;
    VrfPermitData::from_bytes(&data).map_err(|source| VrfError::InvalidAccountData {
        account: *permit,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedLedger;
    use crate::vrf;

    async fn initialized_vrf(ledger: &SimulatedLedger, payer: &Keypair) -> Keypair {
        let program = ledger.program_id();
        let account = vrf::create_account(ledger, payer, &program).await.unwrap();
        vrf::initialize(ledger, payer, &program, &account).await.unwrap();
        account
    }

    #[tokio::test]
    async fn roles_pick_the_grantee() {
        let program = Pubkey::new_unique();
        let ledger = SimulatedLedger::new(program);
        let payer = Keypair::new();
        let fm = Keypair::new();
        ledger.fund(&payer.pubkey(), 1_000_000_000);
        let vrf_account = initialized_vrf(&ledger, &payer).await;

        let consumer = issue_permit(&ledger, &payer, &program, &vrf_account.pubkey(), &fm, PermitRole::Consumer)
            .await
            .unwrap();
        let producer = issue_permit(&ledger, &payer, &program, &vrf_account.pubkey(), &payer, PermitRole::Producer)
            .await
            .unwrap();

        let consumer = fetch_permit(&ledger, &consumer.pubkey()).await.unwrap();
        assert!(consumer.enabled);
        assert_eq!(consumer.granter, fm.pubkey());
        assert_eq!(consumer.grantee, vrf_account.pubkey());

        let producer = fetch_permit(&ledger, &producer.pubkey()).await.unwrap();
        assert_eq!(producer.role, PermitRole::Producer);
        assert_eq!(producer.grantee, payer.pubkey());
        assert_eq!(producer.subject, vrf_account.pubkey());
    }

    #[tokio::test]
    async fn granter_must_match_bound_fulfillment_manager() {
        let program = Pubkey::new_unique();
        let ledger = SimulatedLedger::new(program);
        let payer = Keypair::new();
        ledger.fund(&payer.pubkey(), 1_000_000_000);
        let vrf_account = initialized_vrf(&ledger, &payer).await;
        let fm = Keypair::new();
        vrf::bind_fulfillment_manager(&ledger, &payer, &program, &vrf_account, &fm)
            .await
            .unwrap();

        let err = issue_permit(
            &ledger,
            &payer,
            &program,
            &vrf_account.pubkey(),
            &Keypair::new(),
            PermitRole::Consumer,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, VrfError::AuthorizationError(_)));
    }
}
