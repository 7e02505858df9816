//! Randomness requests.
//!
//! A request only starts the cycle: the oracle network writes the value
//! and its proof confirmations into the VRF account later, which is what
//! [`crate::randomness::await_randomness`] waits for.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use tracing::{info, instrument};

use crate::error::VrfError;
use crate::instruction;
use crate::ledger::LedgerClient;
use crate::permit::fetch_permit;
use crate::state::PermitRole;
use crate::vrf::fetch_state;

/// Submit a randomness request for `vrf`.
///
/// The account must be locked and both permits enabled for it; otherwise
/// the request fails with [`VrfError::RejectedRequest`] before anything is
/// sent. A request the ledger refuses (for example while a previous one is
/// still collecting confirmations) fails the same way.
#[instrument(skip_all, fields(vrf = %vrf.pubkey()))]
pub async fn request(
    ledger: &dyn LedgerClient,
    payer: &Keypair,
    program_id: &Pubkey,
    vrf: &Keypair,
    consumer_permit: &Pubkey,
    producer_permit: &Pubkey,
) -> Result<Signature, VrfError> {
    preflight(ledger, &vrf.pubkey(), consumer_permit, producer_permit).await?;

    let ix = instruction::request_randomness(program_id, &vrf.pubkey(), consumer_permit, producer_permit);
    let sig = ledger
        .submit_instructions(&[ix], payer, &[vrf])
        .await
        .map_err(|e| e.rejected_as(VrfError::RejectedRequest))?;

    info!(signature = %sig, "Randomness requested");
    Ok(sig)
}

async fn preflight(
    ledger: &dyn LedgerClient,
    vrf: &Pubkey,
    consumer_permit: &Pubkey,
    producer_permit: &Pubkey,
) -> Result<(), VrfError> {
    let state = fetch_state(ledger, vrf).await?;
    if !state.lock_configs {
        return Err(VrfError::RejectedRequest(format!(
            "vrf account {vrf} must be locked before requesting randomness"
        )));
    }

    for (key, role) in [(consumer_permit, PermitRole::Consumer), (producer_permit, PermitRole::Producer)] {
        let permit = fetch_permit(ledger, key).await?;
        if !permit.enabled {
            return Err(VrfError::RejectedRequest(format!("permit {key} is not enabled")));
        }
        if permit.role != role {
            return Err(VrfError::RejectedRequest(format!(
                "permit {key} is a {:?} permit, expected {role:?}",
                permit.role
            )));
        }
        if permit.subject != *vrf {
            return Err(VrfError::RejectedRequest(format!(
                "permit {key} was issued for {}, not {vrf}",
                permit.subject
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts;
    use crate::permit::issue_permit;
    use crate::state::AccountType;
    use crate::sim::SimulatedLedger;
    use crate::vrf::{self, VrfSettings};

    struct Fixture {
        ledger: SimulatedLedger,
        payer: Keypair,
        program: Pubkey,
        vrf: Keypair,
    }

    async fn fixture(lock: bool) -> Fixture {
        let program = Pubkey::new_unique();
        let ledger = SimulatedLedger::new(program);
        let payer = Keypair::new();
        ledger.fund(&payer.pubkey(), 1_000_000_000);

        let vrf = vrf::create_account(&ledger, &payer, &program).await.unwrap();
        vrf::initialize(&ledger, &payer, &program, &vrf).await.unwrap();
        let settings = VrfSettings {
            min_proof_confirmations: 1,
            lock_configs: lock,
        };
        vrf::set_config(&ledger, &payer, &program, &vrf, settings).await.unwrap();

        Fixture {
            ledger,
            payer,
            program,
            vrf,
        }
    }

    async fn permits(f: &Fixture, subject: &Pubkey) -> (Pubkey, Pubkey) {
        let fm = Keypair::new();
        let consumer = issue_permit(&f.ledger, &f.payer, &f.program, subject, &fm, PermitRole::Consumer)
            .await
            .unwrap();
        let producer = issue_permit(&f.ledger, &f.payer, &f.program, subject, &f.payer, PermitRole::Producer)
            .await
            .unwrap();
        (consumer.pubkey(), producer.pubkey())
    }

    #[tokio::test]
    async fn swapped_permits_are_rejected_before_submission() {
        let f = fixture(true).await;
        let (consumer, producer) = permits(&f, &f.vrf.pubkey()).await;

        let err = request(&f.ledger, &f.payer, &f.program, &f.vrf, &producer, &consumer)
            .await
            .unwrap_err();
        assert!(matches!(err, VrfError::RejectedRequest(reason) if reason.contains("expected Consumer")));
    }

    #[tokio::test]
    async fn disabled_permit_is_rejected() {
        let f = fixture(true).await;
        let (consumer, producer) = permits(&f, &f.vrf.pubkey()).await;
        let never_enabled = accounts::publish(&f.ledger, &f.payer, &f.program, AccountType::VrfPermit)
            .await
            .unwrap();

        let err = request(&f.ledger, &f.payer, &f.program, &f.vrf, &never_enabled.pubkey(), &producer)
            .await
            .unwrap_err();
        assert!(matches!(err, VrfError::RejectedRequest(reason) if reason.contains("not enabled")));

        // Nothing reached the ledger, so no request is in flight.
        request(&f.ledger, &f.payer, &f.program, &f.vrf, &consumer, &producer)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn permits_for_another_account_are_rejected() {
        let f = fixture(true).await;
        let other = vrf::create_account(&f.ledger, &f.payer, &f.program).await.unwrap();
        vrf::initialize(&f.ledger, &f.payer, &f.program, &other).await.unwrap();
        let (consumer, producer) = permits(&f, &other.pubkey()).await;

        let err = request(&f.ledger, &f.payer, &f.program, &f.vrf, &consumer, &producer)
            .await
            .unwrap_err();
        assert!(matches!(err, VrfError::RejectedRequest(_)));
    }

    #[tokio::test]
    async fn second_request_waits_for_confirmations() {
        let f = fixture(true).await;
        let (consumer, producer) = permits(&f, &f.vrf.pubkey()).await;

        request(&f.ledger, &f.payer, &f.program, &f.vrf, &consumer, &producer)
            .await
            .unwrap();
        let err = request(&f.ledger, &f.payer, &f.program, &f.vrf, &consumer, &producer)
            .await
            .unwrap_err();
        assert!(matches!(err, VrfError::RejectedRequest(_)));

        f.ledger.record_proof(&f.vrf.pubkey(), &[0, 0, 0, 0, 0, 0, 0, 1]).unwrap();
        request(&f.ledger, &f.payer, &f.program, &f.vrf, &consumer, &producer)
            .await
            .unwrap();
    }
}
