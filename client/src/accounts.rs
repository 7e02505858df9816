//! Allocation of program-owned accounts.
//!
//! Every oracle account starts life as a fresh keypair, a system
//! `CreateAccount` funded with the rent-exempt minimum, and (optionally in
//! the same transaction) an `InitAccount` stamping its type.

use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tracing::{debug, instrument};

use crate::error::VrfError;
use crate::instruction;
use crate::ledger::LedgerClient;
use crate::state::AccountType;

/// Allocate `space` zeroed bytes owned by `program_id`.
#[instrument(skip(ledger, payer))]
pub async fn allocate(
    ledger: &dyn LedgerClient,
    payer: &Keypair,
    program_id: &Pubkey,
    space: usize,
) -> Result<Keypair, VrfError> {
    let account = Keypair::new();
    let ixs = [create_instruction(ledger, payer, &account, program_id, space).await?];
    submit_allocation(ledger, payer, &account, &ixs).await?;
    Ok(account)
}

/// Allocate an account sized for `account_type` and publish it as that type
/// in a single transaction.
#[instrument(skip(ledger, payer))]
pub async fn publish(
    ledger: &dyn LedgerClient,
    payer: &Keypair,
    program_id: &Pubkey,
    account_type: AccountType,
) -> Result<Keypair, VrfError> {
    let account = Keypair::new();
    let ixs = [
        create_instruction(ledger, payer, &account, program_id, account_type.space()).await?,
        instruction::init_account(program_id, &account.pubkey(), account_type),
    ];
    submit_allocation(ledger, payer, &account, &ixs).await?;
    Ok(account)
}

async fn create_instruction(
    ledger: &dyn LedgerClient,
    payer: &Keypair,
    account: &Keypair,
    program_id: &Pubkey,
    space: usize,
) -> Result<Instruction, VrfError> {
    let lamports = ledger.minimum_balance(space).await?;
    Ok(instruction::create_account(
        &payer.pubkey(),
        &account.pubkey(),
        lamports,
        space as u64,
        program_id,
    ))
}

async fn submit_allocation(
    ledger: &dyn LedgerClient,
    payer: &Keypair,
    account: &Keypair,
    ixs: &[Instruction],
) -> Result<(), VrfError> {
    let sig = ledger
        .submit_instructions(ixs, payer, &[account])
        .await
        .map_err(|e| e.rejected_as(VrfError::AllocationError))?;
    debug!(account = %account.pubkey(), signature = %sig, "Allocated account");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedLedger;
    use crate::state::account_type;

    #[tokio::test]
    async fn publish_stamps_type_and_size() {
        let program = Pubkey::new_unique();
        let ledger = SimulatedLedger::new(program);
        let payer = Keypair::new();
        ledger.fund(&payer.pubkey(), 1_000_000_000);

        let permit = publish(&ledger, &payer, &program, AccountType::VrfPermit).await.unwrap();
        let data = ledger.account_data(&permit.pubkey()).unwrap();

        assert_eq!(data.len(), 250);
        assert_eq!(account_type(&data), Some(AccountType::VrfPermit));
    }

    #[tokio::test]
    async fn unfunded_payer_is_an_allocation_error() {
        let program = Pubkey::new_unique();
        let ledger = SimulatedLedger::new(program);

        let err = allocate(&ledger, &Keypair::new(), &program, 1000).await.unwrap_err();
        assert!(matches!(err, VrfError::AllocationError(reason) if reason.contains("insufficient")));
    }
}
