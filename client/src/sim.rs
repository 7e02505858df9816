//! In-process ledger that models the oracle program's rules.
//!
//! `SimulatedLedger` executes system `CreateAccount`, every
//! [`OracleInstruction`] and the consumer program's `read_result` against an
//! in-memory account map. Transactions are atomic: a rejected instruction
//! leaves every account untouched. The oracle network side (proof
//! confirmations landing on a VRF account) is driven explicitly through
//! [`SimulatedLedger::record_proof`].

use async_trait::async_trait;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::error::LedgerError;
use crate::instruction::{OracleInstruction, unpack_create_account};
use crate::ledger::{LedgerClient, collect_signers};
use crate::onchain::{self, VrfValueRead};
use crate::randomness::RandomValue;
use crate::state::{
    AccountType, FulfillmentManagerAuthData, FulfillmentManagerConfig, PermitRole, VrfAccountData,
    VrfPermitData, account_type,
};

/// Lamports per byte used by [`LedgerClient::minimum_balance`].
const RENT_LAMPORTS_PER_BYTE: u64 = 6_960;
/// Per-account storage overhead counted by the rent calculation.
const ACCOUNT_OVERHEAD: u64 = 128;

#[derive(Debug, Clone)]
struct SimAccount {
    owner: Pubkey,
    lamports: u64,
    data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
struct Accounts {
    accounts: HashMap<Pubkey, SimAccount>,
    /// VRF accounts with a request whose confirmations are still incomplete.
    in_flight: HashSet<Pubkey>,
}

#[derive(Debug, Default)]
struct Inner {
    ledger: Accounts,
    logs: HashMap<Signature, Vec<String>>,
    reads: HashMap<Pubkey, u32>,
    failing_reads: u32,
}

pub struct SimulatedLedger {
    program_id: Pubkey,
    consumer_program_id: Option<Pubkey>,
    inner: Mutex<Inner>,
}

impl SimulatedLedger {
    pub fn new(program_id: Pubkey) -> Self {
        Self {
            program_id,
            consumer_program_id: None,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Also execute the on-chain consumer program deployed at `program_id`.
    pub fn with_consumer_program(mut self, program_id: Pubkey) -> Self {
        self.consumer_program_id = Some(program_id);
        self
    }

    pub fn program_id(&self) -> Pubkey {
        self.program_id
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Credit lamports to a system-owned account, creating it if needed.
    pub fn fund(&self, pubkey: &Pubkey, lamports: u64) {
        let mut inner = self.lock();
        let account = inner.ledger.accounts.entry(*pubkey).or_insert_with(|| SimAccount {
            owner: solana_sdk_ids::system_program::ID,
            lamports: 0,
            data: Vec::new(),
        });
        account.lamports += lamports;
    }

    pub fn balance(&self, pubkey: &Pubkey) -> u64 {
        self.lock().ledger.accounts.get(pubkey).map_or(0, |a| a.lamports)
    }

    pub fn account_data(&self, pubkey: &Pubkey) -> Option<Vec<u8>> {
        self.lock().ledger.accounts.get(pubkey).map(|a| a.data.clone())
    }

    /// Number of [`LedgerClient::read_account_state`] calls made for `pubkey`.
    pub fn read_count(&self, pubkey: &Pubkey) -> u32 {
        self.lock().reads.get(pubkey).copied().unwrap_or(0)
    }

    /// Make the next `n` state reads fail with a transport error.
    pub fn fail_next_reads(&self, n: u32) {
        self.lock().failing_reads = n;
    }

    /// Act as one oracle node attesting `value` for the VRF account.
    ///
    /// Returns the confirmation count after the attestation.
    pub fn record_proof(&self, vrf: &Pubkey, value: &[u8]) -> Result<u32, LedgerError> {
        let program_id = self.program_id;
        let mut inner = self.lock();
        let ledger = &mut inner.ledger;

        let mut state = ledger.vrf(&program_id, vrf)?;
        state.num_proof_confirmations = state.num_proof_confirmations.saturating_add(1);
        state.value = value.to_vec();
        if state.is_confirmed() {
            ledger.in_flight.remove(vrf);
        }
        ledger.write(vrf, state.to_bytes())?;

        debug!(vrf = %vrf, confirmations = state.num_proof_confirmations, "Recorded proof");
        Ok(state.num_proof_confirmations)
    }
}

#[async_trait]
impl LedgerClient for SimulatedLedger {
    async fn submit_instructions(
        &self,
        instructions: &[Instruction],
        payer: &Keypair,
        signers: &[&Keypair],
    ) -> Result<Signature, LedgerError> {
        let signed: HashSet<Pubkey> = collect_signers(payer, signers)
            .iter()
            .map(|k| k.pubkey())
            .collect();

        let mut inner = self.lock();
        let mut working = inner.ledger.clone();
        let mut logs = Vec::new();

        for ix in instructions {
            if let Some(meta) = ix.accounts.iter().find(|m| m.is_signer && !signed.contains(&m.pubkey)) {
                return Err(LedgerError::MissingSignature(meta.pubkey.to_string()));
            }

            if ix.program_id == solana_sdk_ids::system_program::ID {
                working.create_account(ix)?;
            } else if ix.program_id == self.program_id {
                working.process_oracle(&self.program_id, ix)?;
            } else if Some(ix.program_id) == self.consumer_program_id {
                logs.extend(working.process_consumer(&self.program_id, ix)?);
            } else {
                return Err(LedgerError::Rejected(format!("unknown program {}", ix.program_id)));
            }
        }

        inner.ledger = working;
        let signature = Signature::new_unique();
        inner.logs.insert(signature, logs);
        Ok(signature)
    }

    async fn read_account_state(&self, pubkey: &Pubkey) -> Result<Vec<u8>, LedgerError> {
        let mut inner = self.lock();
        *inner.reads.entry(*pubkey).or_default() += 1;

        if inner.failing_reads > 0 {
            inner.failing_reads -= 1;
            return Err(LedgerError::Transport("simulated network failure".into()));
        }

        match inner.ledger.accounts.get(pubkey) {
            Some(account) if !account.data.is_empty() => Ok(account.data.clone()),
            _ => Err(LedgerError::AccountNotFound(*pubkey)),
        }
    }

    async fn await_finalization(&self, signature: &Signature) -> Result<Vec<String>, LedgerError> {
        self.lock()
            .logs
            .get(signature)
            .cloned()
            .ok_or_else(|| LedgerError::Timeout(signature.to_string()))
    }

    async fn minimum_balance(&self, space: usize) -> Result<u64, LedgerError> {
        Ok((space as u64 + ACCOUNT_OVERHEAD) * RENT_LAMPORTS_PER_BYTE)
    }
}

fn rejected(reason: impl Into<String>) -> LedgerError {
    LedgerError::Rejected(reason.into())
}

impl Accounts {
    fn owned(&self, program_id: &Pubkey, key: &Pubkey) -> Result<&[u8], LedgerError> {
        match self.accounts.get(key) {
            Some(account) if account.owner == *program_id => Ok(&account.data),
            Some(_) => Err(rejected(format!("account {key} is not owned by the oracle program"))),
            None => Err(rejected(format!("account {key} does not exist"))),
        }
    }

    /// Overwrite the start of an account's data, keeping its allocation.
    fn write(&mut self, key: &Pubkey, bytes: Vec<u8>) -> Result<(), LedgerError> {
        let account = self
            .accounts
            .get_mut(key)
            .ok_or_else(|| rejected(format!("account {key} does not exist")))?;
        if bytes.len() > account.data.len() {
            return Err(rejected(format!("account {key} data too small")));
        }
        account.data[..bytes.len()].copy_from_slice(&bytes);
        Ok(())
    }

    fn vrf(&self, program_id: &Pubkey, key: &Pubkey) -> Result<VrfAccountData, LedgerError> {
        VrfAccountData::from_bytes(self.owned(program_id, key)?)
            .map_err(|e| rejected(format!("invalid vrf account {key}: {e}")))
    }

    fn permit(&self, program_id: &Pubkey, key: &Pubkey) -> Result<VrfPermitData, LedgerError> {
        VrfPermitData::from_bytes(self.owned(program_id, key)?)
            .map_err(|e| rejected(format!("invalid permit account {key}: {e}")))
    }

    fn create_account(&mut self, ix: &Instruction) -> Result<(), LedgerError> {
        let (lamports, space, owner) =
            unpack_create_account(&ix.data).ok_or_else(|| rejected("invalid system instruction"))?;
        let (from, to) = match ix.accounts.as_slice() {
            [from, to, ..] => (&from.pubkey, &to.pubkey),
            _ => return Err(rejected("not enough account keys")),
        };

        if self.accounts.get(to).is_some_and(|a| a.lamports > 0 || !a.data.is_empty()) {
            return Err(rejected(format!("Create Account: account {to} already in use")));
        }
        let available = self.accounts.get(from).map_or(0, |a| a.lamports);
        if available < lamports {
            return Err(rejected(format!(
                "Transfer: insufficient lamports {available}, need {lamports}"
            )));
        }

        if let Some(payer) = self.accounts.get_mut(from) {
            payer.lamports -= lamports;
        }
        self.accounts.insert(
            *to,
            SimAccount {
                owner,
                lamports,
                data: vec![0; space as usize],
            },
        );
        Ok(())
    }

    fn process_oracle(&mut self, program_id: &Pubkey, ix: &Instruction) -> Result<(), LedgerError> {
        let instruction =
            OracleInstruction::unpack(&ix.data).ok_or_else(|| rejected("invalid oracle instruction"))?;
        let key = |i: usize| {
            ix.accounts
                .get(i)
                .map(|m| m.pubkey)
                .ok_or_else(|| rejected("not enough account keys"))
        };

        match instruction {
            OracleInstruction::InitAccount { account_type: kind } => {
                let target = key(0)?;
                if kind == AccountType::Uninitialized {
                    return Err(rejected("cannot initialize to the uninitialized type"));
                }
                if account_type(self.owned(program_id, &target)?) != Some(AccountType::Uninitialized) {
                    return Err(rejected(format!("account {target} already initialized")));
                }
                // A zeroed payload is a valid default for every account type.
                self.write(&target, vec![kind as u8])
            }
            OracleInstruction::SetFulfillmentManagerConfig(config) => {
                let fm = key(0)?;
                let current = FulfillmentManagerConfig::from_bytes(self.owned(program_id, &fm)?)
                    .map_err(|e| rejected(format!("invalid fulfillment manager {fm}: {e}")))?;
                if current.lock {
                    return Err(rejected("fulfillment manager configs locked"));
                }
                self.write(&fm, config.to_bytes())
            }
            OracleInstruction::CreateFulfillmentManagerAuth(permissions) => {
                let (auth, fm, grantee) = (key(0)?, key(1)?, key(2)?);
                if account_type(self.owned(program_id, &auth)?) != Some(AccountType::Uninitialized) {
                    return Err(rejected(format!("auth account {auth} already initialized")));
                }
                FulfillmentManagerConfig::from_bytes(self.owned(program_id, &fm)?)
                    .map_err(|e| rejected(format!("invalid fulfillment manager {fm}: {e}")))?;
                let data = FulfillmentManagerAuthData {
                    fulfillment_manager: fm,
                    grantee,
                    permissions,
                };
                self.write(&auth, data.to_bytes())
            }
            OracleInstruction::SetVrfConfig(update) => {
                let vrf = key(0)?;
                let mut state = self.vrf(program_id, &vrf)?;
                if state.lock_configs {
                    return Err(rejected("vrf configs locked"));
                }
                if let Some(min) = update.min_proof_confirmations {
                    state.min_proof_confirmations = min;
                }
                if let Some(producer) = update.randomness_producer {
                    state.randomness_producer = Some(producer);
                }
                if let Some(fm) = update.fulfillment_manager {
                    state.fulfillment_manager = Some(fm);
                }
                if let Some(lock) = update.lock_configs {
                    state.lock_configs = lock;
                }
                self.write(&vrf, state.to_bytes())
            }
            OracleInstruction::SetVrfPermit { enabled, role } => {
                let (permit, granter, subject) = (key(0)?, key(1)?, key(2)?);
                let current = self.permit(program_id, &permit)?;
                if current.enabled {
                    return Err(rejected(format!("permit {permit} already set")));
                }
                let vrf = self.vrf(program_id, &subject)?;
                let authority = match role {
                    PermitRole::Consumer => vrf.fulfillment_manager,
                    PermitRole::Producer => vrf.randomness_producer,
                };
                if authority.is_some_and(|a| a != granter) {
                    return Err(rejected(format!(
                        "granter {granter} has no {role:?} authority over {subject}"
                    )));
                }
                let data = VrfPermitData {
                    enabled,
                    role,
                    granter,
                    grantee: role.grantee(granter, subject),
                    subject,
                };
                self.write(&permit, data.to_bytes())
            }
            OracleInstruction::RequestRandomness => {
                let (vrf, consumer, producer) = (key(0)?, key(1)?, key(2)?);
                let mut state = self.vrf(program_id, &vrf)?;
                if !state.lock_configs {
                    return Err(rejected("vrf configs must be locked before requesting randomness"));
                }
                for (permit_key, role) in [(consumer, PermitRole::Consumer), (producer, PermitRole::Producer)] {
                    let permit = self.permit(program_id, &permit_key)?;
                    if !permit.enabled || permit.role != role || permit.subject != vrf {
                        return Err(rejected(format!("permit {permit_key} does not allow this request")));
                    }
                }
                if self.in_flight.contains(&vrf) {
                    return Err(rejected("a previous request is still awaiting confirmations"));
                }
                state.num_proof_confirmations = 0;
                state.value.clear();
                self.in_flight.insert(vrf);
                self.write(&vrf, state.to_bytes())
            }
        }
    }

    /// The consumer program's `read_result` instruction.
    fn process_consumer(&self, oracle_program: &Pubkey, ix: &Instruction) -> Result<Vec<String>, LedgerError> {
        let program = ix.program_id;
        let vrf = ix
            .accounts
            .first()
            .map(|m| m.pubkey)
            .ok_or_else(|| rejected("not enough account keys"))?;
        let state = self.vrf(oracle_program, &vrf)?;
        if !state.is_confirmed() {
            return Err(rejected("custom program error: insufficient proof confirmations"));
        }
        let value = RandomValue::from_value_bytes(&state.value)
            .and_then(|v| v.as_u64())
            .ok_or_else(|| rejected("vrf value too short"))?;

        let event = VrfValueRead {
            vrf,
            value,
            result: value % onchain::MAX_VALUE,
        };
        Ok(vec![
            format!("Program {program} invoke [1]"),
            "Program log: Instruction: ReadResult".to_string(),
            event.to_log_line(),
            format!(
                "Program log: Current VRF Value [0 - {}) = {}!",
                onchain::MAX_VALUE,
                event.result
            ),
            format!("Program {program} success"),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction;

    #[tokio::test]
    async fn failed_transaction_leaves_state_untouched() {
        let program = Pubkey::new_unique();
        let ledger = SimulatedLedger::new(program);
        let payer = Keypair::new();
        let account = Keypair::new();
        ledger.fund(&payer.pubkey(), 10_000_000);

        let ixs = [
            instruction::create_account(&payer.pubkey(), &account.pubkey(), 1_000, 250, &program),
            instruction::init_account(&program, &account.pubkey(), AccountType::Uninitialized),
        ];
        let err = ledger
            .submit_instructions(&ixs, &payer, &[&account])
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::Rejected(_)));
        assert_eq!(ledger.account_data(&account.pubkey()), None);
        assert_eq!(ledger.balance(&payer.pubkey()), 10_000_000);
    }

    #[tokio::test]
    async fn unsigned_account_is_rejected() {
        let program = Pubkey::new_unique();
        let ledger = SimulatedLedger::new(program);
        let payer = Keypair::new();
        let account = Keypair::new();
        ledger.fund(&payer.pubkey(), 10_000_000);

        let ix = instruction::create_account(&payer.pubkey(), &account.pubkey(), 1_000, 250, &program);
        let err = ledger.submit_instructions(&[ix], &payer, &[]).await.unwrap_err();
        assert!(matches!(err, LedgerError::MissingSignature(k) if k == account.pubkey().to_string()));
    }

    #[tokio::test]
    async fn injected_read_failures_are_counted() {
        let ledger = SimulatedLedger::new(Pubkey::new_unique());
        let key = Pubkey::new_unique();
        ledger.fail_next_reads(1);

        assert!(matches!(
            ledger.read_account_state(&key).await,
            Err(LedgerError::Transport(_))
        ));
        assert!(matches!(
            ledger.read_account_state(&key).await,
            Err(LedgerError::AccountNotFound(_))
        ));
        assert_eq!(ledger.read_count(&key), 2);
    }

    #[tokio::test]
    async fn proof_count_saturates() {
        let program = Pubkey::new_unique();
        let ledger = SimulatedLedger::new(program);
        let payer = Keypair::new();
        let vrf = Keypair::new();
        ledger.fund(&payer.pubkey(), 1_000_000_000);

        let ixs = [
            instruction::create_account(&payer.pubkey(), &vrf.pubkey(), 1_000_000, VrfAccountData::SPACE as u64, &program),
            instruction::init_account(&program, &vrf.pubkey(), AccountType::Vrf),
        ];
        ledger.submit_instructions(&ixs, &payer, &[&vrf]).await.unwrap();

        let saturated = VrfAccountData {
            num_proof_confirmations: u32::MAX,
            ..VrfAccountData::default()
        };
        ledger.lock().ledger.write(&vrf.pubkey(), saturated.to_bytes()).unwrap();

        assert_eq!(ledger.record_proof(&vrf.pubkey(), &[7; 8]).unwrap(), u32::MAX);
    }
}
