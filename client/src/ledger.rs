//! Ledger access.
//!
//! Everything that touches the chain goes through [`LedgerClient`]. The
//! production implementation is [`RpcLedger`] (Solana JSON-RPC); tests run
//! against [`SimulatedLedger`](crate::sim::SimulatedLedger).

use async_trait::async_trait;
use solana_client::client_error::ClientError;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;
use solana_transaction_status_client_types::option_serializer::OptionSerializer;
use solana_transaction_status_client_types::{UiTransactionEncoding, UiTransactionStatusMeta};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::AppConfig;
use crate::error::LedgerError;
use crate::poll::{PollConfig, PollOutcome, poll_until};

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Sign `instructions` with `payer` plus `signers` and submit them as one
    /// transaction, returning once the ledger has confirmed it.
    async fn submit_instructions(
        &self,
        instructions: &[Instruction],
        payer: &Keypair,
        signers: &[&Keypair],
    ) -> Result<Signature, LedgerError>;

    /// Raw data of an account.
    async fn read_account_state(&self, pubkey: &Pubkey) -> Result<Vec<u8>, LedgerError>;

    /// Wait for a transaction to finalize and return its log messages.
    async fn await_finalization(&self, signature: &Signature) -> Result<Vec<String>, LedgerError>;

    /// Lamports required to keep an account of `space` bytes rent-exempt.
    async fn minimum_balance(&self, space: usize) -> Result<u64, LedgerError>;
}

/// Deduplicated signer list: payer first, then co-signers in order.
pub(crate) fn collect_signers<'a>(payer: &'a Keypair, signers: &[&'a Keypair]) -> Vec<&'a Keypair> {
    let mut all = vec![payer];
    for signer in signers {
        if !all.iter().any(|s| s.pubkey() == signer.pubkey()) {
            all.push(signer);
        }
    }
    all
}

/// Solana JSON-RPC backed ledger client.
pub struct RpcLedger {
    rpc: RpcClient,
    max_retries: u32,
    initial_retry_delay: Duration,
    finalization: PollConfig,
}

impl RpcLedger {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            rpc: RpcClient::new_with_commitment(config.rpc_url.clone(), CommitmentConfig::confirmed()),
            max_retries: config.max_retries.max(1),
            initial_retry_delay: Duration::from_millis(config.initial_retry_delay_ms),
            finalization: PollConfig::new(60, Duration::from_secs(1)),
        }
    }

    /// Logs of a finalized transaction. A transaction the node does not
    /// know yet is a transport error, so the finalization poll retries it.
    async fn fetch_transaction_logs(&self, signature: &Signature) -> Result<Vec<String>, LedgerError> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(CommitmentConfig::finalized()),
            max_supported_transaction_version: Some(0),
        };
        let tx = self
            .rpc
            .get_transaction_with_config(signature, config)
            .await
            .map_err(transport)?;

        transaction_logs(tx.transaction.meta)
    }
}

#[async_trait]
impl LedgerClient for RpcLedger {
    #[instrument(skip_all, fields(instructions = instructions.len()))]
    async fn submit_instructions(
        &self,
        instructions: &[Instruction],
        payer: &Keypair,
        signers: &[&Keypair],
    ) -> Result<Signature, LedgerError> {
        let signers = collect_signers(payer, signers);
        let mut retry_delay = self.initial_retry_delay;

        for attempt in 0..self.max_retries {
            let blockhash = self.rpc.get_latest_blockhash().await.map_err(transport)?;

            let tx = sign_transaction(instructions, &signers, blockhash)?;

            match self.rpc.send_and_confirm_transaction(&tx).await {
                Ok(sig) => {
                    debug!(signature = %sig, "Transaction confirmed");
                    return Ok(sig);
                }
                Err(e) if e.to_string().contains("BlockhashNotFound") && attempt < self.max_retries - 1 => {
                    warn!(attempt = attempt + 1, delay = ?retry_delay, "BlockhashNotFound, retrying");
                    tokio::time::sleep(retry_delay).await;
                    retry_delay = retry_delay.saturating_mul(2).min(Duration::from_secs(60));
                }
                Err(e) => return Err(classify(e)),
            }
        }

        Err(LedgerError::Transport(format!(
            "max retries ({}) exceeded",
            self.max_retries
        )))
    }

    async fn read_account_state(&self, pubkey: &Pubkey) -> Result<Vec<u8>, LedgerError> {
        let response = self
            .rpc
            .get_account_with_commitment(pubkey, CommitmentConfig::confirmed())
            .await
            .map_err(transport)?;

        match response.value {
            Some(account) if !account.data.is_empty() => Ok(account.data),
            _ => Err(LedgerError::AccountNotFound(*pubkey)),
        }
    }

    #[instrument(skip(self))]
    async fn await_finalization(&self, signature: &Signature) -> Result<Vec<String>, LedgerError> {
        let outcome = poll_until(
            || self.fetch_transaction_logs(signature),
            |_| true,
            &self.finalization,
            None,
        )
        .await;

        match outcome {
            PollOutcome::Ready(logs) => Ok(logs),
            PollOutcome::Error(e) => Err(e),
            PollOutcome::TimedOut { .. } | PollOutcome::Cancelled { .. } => {
                Err(LedgerError::Timeout(signature.to_string()))
            }
        }
    }

    async fn minimum_balance(&self, space: usize) -> Result<u64, LedgerError> {
        self.rpc
            .get_minimum_balance_for_rent_exemption(space)
            .await
            .map_err(transport)
    }
}

fn transaction_logs(meta: Option<UiTransactionStatusMeta>) -> Result<Vec<String>, LedgerError> {
    let Some(meta) = meta else {
        return Ok(Vec::new());
    };
    if let Some(err) = meta.err {
        return Err(LedgerError::Rejected(format!("transaction failed: {err:?}")));
    }
    Ok(match meta.log_messages {
        OptionSerializer::Some(logs) => logs,
        _ => Vec::new(),
    })
}

/// `signers[0]` pays the fee.
fn sign_transaction(
    instructions: &[Instruction],
    signers: &[&Keypair],
    blockhash: Hash,
) -> Result<Transaction, LedgerError> {
    let keys: Vec<&dyn Signer> = signers.iter().map(|k| *k as &dyn Signer).collect();
    let mut tx = Transaction::new_with_payer(instructions, Some(&signers[0].pubkey()));
    tx.try_sign(keys.as_slice(), blockhash)
        .map_err(|e| LedgerError::MissingSignature(e.to_string()))?;
    Ok(tx)
}

fn transport(e: ClientError) -> LedgerError {
    LedgerError::Transport(e.to_string())
}

/// Split RPC failures into program rejections and transport errors.
fn classify(e: ClientError) -> LedgerError {
    let err_str = e.to_string();
    if e.get_transaction_error().is_some() || is_rejection(&err_str) {
        LedgerError::Rejected(err_str)
    } else {
        LedgerError::Transport(err_str)
    }
}

/// Error strings that indicate the ledger refused the transaction itself.
fn is_rejection(err_str: &str) -> bool {
    err_str.contains("custom program error")
        || err_str.contains("already in use")
        || err_str.contains("insufficient")
        || err_str.contains("InstructionError")
        || err_str.contains("missing required signature")
}
