//! Client configuration loaded from environment variables.
//!
//! Required: `ORACLE_PROGRAM_ID`
//! Optional: `RPC_URL`, `CLUSTER`, `CONSUMER_PROGRAM_ID`, `PAYER_KEYPAIR_PATH`,
//!           `KEYSTORE_DIR`, `POLL_MAX_ATTEMPTS`, `POLL_INTERVAL_MS`,
//!           `POLL_DEADLINE_SECS`, `MAX_RETRIES`, `INITIAL_RETRY_DELAY_MS`

use anyhow::{Context, Result};
use solana_sdk::pubkey::Pubkey;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::keystore::KeyStore;
use crate::poll::PollConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Solana JSON-RPC endpoint (HTTP).
    pub rpc_url: String,
    /// Cluster name for explorer URLs.
    pub cluster: String,
    /// The deployed oracle program that owns VRF, permit and fulfillment
    /// manager accounts.
    pub program_id: Pubkey,
    /// The vrf-consumer program used by `read-onchain`.
    pub consumer_program_id: Option<Pubkey>,
    /// Keypair paying for every transaction.
    pub payer_keypair_path: PathBuf,
    /// Directory holding the account keypair files.
    pub keystore_dir: PathBuf,
    pub poll_max_attempts: u32,
    pub poll_interval_ms: u64,
    /// Optional wall-clock limit for confirmation polling.
    pub poll_deadline_secs: Option<u64>,
    /// Maximum send attempts per transaction.
    pub max_retries: u32,
    /// Initial retry delay in milliseconds.
    pub initial_retry_delay_ms: u64,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let rpc_url = var("RPC_URL").unwrap_or_else(|| "http://127.0.0.1:8899".into());
        let cluster = var("CLUSTER").unwrap_or_else(|| "devnet".into());

        let program_id_str = var("ORACLE_PROGRAM_ID").context("ORACLE_PROGRAM_ID env var must be set")?;
        let program_id = Pubkey::from_str(&program_id_str)
            .with_context(|| format!("invalid ORACLE_PROGRAM_ID: {program_id_str}"))?;

        let consumer_program_id = var("CONSUMER_PROGRAM_ID")
            .map(|s| {
                Pubkey::from_str(&s).with_context(|| format!("invalid CONSUMER_PROGRAM_ID: {s}"))
            })
            .transpose()?;

        let payer_keypair_path =
            expand_path(&var("PAYER_KEYPAIR_PATH").unwrap_or_else(|| "~/.config/solana/id.json".into()));
        let keystore_dir =
            expand_path(&var("KEYSTORE_DIR").unwrap_or_else(|| "~/.config/vrf-client/keys".into()));

        Ok(Self {
            rpc_url,
            cluster,
            program_id,
            consumer_program_id,
            payer_keypair_path,
            keystore_dir,
            poll_max_attempts: parsed(&var, "POLL_MAX_ATTEMPTS").unwrap_or(PollConfig::DEFAULT_MAX_ATTEMPTS),
            poll_interval_ms: parsed(&var, "POLL_INTERVAL_MS").unwrap_or(1000),
            poll_deadline_secs: parsed(&var, "POLL_DEADLINE_SECS"),
            max_retries: parsed(&var, "MAX_RETRIES").unwrap_or(5),
            initial_retry_delay_ms: parsed(&var, "INITIAL_RETRY_DELAY_MS").unwrap_or(500),
        })
    }

    /// Return the Solscan explorer URL for a given transaction signature.
    pub fn explorer_url(&self, signature: &str) -> String {
        match self.cluster.as_str() {
            "mainnet-beta" => format!("https://solscan.io/tx/{signature}"),
            cluster => format!("https://solscan.io/tx/{signature}?cluster={cluster}"),
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        let config = PollConfig::new(self.poll_max_attempts, Duration::from_millis(self.poll_interval_ms));
        match self.poll_deadline_secs {
            Some(secs) => config.with_deadline(Duration::from_secs(secs)),
            None => config,
        }
    }

    pub fn keystore(&self) -> KeyStore {
        KeyStore::new(&self.keystore_dir)
    }
}

fn parsed<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    var(key).and_then(|v| v.parse().ok())
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}
