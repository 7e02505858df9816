//! VRF operator client
//!
//! Creates and configures the accounts behind a verifiable random value on
//! Solana and drives one request cycle:
//!
//! - **create-ffm / create-oracle**: fulfillment manager and oracle registration.
//! - **create-vrf**: VRF account, initialized and locked.
//! - **permit-vrf / permit-vrf-producer**: consumer and producer permits.
//! - **request-vrf / await-vrf / print-vrf**: request randomness and read it back.
//! - **read-onchain**: have the consumer program read the value on-chain.
//!
//! Command output goes to stdout, logs to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use solana_sdk::signature::Signer;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use vrf_client::commands::{self, CommandContext, PermitArgs, RequestArgs};
use vrf_client::config::AppConfig;
use vrf_client::keystore::{
    FULFILLMENT_MANAGER_FILE, PRODUCER_PERMIT_FILE, VRF_ACCOUNT_FILE, VRF_PERMIT_FILE, read_keypair,
};
use vrf_client::state::PermitRole;
use vrf_client::vrf::VrfSettings;
use vrf_client::{LedgerClient, RpcLedger};

#[derive(Parser, Debug)]
#[command(name = "vrf-client", version)]
#[command(about = "Create VRF accounts and permits, request randomness and read it back")]
struct Cli {
    /// Keypair file paying for transactions [default: PAYER_KEYPAIR_PATH]
    #[arg(long, global = true, alias = "payerFile")]
    payer_file: Option<String>,

    /// Directory holding the account keypair files [default: KEYSTORE_DIR]
    #[arg(long, global = true, alias = "keystoreDir")]
    keystore_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a fulfillment manager account
    CreateFfm,

    /// Create and permit an oracle to use a fulfillment manager
    CreateOracle {
        #[arg(long, alias = "ffmFile", default_value = FULFILLMENT_MANAGER_FILE)]
        ffm_file: String,
    },

    /// Create a VRF account
    CreateVrf {
        #[arg(long, alias = "minProofConfirmations", default_value_t = 1)]
        min_proof_confirmations: u32,

        /// Leave the configuration unlocked (requests are refused until locked)
        #[arg(long)]
        unlocked: bool,
    },

    /// Permit a VRF account to use a fulfillment manager
    PermitVrf {
        #[arg(long, alias = "ffmFile", default_value = FULFILLMENT_MANAGER_FILE)]
        ffm_file: String,

        #[arg(long, alias = "vrfFile", default_value = VRF_ACCOUNT_FILE)]
        vrf_file: String,
    },

    /// Permit an oracle (the payer) to fulfill a VRF account's requests
    PermitVrfProducer {
        #[arg(long, alias = "vrfFile", default_value = VRF_ACCOUNT_FILE)]
        vrf_file: String,
    },

    /// Request randomness for a VRF account
    RequestVrf {
        #[arg(long, alias = "vrfFile", default_value = VRF_ACCOUNT_FILE)]
        vrf_file: String,

        #[arg(long, alias = "vrfPermitFile", default_value = VRF_PERMIT_FILE)]
        vrf_permit_file: String,

        #[arg(long, alias = "producerPermitFile", default_value = PRODUCER_PERMIT_FILE)]
        producer_permit_file: String,

        /// Wait for the value to be confirmed
        #[arg(long)]
        wait: bool,
    },

    /// Print the state of a VRF account
    PrintVrf {
        #[arg(long, alias = "vrfFile", default_value = VRF_ACCOUNT_FILE)]
        vrf_file: String,
    },

    /// Wait until a VRF account's value is confirmed and print it
    AwaitVrf {
        #[arg(long, alias = "vrfFile", default_value = VRF_ACCOUNT_FILE)]
        vrf_file: String,

        /// Override POLL_MAX_ATTEMPTS
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Override POLL_INTERVAL_MS
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Override POLL_DEADLINE_SECS
        #[arg(long)]
        deadline_secs: Option<u64>,
    },

    /// Read the randomness value on-chain through the consumer program
    ReadOnchain {
        #[arg(long, alias = "vrfFile", default_value = VRF_ACCOUNT_FILE)]
        vrf_file: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let default_filter = "info,solana_client=warn,solana_rpc_client=warn,hyper=warn,reqwest=warn";
    fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(true)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env().context("invalid configuration")?;
    if let Some(dir) = &cli.keystore_dir {
        config.keystore_dir = expand(dir);
    }
    if let Some(path) = &cli.payer_file {
        config.payer_keypair_path = expand(path);
    }
    if let Command::AwaitVrf {
        max_attempts,
        interval_ms,
        deadline_secs,
        ..
    } = &cli.command
    {
        config.poll_max_attempts = max_attempts.unwrap_or(config.poll_max_attempts);
        config.poll_interval_ms = interval_ms.unwrap_or(config.poll_interval_ms);
        config.poll_deadline_secs = deadline_secs.or(config.poll_deadline_secs);
    }

    let payer = read_keypair(&config.payer_keypair_path)
        .with_context(|| format!("failed to read payer keypair from {}", config.payer_keypair_path.display()))?;

    info!(
        program = %config.program_id,
        payer = %payer.pubkey(),
        keystore = %config.keystore_dir.display(),
        "Starting vrf-client"
    );
    info!(rpc = %config.rpc_url, cluster = %config.cluster, "Endpoint configured");

    let ledger: Arc<dyn LedgerClient> = Arc::new(RpcLedger::new(&config));

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current attempt");
            let _ = cancel_tx.send(true);
        }
    });

    let ctx = CommandContext::new(config, ledger, payer).with_cancel(cancel_rx);
    for line in run(&ctx, cli.command).await? {
        println!("{line}");
    }
    Ok(())
}

async fn run(ctx: &CommandContext, command: Command) -> Result<Vec<String>> {
    match command {
        Command::CreateFfm => commands::create_ffm(ctx).await,
        Command::CreateOracle { ffm_file } => commands::create_oracle(ctx, &ffm_file).await,
        Command::CreateVrf {
            min_proof_confirmations,
            unlocked,
        } => {
            let settings = VrfSettings {
                min_proof_confirmations,
                lock_configs: !unlocked,
            };
            commands::create_vrf(ctx, settings).await
        }
        Command::PermitVrf { ffm_file, vrf_file } => {
            let args = PermitArgs {
                role: PermitRole::Consumer,
                vrf_file,
                granter_file: Some(ffm_file),
            };
            commands::permit(ctx, &args).await
        }
        Command::PermitVrfProducer { vrf_file } => {
            let args = PermitArgs {
                role: PermitRole::Producer,
                vrf_file,
                granter_file: None,
            };
            commands::permit(ctx, &args).await
        }
        Command::RequestVrf {
            vrf_file,
            vrf_permit_file,
            producer_permit_file,
            wait,
        } => {
            let args = RequestArgs {
                vrf_file,
                vrf_permit_file,
                producer_permit_file,
                wait,
            };
            commands::request_vrf(ctx, &args).await
        }
        Command::PrintVrf { vrf_file } => commands::print_vrf(ctx, &vrf_file).await,
        Command::AwaitVrf { vrf_file, .. } => commands::await_vrf(ctx, &vrf_file).await,
        Command::ReadOnchain { vrf_file } => commands::read_onchain(ctx, &vrf_file).await,
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn poll_flags_only_override_when_given() {
        let cli = Cli::try_parse_from(["vrf-client", "await-vrf"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::AwaitVrf {
                max_attempts: None,
                interval_ms: None,
                deadline_secs: None,
                ..
            }
        ));

        let cli = Cli::try_parse_from(["vrf-client", "await-vrf", "--max-attempts", "3", "--vrfFile", "other.json"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Command::AwaitVrf { max_attempts: Some(3), ref vrf_file, .. } if vrf_file == "other.json"
        ));
    }
}
