//! Operator commands behind the `vrf-client` binary.
//!
//! Each command returns the lines it wants printed on stdout. Creation
//! commands refuse to run when their keypair file already exists, and save
//! the new keypair before any further step can fail so an allocated
//! account is never orphaned.

use anyhow::{Context, Result};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::config::AppConfig;
use crate::display::{VrfStateView, account_line, export_line};
use crate::fulfillment;
use crate::keystore::{
    FULFILLMENT_MANAGER_FILE, KeyStore, ORACLE_AUTH_FILE, PRODUCER_PERMIT_FILE, VRF_ACCOUNT_FILE,
    VRF_PERMIT_FILE,
};
use crate::ledger::LedgerClient;
use crate::onchain;
use crate::permit;
use crate::randomness;
use crate::request;
use crate::state::{AuthPermissions, FulfillmentManagerConfig, PermitRole};
use crate::vrf::{self, VrfSettings};

/// Everything a command needs: ledger access, the paying account and the
/// keystore its keypair files live in.
pub struct CommandContext {
    pub config: AppConfig,
    pub ledger: Arc<dyn LedgerClient>,
    pub payer: Keypair,
    pub keystore: KeyStore,
    cancel: Option<watch::Receiver<bool>>,
}

impl CommandContext {
    pub fn new(config: AppConfig, ledger: Arc<dyn LedgerClient>, payer: Keypair) -> Self {
        let keystore = config.keystore();
        Self {
            config,
            ledger,
            payer,
            keystore,
            cancel: None,
        }
    }

    /// Stop confirmation polling once `cancel` reads `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn ledger(&self) -> &dyn LedgerClient {
        self.ledger.as_ref()
    }

    fn program_id(&self) -> Pubkey {
        self.config.program_id
    }

    fn load(&self, name: &str) -> Result<Keypair> {
        self.keystore
            .load(name)
            .with_context(|| format!("failed to load keypair {name}"))
    }
}

/// Keypair file a permit of `role` is saved to.
pub fn permit_file(role: PermitRole) -> &'static str {
    match role {
        PermitRole::Consumer => VRF_PERMIT_FILE,
        PermitRole::Producer => PRODUCER_PERMIT_FILE,
    }
}

/// `create-ffm`: a fulfillment manager requiring heartbeat and usage auth.
pub async fn create_ffm(ctx: &CommandContext) -> Result<Vec<String>> {
    ctx.keystore.ensure_absent(FULFILLMENT_MANAGER_FILE)?;

    let fm = fulfillment::create_fulfillment_manager(ctx.ledger(), &ctx.payer, &ctx.program_id())
        .await
        .context("failed to create fulfillment manager")?;
    let path = ctx.keystore.save(FULFILLMENT_MANAGER_FILE, &fm)?;

    let config = FulfillmentManagerConfig {
        heartbeat_auth_required: true,
        usage_auth_required: true,
        lock: false,
    };
    fulfillment::set_fulfillment_manager_config(ctx.ledger(), &ctx.payer, &ctx.program_id(), &fm, config)
        .await
        .context("failed to configure fulfillment manager")?;

    Ok(vec![
        account_line("FulfillmentManager", fm.pubkey()),
        account_line("FulfillmentManagerConfig", serde_json::to_string_pretty(&config)?),
        account_line("ffmFile", path.display()),
        export_line("FULFILLMENT_MANAGER_KEY", fm.pubkey()),
    ])
}

/// `create-oracle`: authorize the payer as an oracle of the fulfillment
/// manager.
pub async fn create_oracle(ctx: &CommandContext, ffm_file: &str) -> Result<Vec<String>> {
    ctx.keystore.ensure_absent(ORACLE_AUTH_FILE)?;
    let fm = ctx.load(ffm_file)?;

    let permissions = AuthPermissions {
        authorize_heartbeat: true,
        authorize_usage: true,
    };
    let auth = fulfillment::create_fulfillment_manager_auth(
        ctx.ledger(),
        &ctx.payer,
        &ctx.program_id(),
        &fm,
        &ctx.payer.pubkey(),
        permissions,
    )
    .await
    .context("failed to register oracle")?;
    let path = ctx.keystore.save(ORACLE_AUTH_FILE, &auth)?;

    Ok(vec![
        account_line("FulfillmentManagerAuth (Oracle)", auth.pubkey()),
        account_line("oracleAuthAccountFile", path.display()),
        String::new(),
        "Oracle node environment:".to_string(),
        export_line("CLUSTER", &ctx.config.cluster),
        export_line("FULFILLMENT_MANAGER_KEY", fm.pubkey()),
        export_line("FULFILLMENT_MANAGER_HEARTBEAT_AUTH_KEY", auth.pubkey()),
    ])
}

/// `create-vrf`: allocate, initialize and configure a VRF account.
pub async fn create_vrf(ctx: &CommandContext, settings: VrfSettings) -> Result<Vec<String>> {
    ctx.keystore.ensure_absent(VRF_ACCOUNT_FILE)?;

    let account = vrf::create_account(ctx.ledger(), &ctx.payer, &ctx.program_id())
        .await
        .context("failed to allocate vrf account")?;
    let path = ctx.keystore.save(VRF_ACCOUNT_FILE, &account)?;

    vrf::initialize(ctx.ledger(), &ctx.payer, &ctx.program_id(), &account)
        .await
        .context("failed to initialize vrf account")?;
    vrf::set_config(ctx.ledger(), &ctx.payer, &ctx.program_id(), &account, settings)
        .await
        .context("failed to configure vrf account")?;

    Ok(vec![
        account_line("VrfAccount", account.pubkey()),
        account_line("vrfAccountFile", path.display()),
    ])
}

/// Where a permit's granter comes from.
#[derive(Debug, Clone)]
pub struct PermitArgs {
    pub role: PermitRole,
    pub vrf_file: String,
    /// Granter keypair file; the payer grants when absent.
    pub granter_file: Option<String>,
}

/// `permit-vrf` / `permit-vrf-producer`.
pub async fn permit(ctx: &CommandContext, args: &PermitArgs) -> Result<Vec<String>> {
    let file = permit_file(args.role);
    ctx.keystore.ensure_absent(file)?;

    let vrf_account = ctx.load(&args.vrf_file)?;
    let granter = args.granter_file.as_deref().map(|name| ctx.load(name)).transpose()?;
    let granter = granter.as_ref().unwrap_or(&ctx.payer);

    let permit = permit::issue_permit(
        ctx.ledger(),
        &ctx.payer,
        &ctx.program_id(),
        &vrf_account.pubkey(),
        granter,
        args.role,
    )
    .await
    .with_context(|| format!("failed to issue {:?} permit", args.role))?;
    let path = ctx.keystore.save(file, &permit)?;

    let label = match args.role {
        PermitRole::Consumer => "vrfPermit",
        PermitRole::Producer => "producerPermit",
    };
    Ok(vec![
        account_line(label, permit.pubkey()),
        account_line(&format!("{label}File"), path.display()),
    ])
}

#[derive(Debug, Clone)]
pub struct RequestArgs {
    pub vrf_file: String,
    pub vrf_permit_file: String,
    pub producer_permit_file: String,
    /// Block until the value is confirmed.
    pub wait: bool,
}

/// `request-vrf`.
pub async fn request_vrf(ctx: &CommandContext, args: &RequestArgs) -> Result<Vec<String>> {
    let vrf_account = ctx.load(&args.vrf_file)?;
    let consumer_permit = ctx.load(&args.vrf_permit_file)?.pubkey();
    let producer_permit = ctx.load(&args.producer_permit_file)?.pubkey();

    let sig = request::request(
        ctx.ledger(),
        &ctx.payer,
        &ctx.program_id(),
        &vrf_account,
        &consumer_permit,
        &producer_permit,
    )
    .await
    .context("randomness request failed")?;

    let mut lines = vec![
        account_line("RequestSignature", sig),
        ctx.config.explorer_url(&sig.to_string()),
    ];
    if args.wait {
        let value = await_value(ctx, &vrf_account.pubkey()).await?;
        lines.push(account_line("Randomness", value));
    }
    Ok(lines)
}

/// `print-vrf`.
pub async fn print_vrf(ctx: &CommandContext, vrf_file: &str) -> Result<Vec<String>> {
    let vrf_account = ctx.load(vrf_file)?.pubkey();
    let state = vrf::fetch_state(ctx.ledger(), &vrf_account).await?;

    Ok(vec![
        account_line("VrfAccount", vrf_account),
        serde_json::to_string_pretty(&VrfStateView::new(vrf_account, &state))?,
    ])
}

/// `await-vrf`.
pub async fn await_vrf(ctx: &CommandContext, vrf_file: &str) -> Result<Vec<String>> {
    let vrf_account = ctx.load(vrf_file)?.pubkey();
    let value = await_value(ctx, &vrf_account).await?;
    Ok(vec![account_line("Randomness", value)])
}

async fn await_value(ctx: &CommandContext, vrf_account: &Pubkey) -> Result<randomness::RandomValue> {
    info!(vrf = %vrf_account, attempts = ctx.config.poll_max_attempts, "Waiting for proof confirmations");
    randomness::await_randomness(ctx.ledger(), vrf_account, &ctx.config.poll_config(), ctx.cancel.clone())
        .await
        .context("randomness was not confirmed")
}

/// `read-onchain`.
pub async fn read_onchain(ctx: &CommandContext, vrf_file: &str) -> Result<Vec<String>> {
    let consumer_program = ctx
        .config
        .consumer_program_id
        .context("CONSUMER_PROGRAM_ID must be set to read on-chain")?;
    let vrf_account = ctx.load(vrf_file)?.pubkey();
    let state = vrf::fetch_state(ctx.ledger(), &vrf_account).await?;

    let read = onchain::read_onchain(ctx.ledger(), &ctx.payer, &consumer_program, &vrf_account)
        .await
        .context("on-chain read failed")?;

    let mut lines = vec![
        account_line("PID", consumer_program),
        account_line("VRF", vrf_account),
        serde_json::to_string_pretty(&VrfStateView::new(vrf_account, &state))?,
        ctx.config.explorer_url(&read.signature.to_string()),
        serde_json::to_string_pretty(&read.logs)?,
    ];
    if let Some(event) = read.event {
        lines.push(account_line("OnchainResult", event.result));
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedLedger;

    #[test]
    fn permit_files_per_role() {
        assert_eq!(permit_file(PermitRole::Consumer), "vrfPermitAccount.json");
        assert_eq!(permit_file(PermitRole::Producer), "producerPermitAccount.json");
    }

    #[tokio::test]
    async fn read_onchain_requires_consumer_program() {
        let dir = tempfile::tempdir().unwrap();
        let program = Pubkey::new_unique();
        let config = AppConfig::from_vars(|key| match key {
            "ORACLE_PROGRAM_ID" => Some(program.to_string()),
            "KEYSTORE_DIR" => Some(dir.path().display().to_string()),
            _ => None,
        })
        .unwrap();
        let ctx = CommandContext::new(config, Arc::new(SimulatedLedger::new(program)), Keypair::new());

        let err = read_onchain(&ctx, VRF_ACCOUNT_FILE).await.unwrap_err();
        assert!(err.to_string().contains("CONSUMER_PROGRAM_ID"));
    }
}
