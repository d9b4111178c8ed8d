//! CLI command implementations
//!
//! Commands run against the file-persisted local ledger and the simulated
//! wallet provider built from configuration, so the whole lifecycle can be
//! driven from a shell.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use dialoguer::Confirm;
use tracing::info;

use crate::config::Config;
use crate::directory::{Role, RoleDirectory};
use crate::ledger::{Address, InMemoryLedger, LedgerClient, TxReceipt, TAG_LOGISTICS, TAG_RETAIL};
use crate::orchestrator::TxOrchestrator;
use crate::pinning::PinningClient;
use crate::projector::LotReader;
use crate::provider::{SimulatedProvider, WalletProvider};
use crate::session::{Reconciler, SessionManager};

struct App {
    ledger: Arc<dyn LedgerClient>,
    reconciler: Reconciler,
    orchestrator: TxOrchestrator,
    reader: LotReader,
    directory: Arc<RoleDirectory>,
}

impl App {
    /// Wire the components from configuration. When `as_role` is given the
    /// provider exposes that identity's wallet, as if the user had selected
    /// it in the wallet's account picker.
    async fn build(config: &Config, as_role: Option<Role>) -> Result<Self> {
        let directory = Arc::new(config.directory.build()?);

        let accounts = match as_role {
            Some(role) => {
                let identity = directory
                    .by_role(role)
                    .ok_or_else(|| anyhow!("No identity configured for role {role}"))?;
                vec![identity.wallet_address.clone()]
            }
            None => config.provider.parsed_accounts()?,
        };

        let provider: Arc<SimulatedProvider> = if config.provider.available {
            Arc::new(SimulatedProvider::new(
                accounts,
                config.provider.chain_id.clone(),
            ))
        } else {
            Arc::new(SimulatedProvider::unavailable())
        };

        let session = Arc::new(SessionManager::new(
            Arc::clone(&provider) as Arc<dyn WalletProvider>
        ));
        let ledger: Arc<dyn LedgerClient> = Arc::new(
            InMemoryLedger::open(PathBuf::from(&config.ledger.state_file)).await?,
        );

        Ok(Self {
            reconciler: Reconciler::new(Arc::clone(&session), Arc::clone(&directory)),
            orchestrator: TxOrchestrator::new(session, Arc::clone(&ledger)),
            reader: LotReader::new(Arc::clone(&ledger), Arc::clone(&directory)),
            ledger,
            directory,
        })
    }

    /// Connect and log in as the requested role.
    async fn sign_in(&self, role: Role) -> Result<()> {
        let outcome = self.reconciler.login_with_wallet(Some(role)).await?;
        info!(
            "Signing as {} ({})",
            outcome.identity.display_name, outcome.home
        );
        Ok(())
    }

    fn confirmed(&self, receipt: Option<TxReceipt>) -> Result<TxReceipt> {
        receipt.ok_or_else(|| {
            anyhow!(self
                .orchestrator
                .last_error()
                .unwrap_or_else(|| "Transaction failed".to_string()))
        })
    }
}

fn parse_role(role: &str) -> Result<Role> {
    role.parse().with_context(|| format!("Unknown role: {role}"))
}

/// A content reference: either given literally or produced by pinning a
/// local file first.
async fn resolve_ref(
    config: &Config,
    literal: Option<String>,
    file: Option<PathBuf>,
) -> Result<String> {
    match (literal, file) {
        (Some(reference), None) => Ok(reference),
        (None, Some(path)) => {
            let client = PinningClient::new(
                &config.pinning.endpoint,
                &config.pinning.gateway,
                &config.pinning.jwt,
            )?;
            Ok(client.pin_file(&path).await?)
        }
        _ => bail!("Provide exactly one of a content reference or a file to pin"),
    }
}

pub async fn create(
    config: &Config,
    as_role: &str,
    product: &str,
    origin: Option<String>,
    certificate: Option<PathBuf>,
) -> Result<()> {
    let role = parse_role(as_role)?;
    let app = App::build(config, Some(role)).await?;
    app.sign_in(role).await?;

    let origin_ref = resolve_ref(config, origin, certificate).await?;
    let receipt = app.confirmed(app.orchestrator.create_lot(product, &origin_ref).await)?;
    println!(
        "Created lot {} (tx {})",
        receipt.lot_id.unwrap_or_default(),
        receipt.tx_hash
    );
    Ok(())
}

pub async fn process(
    config: &Config,
    as_role: &str,
    id: u64,
    reference: Option<String>,
    certificate: Option<PathBuf>,
) -> Result<()> {
    let role = parse_role(as_role)?;
    let app = App::build(config, Some(role)).await?;
    app.sign_in(role).await?;

    let process_ref = resolve_ref(config, reference, certificate).await?;
    let receipt = app.confirmed(app.orchestrator.process_lot(id, &process_ref).await)?;
    println!("Processed lot {} (tx {})", id, receipt.tx_hash);
    Ok(())
}

pub async fn transfer(
    config: &Config,
    as_role: &str,
    id: u64,
    destination_tag: &str,
    to: Option<String>,
) -> Result<()> {
    let role = parse_role(as_role)?;
    let app = App::build(config, Some(role)).await?;
    app.sign_in(role).await?;

    let tag = destination_tag.to_ascii_uppercase();
    let destination = match to {
        Some(address) => Address::parse(&address)?,
        None => {
            // default to the directory identity that runs the destination
            let target = match tag.as_str() {
                TAG_LOGISTICS => Role::Logistics,
                TAG_RETAIL => Role::Retail,
                other => bail!("Destination must be LOGISTICS or RETAIL, got {other}"),
            };
            app.directory
                .by_role(target)
                .ok_or_else(|| anyhow!("No identity configured for role {target}"))?
                .wallet_address
                .clone()
        }
    };

    let receipt = app.confirmed(
        app.orchestrator
            .transfer_custody(id, &destination, &tag)
            .await,
    )?;
    println!(
        "Transferred lot {} to {} (tx {})",
        id,
        app.reader.label_address(&destination),
        receipt.tx_hash
    );
    Ok(())
}

pub async fn telemetry(
    config: &Config,
    as_role: &str,
    id: u64,
    temperature: i64,
    coordinates: &str,
) -> Result<()> {
    let role = parse_role(as_role)?;
    let app = App::build(config, Some(role)).await?;
    app.sign_in(role).await?;

    let receipt = app.confirmed(
        app.orchestrator
            .report_telemetry(id, temperature, coordinates)
            .await,
    )?;
    println!(
        "Recorded {}°C at {} for lot {} (tx {})",
        temperature, coordinates, id, receipt.tx_hash
    );
    Ok(())
}

pub async fn inspect(
    config: &Config,
    as_role: &str,
    id: u64,
    act: Option<String>,
    certificate: Option<PathBuf>,
    approved: bool,
) -> Result<()> {
    let role = parse_role(as_role)?;
    let app = App::build(config, Some(role)).await?;
    app.sign_in(role).await?;

    let act_ref = resolve_ref(config, act, certificate).await?;
    let receipt = app.confirmed(app.orchestrator.inspect(id, &act_ref, approved).await)?;
    println!(
        "Inspected lot {}: {} (tx {})",
        id,
        if approved { "APPROVED" } else { "REJECTED" },
        receipt.tx_hash
    );
    Ok(())
}

pub async fn reject(
    config: &Config,
    as_role: &str,
    id: u64,
    reason: &str,
    force: bool,
) -> Result<()> {
    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!("Reject lot {id}? A rejected lot is final"))
            .default(false)
            .interact()?;
        if !confirmed {
            info!("Aborted");
            return Ok(());
        }
    }

    let role = parse_role(as_role)?;
    let app = App::build(config, Some(role)).await?;
    app.sign_in(role).await?;

    let receipt = app.confirmed(app.orchestrator.reject(id, reason).await)?;
    println!("Rejected lot {}: {} (tx {})", id, reason, receipt.tx_hash);
    Ok(())
}

/// Public lookup: no wallet, no login.
pub async fn trace(config: &Config, id: u64, json: bool) -> Result<()> {
    let app = App::build(config, None).await?;

    let trace = app.reader.trace(id).await.ok_or_else(|| {
        anyhow!(app
            .reader
            .last_error()
            .unwrap_or_else(|| format!("Lot {id} not found")))
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&trace)?);
        return Ok(());
    }

    let (lot, view) = (&trace.lot, &trace.view);
    println!("Lot {}: {}", lot.id, lot.product);
    println!(
        "  State: {}   Cold chain: {}",
        lot.state,
        if view.cold_chain_risk { "AT RISK" } else { "OK" }
    );
    println!("  Registered: {}", lot.registered_at.to_rfc3339());
    println!("  Custodian: {}", view.custodian_label);
    println!("  Custody: {}", view.custody_labels.join(" -> "));
    for stage in &view.timeline {
        let mark = if stage.reached { "x" } else { " " };
        match &stage.detail {
            Some(detail) => println!("  [{mark}] {} ({detail})", stage.label),
            None => println!("  [{mark}] {}", stage.label),
        }
    }
    Ok(())
}

pub async fn count(config: &Config) -> Result<()> {
    let app = App::build(config, None).await?;
    let count = app.ledger.lot_count().await?;
    println!("{count}");
    Ok(())
}

/// Show current configuration with secrets masked
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}
