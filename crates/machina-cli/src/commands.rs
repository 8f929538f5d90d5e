//! Command handlers.

use crate::output;
use alloy_primitives::Address;
use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use machina_contracts::ContractReader;
use machina_core::{MachinaConfig, WalletEffects};
use machina_payment::{JsonFileStore, NotificationService, PaymentOrchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

const NOTIFICATIONS_FILE: &str = "notifications.json";

fn reader(config: &MachinaConfig) -> Result<ContractReader> {
    let chain = machina_rpc::chain_reader(config)?;
    Ok(ContractReader::new(Arc::new(chain), config)?)
}

fn notifications_path(path: Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path),
        None => dirs::data_local_dir()
            .map(|dir| dir.join("machina").join(NOTIFICATIONS_FILE))
            .ok_or_else(|| anyhow!("no local data directory; pass --notifications")),
    }
}

async fn notification_service(path: Option<PathBuf>) -> Result<Arc<NotificationService>> {
    let path = notifications_path(path)?;
    debug!(path = %path.display(), "notification feed");
    let service = NotificationService::new(Arc::new(JsonFileStore::new(&path)));
    service
        .init()
        .await
        .with_context(|| format!("loading notifications from {}", path.display()))?;
    Ok(Arc::new(service))
}

pub async fn machines(config: &MachinaConfig) -> Result<()> {
    let machines = reader(config)?.get_all_machines().await?;
    if machines.is_empty() {
        println!("registry has no machines");
    }
    for machine in &machines {
        println!("{}", output::machine_row(machine));
    }
    Ok(())
}

pub async fn machine(config: &MachinaConfig, id: &str) -> Result<()> {
    let reader = reader(config)?;
    let index = reader.convert_machine_id(id)?;
    let machine = reader.get_machine(index).await?;
    println!("{}", output::machine_details(&machine));
    Ok(())
}

pub async fn balance(config: &MachinaConfig, address: Address) -> Result<()> {
    let reader = reader(config)?;
    let native = reader.get_native_balance(address).await?;
    println!("{}", output::balance_line("native", native));
    if config.contracts.payment_token.is_some() {
        let token = reader.get_token_balance(address).await?;
        println!("{}", output::balance_line("token", token));
    }
    Ok(())
}

pub async fn use_machine(
    config: &MachinaConfig,
    id: &str,
    user: Option<Address>,
    notifications: Option<PathBuf>,
) -> Result<()> {
    let effects = machina_rpc::connect(config, user).await?;
    let user = effects
        .wallet
        .connected_account()
        .await
        .ok_or_else(|| anyhow!("the node exposes no matching wallet account"))?;
    let notifications = notification_service(notifications).await?;
    let orchestrator =
        PaymentOrchestrator::new(&effects, config)?.with_notifications(notifications.clone());

    info!(machine = id, user = %user, "starting payment");
    let mut handle = orchestrator.start(id, user)?;
    while let Some(update) = handle.updates().next().await {
        if let Some(line) = output::flow_update(&update) {
            println!("{line}");
        }
    }
    let outcome = handle.outcome().await;
    notifications.shutdown().await?;

    let receipt = outcome?;
    println!("{}", output::payment_summary(&receipt));
    Ok(())
}

pub async fn notifications(path: Option<PathBuf>, mark_read: bool) -> Result<()> {
    let service = notification_service(path).await?;
    let feed = service.notifications().await;
    if feed.is_empty() {
        println!("no notifications");
    }
    for notification in &feed {
        println!("{}", output::notification_line(notification));
    }
    if mark_read {
        service.mark_all_read().await?;
    }
    Ok(())
}

pub fn show_config(config: &MachinaConfig) -> Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    let credential = if std::env::var_os(&config.operator.credential_env).is_some() {
        "set (redacted)"
    } else {
        "not set"
    };
    println!(
        "\n# operator credential ({}): {credential}",
        config.operator.credential_env
    );
    Ok(())
}
