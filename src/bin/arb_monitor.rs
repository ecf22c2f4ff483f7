use alloy_provider::ProviderBuilder;
use eyre::{Result, WrapErr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use xchain_arb::data_sync::TriggerFilter;
use xchain_arb::utils::ConfigSection;
use xchain_arb::{
    AlloyChainProvider, AppConfig, ChainProviders, DryRunExecutor, InventoryRefresher, Listener, OpportunitySearch,
    PathRegistry, ReserveStore, StaticInventory,
};

const DEFAULT_CONFIG_FILE: &str = "arb.toml";

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("No .env loaded: {}", e);
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_line_number(true)
        .init();

    let config_file = std::env::args().nth(1).or_else(|| std::env::var("ARB_CONFIG").ok()).unwrap_or(DEFAULT_CONFIG_FILE.to_string());
    let mut config = AppConfig::load_section_from_file(config_file.clone())
        .await
        .wrap_err_with(|| format!("Failed to load {}", config_file))?;
    config.listener = config.listener.with_env_overrides()?;
    info!(file = %config_file, networks = config.networks.len(), "Configuration loaded");

    let registry = Arc::new(
        PathRegistry::load_from_files(&config.registry.tokens, &config.registry.pools, &config.registry.paths).await?,
    );

    let mut providers = ChainProviders::new();
    for network in config.networks.iter() {
        let provider = ProviderBuilder::new().connect_http(network.rpc_url()?);
        providers.insert(network.id, Arc::new(AlloyChainProvider::new(provider)));
        info!(network = network.id, name = %network.name, "Provider connected");
    }

    let store = Arc::new(ReserveStore::new(registry.clone(), providers.clone()));
    // the listeners resume right after these heights, so the snapshot and the log stream meet
    let heights = store.current_heights().await?;
    let failed = store.bulk_load(registry.paths(), Some(&heights)).await?;
    if !failed.is_empty() {
        warn!(pools = failed.len(), "Some pools start with empty reserves");
    }

    let executor = Arc::new(DryRunExecutor::new(Duration::from_secs(15)));
    let mut engine = OpportunitySearch::new(config.search.clone(), store, executor);
    let holders = config.holders();
    let mut refresher = None;
    if !holders.is_empty() {
        let inventory = Arc::new(StaticInventory::fetch(&registry, &providers, &holders).await?);
        refresher = Some(Arc::new(InventoryRefresher::new(
            inventory.clone(),
            registry.clone(),
            providers.clone(),
            holders.clone(),
        )));
        engine = engine.with_inventory(inventory, holders);
    }

    // prices may already be out of line before the first block arrives
    let initial = engine.search(registry.paths()).await;
    info!(opportunities = initial.opportunities.len(), "Initial sweep done");

    let (tx, rx) = unbounded_channel();
    let (transfer_tx, transfer_rx) = unbounded_channel();
    let mut listener = Listener::new(&config.listener, &providers)?;
    for network in config.networks.iter() {
        let pools = registry.pools().filter(|pool| pool.network == network.id).map(|pool| pool.id);
        listener.add_trigger(network.id, TriggerFilter::new(vec![network.sync_topic()], pools), tx.clone())?;
        if let Some(filter) = refresher.as_ref().and_then(|refresher| refresher.trigger_filter(network.id)) {
            listener.add_trigger(network.id, filter, transfer_tx.clone())?;
        }
    }
    drop(tx);
    drop(transfer_tx);
    listener.resume_after(&heights);

    let mut handles = listener.run();
    if let Some(refresher) = refresher {
        handles.push(tokio::spawn(async move { refresher.run(transfer_rx).await }));
    }
    tokio::select! {
        _ = engine.run(rx) => error!("Search loop stopped"),
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }
    for handle in handles {
        handle.abort();
    }
    Ok(())
}
