use anyhow::Context as _;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod discovery;
mod error;
mod notifier;
mod scheduler;
mod store;
mod sync;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("{} - Starting up...", config::BOT_NAME);

    let config = config::Config::from_env();

    let store = store::Store::connect(&config.database_url)
        .await
        .context("Failed to open the car listing store")?;
    let notifier = notifier::Notifier::new(config.telegram.clone());
    let discovery = discovery::EndpointDiscovery::new(config.browser_ws.clone());
    let sync = sync::SyncEngine::new(store.clone(), notifier.clone());

    scheduler::run(&discovery, &sync, &store, &notifier).await;

    Ok(())
}
