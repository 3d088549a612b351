use tracing::{error, info, warn};

use crate::config;
use crate::discovery::EndpointDiscovery;
use crate::notifier::Notifier;
use crate::store::Store;
use crate::sync::SyncEngine;

/// Runs discovery, sync and retention cleanup on a fixed interval until
/// the process receives an interrupt. Every per-step failure is handled
/// inside the cycle; only the signal ends the loop.
pub async fn run(
    discovery: &EndpointDiscovery,
    sync: &SyncEngine,
    store: &Store,
    notifier: &Notifier,
) {
    info!("Scrape interval: {} seconds", config::SCRAPE_INTERVAL.as_secs());
    notifier
        .send_info(&format!("{} has started successfully!", config::BOT_NAME))
        .await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut cycle_count = 0u64;
    loop {
        cycle_count += 1;
        info!("Cycle #{cycle_count}");

        run_cycle(discovery, sync, store, notifier).await;

        info!(
            "Waiting {} seconds until next cycle...",
            config::SCRAPE_INTERVAL.as_secs()
        );
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!("Failed to listen for the shutdown signal - {e}");
                }
                break;
            }
            _ = tokio::time::sleep(config::SCRAPE_INTERVAL) => {}
        }
    }

    info!("{} - Shutting down gracefully...", config::BOT_NAME);
    notifier
        .send_info(&format!("{} has been stopped.", config::BOT_NAME))
        .await;
}

async fn run_cycle(
    discovery: &EndpointDiscovery,
    sync: &SyncEngine,
    store: &Store,
    notifier: &Notifier,
) {
    info!("{} - Starting scraping cycle", config::BOT_NAME);

    match discovery.discover().await {
        Ok(endpoint) => match sync.sync(&endpoint).await {
            Ok(new_cars) => info!("Scraping cycle completed. New cars: {new_cars}"),
            Err(e) => {
                error!("{e}");
                notifier
                    .send_error(&format!("{} - {e}", config::BOT_NAME))
                    .await;
            }
        },
        Err(e) => {
            let message = format!("{} - {e}, skipping this cycle", config::BOT_NAME);
            warn!("{message}");
            notifier.send_error(&message).await;
        }
    }

    match store.delete_older_than(config::RETENTION_DAYS).await {
        Ok(deleted) if deleted > 0 => info!("Deleted {deleted} old car listings"),
        Ok(_) => {}
        Err(e) => {
            error!("Database deletion error - {e}");
            notifier
                .send_error(&format!(
                    "{} - Database deletion error: {e}",
                    config::BOT_NAME
                ))
                .await;
        }
    }

    match store.count().await {
        Ok(total) => info!("Total cars in database: {total}"),
        Err(e) => error!("Database count error - {e}"),
    }
}
