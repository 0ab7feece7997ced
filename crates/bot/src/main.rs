//! Dropgate relay bot binary.
//!
//! Wires the sqlite store, the engine, and the Telegram transport together,
//! recovers persisted retraction jobs, then long-polls for updates until
//! interrupted.

mod config;
mod handlers;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use dropgate_engine::{
    AccessGate, BatchAssembler, DeliveryOrchestrator, RetractionScheduler,
};
use dropgate_store::ArchiveStore;
use dropgate_store_sqlite::{SqliteArchiveStore, SqliteConfig};
use dropgate_telegram::{ChannelMembership, TelegramApi, TelegramConfig};

use crate::config::BotConfig;
use crate::handlers::Relay;

/// Long-poll duration for `getUpdates`.
const POLL: Duration = Duration::from_secs(30);

/// Pause after a failed poll before trying again.
const POLL_RETRY_PAUSE: Duration = Duration::from_secs(5);

/// Dropgate relay bot.
#[derive(Parser, Debug)]
#[command(name = "dropgate-bot", about = "File relay bot with gated, self-destructing deliveries")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "dropgate.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber from RUST_LOG or default to info.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = BotConfig::load(&cli.config)?;
    let token = BotConfig::token_from_env()?;

    let store: Arc<dyn ArchiveStore> = Arc::new(
        SqliteArchiveStore::new(SqliteConfig {
            url: config.store.url.clone(),
            table_prefix: config.store.table_prefix.clone(),
            ..SqliteConfig::default()
        })
        .await?,
    );

    let api = Arc::new(TelegramApi::new(TelegramConfig::new(token))?);
    let membership = Arc::new(ChannelMembership::new(
        api.clone(),
        config.gate_channel.clone(),
    ));

    let delay = Duration::from_secs(config.retraction_delay_secs);
    let scheduler = Arc::new(RetractionScheduler::new(store.clone(), api.clone()));

    // Re-arm retractions persisted by a previous run before taking traffic.
    let recovered = scheduler.recover().await?;
    if recovered > 0 {
        info!(recovered, "recovered pending retraction jobs");
    }

    let banner = format!(
        "Save or forward these files now.\nThey auto-delete in {}.",
        retention_text(config.retraction_delay_secs)
    );
    let orchestrator = DeliveryOrchestrator::new(
        store.clone(),
        api.clone(),
        scheduler.clone(),
        banner,
        delay,
    );

    let relay = Relay::new(
        api.clone(),
        store.clone(),
        BatchAssembler::new(store.clone()),
        AccessGate::new(membership),
        orchestrator,
        config,
    );

    info!("relay bot running");
    run_poll_loop(&api, &relay).await;

    info!("shutting down, waiting for firing retraction jobs");
    scheduler.shutdown().await;
    Ok(())
}

/// Human-readable copy lifetime for the delivery banner.
fn retention_text(secs: u64) -> String {
    if secs < 60 {
        format!("{secs} seconds")
    } else if secs / 60 == 1 {
        String::from("1 minute")
    } else {
        format!("{} minutes", secs / 60)
    }
}

/// Long-poll `getUpdates` until ctrl-c. Every update is handled in
/// isolation; a failed poll pauses briefly and retries.
async fn run_poll_loop(api: &TelegramApi, relay: &Relay) {
    let mut offset = 0i64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            polled = api.get_updates(offset, POLL) => match polled {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        relay.handle_update(update).await;
                    }
                }
                Err(e) => {
                    error!(error = %e, "poll failed");
                    tokio::time::sleep(POLL_RETRY_PAUSE).await;
                }
            }
        }
    }
    if offset > 0 {
        info!(offset, "stopping with confirmed update offset");
    }
}
