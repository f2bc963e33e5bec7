use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

mod api;
mod commands;
mod config;
mod engine;
mod error;
mod models;
mod notifier;
mod probe;
mod shutdown;
mod telegram;
mod utils;

use crate::config::BotConfig;
use crate::engine::Monitor;
use crate::notifier::Notifier;
use crate::probe::NetworkProber;
use crate::telegram::TelegramClient;

#[tokio::main]
async fn main() -> Result<()> {
    utils::setup_console();
    utils::init_tracing();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.json".to_string());
    let config = BotConfig::load(&config_path)?;
    info!(
        target_host = %config.target_host,
        mode = ?config.recipient_mode,
        "NetPulse bot starting"
    );

    let telegram = Arc::new(TelegramClient::new(&config.bot_token)?);
    match telegram.get_me().await {
        Ok(username) if username == config.bot_name => info!("Connected as @{}", username),
        Ok(username) => warn!("Token belongs to @{}, configured name is {}", username, config.bot_name),
        Err(e) => warn!("Could not verify bot identity: {:#}", e),
    }

    let prober = Arc::new(NetworkProber::new(config.use_icmp, config.fallback_ports.clone()));
    let notifier = Notifier::new(telegram.clone());
    let monitor = Arc::new(Monitor::new(&config, prober, notifier));

    if let Some(port) = config.api_port {
        let monitor_for_api = Arc::clone(&monitor);
        tokio::spawn(async move {
            if let Err(e) = api::start_server(port, monitor_for_api).await {
                error!("Status API failed: {:#}", e);
            }
        });
    }

    let poller = {
        let telegram = Arc::clone(&telegram);
        let monitor = Arc::clone(&monitor);
        tokio::spawn(async move { telegram.run(monitor).await })
    };

    shutdown::shutdown_signal().await;
    info!("Shutdown signal received. Stopping NetPulse bot...");
    poller.abort();
    monitor.shutdown().await;

    Ok(())
}
