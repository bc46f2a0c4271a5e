//! skype-puppet - Matrix puppet bridge for Skype
//!
//! Logs in to a Skype account and mirrors its conversations into Matrix
//! rooms. What the puppeted Matrix user writes in those rooms is sent back
//! to Skype as that account.

mod bridge;
mod common;
mod config;
mod matrix;
mod skype;
#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::signal;
use tracing::{debug, error, info, warn};

use bridge::transfer::HttpFetcher;
use bridge::{init_third_party_client, ChannelBundle, Relay};
use config::{env::get_config_path, load_and_validate};
use matrix::{HomeserverBridge, PuppetSync};
use skype::SkypeClient;

/// The task whose completion ended the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stopped {
    Signal,
    Skype,
    Sync,
    Relay,
    Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("skype-puppet v{} starting...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = load_and_validate(&config_path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        error!("Please ensure {} exists and is properly formatted.", config_path);
        error!("See skype-puppet.conf.example for reference.");
        e
    })?;

    info!("Configuration loaded successfully");
    info!("  Skype account: {}", config.skype.username);
    info!("  Homeserver: {}", config.matrix.homeserver_url);
    info!("  Puppet: {}", config.matrix.puppet.user_id);

    let channels = ChannelBundle::new();

    // ============================================================
    // Connect to Skype
    // ============================================================
    info!("Connecting to Skype...");
    let client = SkypeClient::connect(&config.skype).await.map_err(|e| {
        error!("Failed to connect to Skype: {}", e);
        e
    })?;

    let fetcher = Arc::new(HttpFetcher::new()?);
    let (puppet, mut listener) = init_third_party_client(
        Arc::new(client),
        config.avatar_url_template(),
        fetcher.clone(),
        channels.skype.events_tx,
    )
    .await
    .map_err(|e| {
        error!("Failed to load Skype contacts: {}", e);
        e
    })?;

    let homeserver = Arc::new(HomeserverBridge::new(&config.matrix, puppet.clone())?);
    let relay = Relay::new(puppet.session().clone(), homeserver.clone(), fetcher);
    let sync = PuppetSync::new(&config, homeserver, channels.matrix.command_tx)?;

    // ============================================================
    // Spawn tasks
    // ============================================================

    // Task 1: Skype -> Matrix relay, one event at a time
    let mut relay_task = {
        let mut events_rx = channels.matrix.events_rx;
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                relay.process(event).await;
            }
            info!("Skype -> Matrix relay task ended");
        })
    };

    // Task 2: Puppet sync, producing commands
    let shutdown_tx = channels.control.shutdown_tx;
    let mut sync_task = tokio::spawn(sync.run(channels.control.shutdown_rx));

    // Task 3: Matrix -> Skype commands
    let mut command_task = {
        let mut command_rx = channels.skype.command_rx;
        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                if let Err(e) = puppet.handle_command(command).await {
                    error!("Failed to send to Skype: {}", e);
                }
            }
            info!("Matrix -> Skype command task ended");
        })
    };

    // ============================================================
    // Run until something stops
    // ============================================================
    let mut failure = None;
    let stopped = tokio::select! {
        biased;
        _ = shutdown_signal() => {
            info!("Shutdown signal received - stopping bridge...");
            Stopped::Signal
        }
        result = &mut listener => {
            match result {
                Ok(Ok(())) => info!("Skype event stream ended"),
                Ok(Err(e)) => {
                    error!("Skype event stream failed: {}", e);
                    failure = Some(anyhow!(e));
                }
                Err(e) => {
                    error!("Skype listener panicked: {}", e);
                    failure = Some(anyhow!("Skype listener panicked"));
                }
            }
            Stopped::Skype
        }
        result = &mut sync_task => {
            match result {
                Ok(Ok(())) => info!("Matrix sync ended"),
                Ok(Err(e)) => error!("Matrix sync failed: {}", e),
                Err(e) => error!("Matrix sync panicked: {}", e),
            }
            Stopped::Sync
        }
        _ = &mut relay_task => Stopped::Relay,
        _ = &mut command_task => Stopped::Commands,
    };
    debug!(?stopped, "Main loop ended");

    // Handle graceful shutdown
    if stopped != Stopped::Skype {
        listener.abort();
    }
    if let Err(e) = shutdown_tx.send(true) {
        debug!("Shutdown channel closed (sync already exited): {}", e);
    }

    let timeout = Duration::from_secs(5);
    if stopped != Stopped::Sync {
        match tokio::time::timeout(timeout, sync_task).await {
            Ok(Ok(_)) => info!("Matrix sync stopped"),
            Ok(Err(e)) => warn!("Matrix sync task panicked: {}", e),
            Err(_) => warn!("Matrix sync shutdown timed out"),
        }
    }
    if stopped != Stopped::Relay && tokio::time::timeout(timeout, relay_task).await.is_err() {
        warn!("Relay did not drain in time");
    }
    if stopped != Stopped::Commands && tokio::time::timeout(timeout, command_task).await.is_err() {
        warn!("Pending Skype sends did not finish in time");
    }

    info!("Exiting...");
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
