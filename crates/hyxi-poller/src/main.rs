// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of HYXi Cloud.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! HYXi Poller - fixed-interval scheduler for the HYXi cloud polling core
//!
//! Polls once at startup and then every `update_interval_minutes`, logging a
//! summary of each snapshot. Exits with an error when the credentials are
//! rejected, since no later poll can succeed without new ones.

use anyhow::{Context, Result, bail};
use clap::Parser;
use hyxi_cloud::{
    FixtureSource, HyxiConfig, PollCoordinator, PollError, PollingClient, RetryPolicy,
    SnapshotSource, SnapshotStore, TokenError,
};
use std::path::{Path, PathBuf};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "hyxi.toml";

#[derive(Parser)]
#[command(name = "hyxi-poller")]
#[command(author, version, about = "Poll HYXi cloud telemetry on a fixed schedule")]
#[command(
    long_about = "Poll the HYXi cloud for plant, device and battery telemetry.\n\
    \nConfiguration is read from --config, else ./hyxi.toml, else HYXI_* environment\n\
    variables only.\n\
    \nExamples:\n  \
    hyxi-poller                           # Poll forever with ./hyxi.toml\n  \
    hyxi-poller --once                    # Single poll, print snapshot JSON\n  \
    hyxi-poller --check --config my.toml  # Validate credentials and exit"
)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Poll once, print the snapshot as JSON and exit
    #[arg(long, conflicts_with = "check")]
    once: bool,

    /// Request a fresh token to validate the credentials and exit
    #[arg(long)]
    check: bool,

    /// Enable debug logging for the polling core
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    let config = load_config(args.config.as_deref())?;
    info!(
        "Starting HYXi poller: interval={}min, virtual_battery={}",
        config.update_interval_minutes, config.enable_virtual_battery
    );

    if args.check {
        return check_credentials(&config).await;
    }

    let source = build_source(&config)?;
    let mut coordinator = PollCoordinator::new(
        source,
        RetryPolicy::from_config(&config),
        config.enable_virtual_battery,
    );
    let store = coordinator.store();

    if args.once {
        let result = coordinator.refresh().await;
        println!("{}", render_json(&store)?);
        return result.map(|_| ()).context("Poll failed");
    }

    run(&config, &mut coordinator, &store).await
}

fn init_tracing(verbose: bool) -> Result<()> {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if verbose {
        filter = filter.add_directive("hyxi_cloud=debug".parse()?);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<HyxiConfig> {
    match path {
        Some(path) => HyxiConfig::from_file(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            HyxiConfig::from_file(DEFAULT_CONFIG_PATH)
        }
        None => {
            warn!("No configuration file found, using HYXI_* environment variables");
            HyxiConfig::from_env()
        }
    }
}

fn build_source(config: &HyxiConfig) -> Result<Box<dyn SnapshotSource>> {
    if let Some(path) = &config.fixture_path {
        warn!("Fixture mode: serving snapshots from {}", path.display());
        return Ok(Box::new(FixtureSource::new(path.clone())));
    }
    Ok(Box::new(PollingClient::new(config)?))
}

async fn check_credentials(config: &HyxiConfig) -> Result<()> {
    if config.fixture_path.is_some() {
        bail!("--check needs cloud credentials, but fixture_path is set");
    }

    let client = PollingClient::new(config)?;
    match client.validate_credentials().await {
        Ok(()) => {
            info!("Credentials accepted by {}", config.base_url);
            Ok(())
        }
        Err(TokenError::AuthRejected(reason)) => {
            bail!("Credentials rejected: {reason}")
        }
        Err(e @ TokenError::TransientFailure(_)) => {
            Err(e).context("Could not reach the HYXi cloud to validate credentials")
        }
    }
}

async fn run<S: SnapshotSource>(
    config: &HyxiConfig,
    coordinator: &mut PollCoordinator<S>,
    store: &SnapshotStore,
) -> Result<()> {
    // Startup poll happens before the interval starts ticking.
    handle_poll(coordinator.refresh().await, store)?;

    let mut interval = tokio::time::interval(config.update_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Shutdown signal received, stopping poller");
                break;
            }
            result = async {
                interval.tick().await;
                coordinator.refresh().await
            } => {
                handle_poll(result, store)?;
            }
        }
    }

    Ok(())
}

fn handle_poll(result: Result<u32, PollError>, store: &SnapshotStore) -> Result<()> {
    match result {
        Ok(_) => {
            log_summary(store);
            Ok(())
        }
        Err(e @ PollError::AuthRejected(_)) => {
            error!("Re-authentication required, update access_key/secret_key");
            Err(e).context("HYXi credentials rejected")
        }
        Err(e) => {
            let health = store.health();
            warn!(
                "Cloud offline ({}), keeping {} cached devices, last success: {}",
                e,
                store.current_snapshot().len(),
                health
                    .last_success
                    .map_or_else(|| "never".to_owned(), |t| t.to_rfc3339())
            );
            Ok(())
        }
    }
}

fn log_summary(store: &SnapshotStore) {
    let snapshot = store.current_snapshot();
    for entry in snapshot.devices() {
        info!(
            "{} [{}] {}: {} metrics",
            entry.device.device_name,
            entry.kind(),
            entry.serial(),
            entry.metrics.len()
        );
    }

    if let Some(aggregate) = store.aggregate_summary() {
        info!(
            "Virtual battery ({} units): SOC {}%, SOH {}%, power {} W",
            aggregate.device_count, aggregate.avg_soc, aggregate.avg_soh, aggregate.battery_power
        );
    }
}

fn render_json(store: &SnapshotStore) -> Result<String> {
    let output = serde_json::json!({
        "health": store.health(),
        "devices": store.current_snapshot(),
        "aggregate": store.aggregate_summary(),
    });
    serde_json::to_string_pretty(&output).context("Failed to serialize snapshot")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
