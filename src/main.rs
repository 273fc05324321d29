// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! casahub - hub process entry point.
//!
//! Explicit lifecycle: load config, open the store, build the registry,
//! start the reconciliation loop, serve the API, and shut everything down
//! on ctrl-c.

use std::fs;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use casahub::api::{ApiState, build_router};
use casahub::link::sim::SimLinkFactory;
use casahub::registry::DeviceRegistry;
use casahub::store::{DeviceRecord, DeviceStore, JsonStore};
use casahub::sync::Reconciler;
use casahub::timer::TimerScheduler;
use casahub::{ConfigError, HubConfig, Result};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "hub terminated");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = HubConfig::load();

    let store = Arc::new(JsonStore::open(&config.store_path)?);
    seed_if_empty(&config, &store)?;

    // No vendor transport is compiled into this binary; the simulated
    // backend answers link calls from memory. Real transports implement
    // `DeviceLink`/`LinkFactory` and are wired here instead.
    let links = Arc::new(SimLinkFactory::new());

    let registry = DeviceRegistry::new(
        Arc::clone(&store) as Arc<dyn DeviceStore>,
        links,
    );
    registry.load().await?;

    let timers = Arc::new(TimerScheduler::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reconciler = Reconciler::new(registry.clone(), Arc::clone(&timers))
        .with_cadence(config.cycle_interval(), config.device_pause());
    let loop_handle = tokio::spawn(reconciler.run(shutdown_rx));

    let state = ApiState {
        registry,
        timers,
        store: store as Arc<dyn DeviceStore>,
    };
    let app = build_router(state);

    let listener = TcpListener::bind(config.listen.as_str()).await?;
    tracing::info!(listen = %config.listen, "hub listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    // Stop the reconciliation loop and wait for the in-flight cycle.
    let _ = shutdown_tx.send(true);
    let _ = loop_handle.await;

    Ok(())
}

/// Imports the seed file into an empty store.
///
/// Lets a fresh install start from an exported device list instead of an
/// empty universe; a store that already has records is left untouched.
fn seed_if_empty(config: &HubConfig, store: &JsonStore) -> Result<()> {
    let Some(seed_path) = &config.seed_file else {
        return Ok(());
    };
    if store.device_count() > 0 || !seed_path.exists() {
        return Ok(());
    }

    let contents = fs::read_to_string(seed_path)?;
    let records: Vec<DeviceRecord> =
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: seed_path.display().to_string(),
            source,
        })?;

    let mut imported = 0usize;
    for record in &records {
        if record.id.is_empty() {
            tracing::warn!(name = %record.name, "skipping seed record without id");
            continue;
        }
        store.upsert_device(record)?;
        imported += 1;
    }

    tracing::info!(imported, seed = %seed_path.display(), "seeded device store");
    Ok(())
}
