// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Background reconciliation loop.
//!
//! One cycle executes due timers, then polls every reachable device and
//! merges the results into the registry cache. Persistence happens only
//! when something materially changed, which decouples polling cadence from
//! write cadence. A failure on one device never aborts the sweep for the
//! others; the next cycle is the retry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::registry::DeviceRegistry;
use crate::store::DeviceStore;
use crate::timer::TimerScheduler;
use crate::types::ChannelValues;

/// Default pause between full reconciliation cycles.
pub const DEFAULT_CYCLE_INTERVAL: Duration = Duration::from_secs(5);

/// Default pause between two device polls within one cycle, bounding burst
/// load on the LAN.
pub const DEFAULT_DEVICE_PAUSE: Duration = Duration::from_millis(100);

/// The background reconciliation task.
pub struct Reconciler {
    registry: DeviceRegistry,
    timers: Arc<TimerScheduler>,
    store: Arc<dyn DeviceStore>,
    cycle_interval: Duration,
    device_pause: Duration,
}

impl Reconciler {
    /// Creates a reconciler with the default cadence.
    #[must_use]
    pub fn new(registry: DeviceRegistry, timers: Arc<TimerScheduler>) -> Self {
        let store = registry.store();
        Self {
            registry,
            timers,
            store,
            cycle_interval: DEFAULT_CYCLE_INTERVAL,
            device_pause: DEFAULT_DEVICE_PAUSE,
        }
    }

    /// Overrides the cycle interval and the inter-device pause.
    #[must_use]
    pub fn with_cadence(mut self, cycle_interval: Duration, device_pause: Duration) -> Self {
        self.cycle_interval = cycle_interval;
        self.device_pause = device_pause;
        self
    }

    /// Runs cycles until the shutdown flag flips (or its sender drops).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval = ?self.cycle_interval, "reconciliation loop started");

        let mut ticker = tokio::time::interval(self.cycle_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_cycle().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("reconciliation loop stopped");
    }

    /// Runs one full cycle: timer sweep, then poll sweep.
    pub async fn run_cycle(&self) {
        self.sweep_timers().await;
        self.poll_devices().await;
    }

    /// Executes every due timer.
    ///
    /// A timer whose device vanished or has no link is dropped with a
    /// warning, never retried.
    async fn sweep_timers(&self) {
        for (key, timer) in self.timers.take_due(Utc::now()) {
            tracing::info!(
                device = %key.device,
                channel = ?key.channel,
                action = %timer.action,
                "timer fired"
            );

            if let Err(e) = self
                .registry
                .apply_action(&key.device, key.channel.as_ref(), timer.action)
                .await
            {
                tracing::warn!(device = %key.device, error = %e, "dropping timer");
            }
        }
    }

    /// Polls every reachable device and reconciles cache and store.
    async fn poll_devices(&self) {
        let targets = self.registry.poll_targets().await;

        for (id, link) in targets {
            // Link I/O happens with no registry lock held.
            match link.get_state().await {
                Ok(values) => {
                    let Some(changed) = self.registry.record_poll_success(&id, &values).await
                    else {
                        continue;
                    };
                    if changed
                        && let Err(e) = self.store.update_device_state(&id, &values, true)
                    {
                        tracing::warn!(%id, error = %e, "failed to persist polled state");
                    }
                }
                Err(e) => {
                    tracing::debug!(%id, error = %e, "poll failed");
                    let Some(was_online) = self.registry.record_poll_failure(&id).await else {
                        continue;
                    };
                    if was_online
                        && let Err(e) =
                            self.store.update_device_state(&id, &ChannelValues::new(), false)
                    {
                        tracing::warn!(%id, error = %e, "failed to persist offline transition");
                    }
                }
            }

            tokio::time::sleep(self.device_pause).await;
        }
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("cycle_interval", &self.cycle_interval)
            .field("device_pause", &self.device_pause)
            .finish_non_exhaustive()
    }
}
