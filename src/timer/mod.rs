// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Deferred power-flip timers.
//!
//! A timer flips one device or channel after a delay. The action is decided
//! once, when the timer is set, as the inverse of the channel's state at
//! that moment; it is not re-evaluated at fire time. Timers live in process
//! memory only and are lost on restart.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::registry::DeviceRegistry;
use crate::types::{ChannelId, DeviceId, PowerAction};

/// Composite key of a pending timer.
///
/// `channel` is `None` for whole-device timers. Using a struct key (rather
/// than a delimited string) keeps device ids containing arbitrary
/// characters unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerKey {
    /// Target device.
    pub device: DeviceId,
    /// Target channel, or `None` for the whole device.
    pub channel: Option<ChannelId>,
}

impl TimerKey {
    /// Creates a key for a device or one of its channels.
    #[must_use]
    pub fn new(device: DeviceId, channel: Option<ChannelId>) -> Self {
        Self { device, channel }
    }
}

/// A pending deferred action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    /// Absolute fire time.
    pub due_at: DateTime<Utc>,
    /// Action applied at fire time.
    pub action: PowerAction,
}

/// Outcome of a set-timer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetOutcome {
    /// A timer was scheduled (replacing any previous one for the key).
    Scheduled {
        /// Action that will fire.
        action: PowerAction,
        /// When it fires.
        due_at: DateTime<Utc>,
    },
    /// An existing timer was cancelled.
    Cancelled,
    /// Cancellation was requested but no timer existed.
    NothingToCancel,
    /// The addressed device is not in the registry.
    UnknownDevice,
}

/// Owner of all pending timers.
///
/// At most one timer exists per key; setting again replaces. The scheduler
/// only reads device state through the registry and never touches links:
/// executing due timers is the reconciliation loop's job.
#[derive(Debug, Default)]
pub struct TimerScheduler {
    pending: Mutex<HashMap<TimerKey, Timer>>,
}

impl TimerScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets or cancels a timer for a device/channel.
    ///
    /// `minutes <= 0` cancels any existing timer for the key (idempotent).
    /// Otherwise the addressed channel's current boolean state is read from
    /// the cache (falling back to the conventional primary channel when no
    /// channel is given), the inverse action is computed, and the timer is
    /// upserted.
    pub async fn set(
        &self,
        registry: &DeviceRegistry,
        device: &DeviceId,
        channel: Option<&ChannelId>,
        minutes: i64,
    ) -> SetOutcome {
        let key = TimerKey::new(device.clone(), channel.cloned());

        if minutes <= 0 {
            return if self.pending.lock().remove(&key).is_some() {
                tracing::debug!(%device, "timer cancelled");
                SetOutcome::Cancelled
            } else {
                SetOutcome::NothingToCancel
            };
        }

        let Some(currently_on) = registry.channel_state(device, channel).await else {
            return SetOutcome::UnknownDevice;
        };

        let action = PowerAction::from_bool(currently_on).inverse();
        let due_at = Utc::now() + Duration::minutes(minutes);

        self.schedule_at(key, action, due_at);
        tracing::debug!(%device, %action, minutes, "timer scheduled");

        SetOutcome::Scheduled { action, due_at }
    }

    /// Upserts a timer directly, replacing any pending one for the key.
    pub fn schedule_at(&self, key: TimerKey, action: PowerAction, due_at: DateTime<Utc>) {
        self.pending.lock().insert(key, Timer { due_at, action });
    }

    /// Removes and returns every timer due at or before `now`.
    #[must_use]
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<(TimerKey, Timer)> {
        let mut pending = self.pending.lock();
        let due_keys: Vec<TimerKey> = pending
            .iter()
            .filter(|(_, timer)| timer.due_at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        due_keys
            .into_iter()
            .filter_map(|key| pending.remove(&key).map(|timer| (key, timer)))
            .collect()
    }

    /// Renders remaining-time labels for one device's pending timers.
    ///
    /// Keys are channel ids, or `"main"` for a whole-device timer. Timers
    /// whose remaining time is not positive are skipped but not removed;
    /// actual removal stays with the reconciliation loop.
    #[must_use]
    pub fn labels_for(&self, device: &DeviceId, now: DateTime<Utc>) -> BTreeMap<String, String> {
        let pending = self.pending.lock();
        let mut labels = BTreeMap::new();

        for (key, timer) in pending.iter() {
            if &key.device != device {
                continue;
            }
            let remaining = (timer.due_at - now).num_seconds();
            if remaining <= 0 {
                continue;
            }
            let slot = key
                .channel
                .as_ref()
                .map_or_else(|| "main".to_string(), ToString::to_string);
            labels.insert(
                slot,
                format!("{} in {}m", timer.action.label(), remaining / 60),
            );
        }

        labels
    }

    /// Returns the number of pending timers.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns the pending timer for a key, if any.
    #[must_use]
    pub fn get(&self, key: &TimerKey) -> Option<Timer> {
        self.pending.lock().get(key).copied()
    }
}
