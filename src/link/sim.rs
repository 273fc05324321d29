// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Simulated device links.
//!
//! `SimLink` keeps channel state in memory and answers link calls without
//! any network I/O. It backs the hub when no vendor transport is compiled
//! in, and gives tests a scriptable device: seed channel values, inject
//! failures, count polls.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::LinkError;
use crate::types::{ChannelId, ChannelValues, DeviceId};

use super::{DeviceLink, LinkFactory, LinkProfile, LinkSettings};

#[derive(Debug)]
struct SimState {
    settings: LinkSettings,
    values: ChannelValues,
    failure: Option<LinkError>,
    poll_count: u64,
}

/// An in-memory [`DeviceLink`].
#[derive(Debug)]
pub struct SimLink {
    id: DeviceId,
    profile: LinkProfile,
    state: Mutex<SimState>,
}

impl SimLink {
    /// Creates a simulated link with empty channel state.
    #[must_use]
    pub fn new(id: DeviceId, profile: LinkProfile, settings: LinkSettings) -> Self {
        Self {
            id,
            profile,
            state: Mutex::new(SimState {
                settings,
                values: ChannelValues::new(),
                failure: None,
                poll_count: 0,
            }),
        }
    }

    /// Returns the device id this link belongs to.
    #[must_use]
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// Returns the link profile this link was created with.
    #[must_use]
    pub fn profile(&self) -> LinkProfile {
        self.profile
    }

    /// Replaces the simulated channel values.
    pub fn seed(&self, values: ChannelValues) {
        self.state.lock().values = values;
    }

    /// Makes every subsequent call fail with `error`, until cleared with
    /// [`Self::heal`].
    pub fn fail_with(&self, error: LinkError) {
        self.state.lock().failure = Some(error);
    }

    /// Clears an injected failure.
    pub fn heal(&self) {
        self.state.lock().failure = None;
    }

    /// Returns how many times [`DeviceLink::get_state`] was called.
    #[must_use]
    pub fn poll_count(&self) -> u64 {
        self.state.lock().poll_count
    }

    /// Returns the current simulated channel values.
    #[must_use]
    pub fn values(&self) -> ChannelValues {
        self.state.lock().values.clone()
    }

    fn check_failure(&self) -> Result<(), LinkError> {
        match &self.state.lock().failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DeviceLink for SimLink {
    async fn get_state(&self) -> Result<ChannelValues, LinkError> {
        let mut state = self.state.lock();
        state.poll_count += 1;
        match &state.failure {
            Some(err) => Err(err.clone()),
            None => Ok(state.values.clone()),
        }
    }

    async fn set_channel(&self, channel: &ChannelId, on: bool) -> Result<(), LinkError> {
        self.check_failure()?;
        self.state
            .lock()
            .values
            .insert(channel.clone(), serde_json::Value::Bool(on));
        Ok(())
    }

    async fn turn_on(&self) -> Result<(), LinkError> {
        self.set_all(true)
    }

    async fn turn_off(&self) -> Result<(), LinkError> {
        self.set_all(false)
    }

    fn configure(&self, settings: &LinkSettings) {
        self.state.lock().settings = settings.clone();
    }

    fn settings(&self) -> LinkSettings {
        self.state.lock().settings.clone()
    }
}

impl SimLink {
    /// Flips every boolean channel; a device with no boolean channels yet
    /// gets the conventional primary channel `1`.
    fn set_all(&self, on: bool) -> Result<(), LinkError> {
        self.check_failure()?;
        let mut state = self.state.lock();

        let boolean_channels: Vec<ChannelId> = state
            .values
            .iter()
            .filter(|(_, v)| v.is_boolean())
            .map(|(ch, _)| ch.clone())
            .collect();

        if boolean_channels.is_empty() {
            state
                .values
                .insert(ChannelId::from("1"), serde_json::Value::Bool(on));
        } else {
            for ch in boolean_channels {
                state.values.insert(ch, serde_json::Value::Bool(on));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct FactoryInner {
    seeds: HashMap<DeviceId, ChannelValues>,
    failures: HashMap<DeviceId, LinkError>,
    created: HashMap<DeviceId, Arc<SimLink>>,
}

/// A [`LinkFactory`] producing [`SimLink`] handles.
///
/// Behaviors can be scripted before the registry asks for a link: seeded
/// channel values and injected failures are applied to the link at creation
/// time. Created links are retained so tests can inspect them afterwards.
#[derive(Debug, Default)]
pub struct SimLinkFactory {
    inner: Mutex<FactoryInner>,
}

impl SimLinkFactory {
    /// Creates an empty factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the channel values the device's link starts with.
    pub fn seed_device(&self, id: impl Into<DeviceId>, values: ChannelValues) {
        self.inner.lock().seeds.insert(id.into(), values);
    }

    /// Makes the device's link fail every call with `error`.
    pub fn fail_device(&self, id: impl Into<DeviceId>, error: LinkError) {
        self.inner.lock().failures.insert(id.into(), error);
    }

    /// Returns the link created for `id`, if any.
    #[must_use]
    pub fn created(&self, id: &DeviceId) -> Option<Arc<SimLink>> {
        self.inner.lock().created.get(id).cloned()
    }

    /// Returns how many links this factory has created.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.inner.lock().created.len()
    }
}

impl LinkFactory for SimLinkFactory {
    fn create(
        &self,
        id: &DeviceId,
        profile: LinkProfile,
        settings: LinkSettings,
    ) -> Arc<dyn DeviceLink> {
        let link = Arc::new(SimLink::new(id.clone(), profile, settings));

        let mut inner = self.inner.lock();
        if let Some(values) = inner.seeds.get(id) {
            link.seed(values.clone());
        }
        if let Some(err) = inner.failures.get(id) {
            link.fail_with(err.clone());
        }
        inner.created.insert(id.clone(), Arc::clone(&link));

        link
    }
}
