// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device link capability.
//!
//! A [`DeviceLink`] is the hub's only view of the wire protocol spoken to a
//! physical device. The registry creates one link per reachable device and
//! reuses it across reconciliation cycles; links are configured, never
//! reconstructed, when device configuration changes.
//!
//! The crate does not implement a vendor transport. The in-tree
//! [`sim::SimLink`] backend stands in for one during development and in
//! tests; real transports implement [`DeviceLink`] and [`LinkFactory`] out
//! of tree.

pub mod sim;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LinkError;
use crate::types::{ChannelId, ChannelValues, DeviceId};

/// Default retry budget for a single link call.
pub const DEFAULT_RETRY_LIMIT: u32 = 1;

/// Default socket timeout for a single link call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection parameters of a device link.
///
/// For sub-devices these are the owning gateway's address and credential,
/// plus the sub-node id the gateway uses to route commands.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSettings {
    /// LAN address of the device (or its gateway).
    pub address: String,
    /// Local credential.
    pub credential: String,
    /// Protocol version.
    pub version: f64,
    /// Sub-node id, set only for sub-devices.
    pub node_id: Option<String>,
    /// Keep the connection open between calls.
    pub persistent: bool,
    /// Retry budget per call.
    pub retry_limit: u32,
    /// Socket timeout per call.
    pub timeout: Duration,
}

impl LinkSettings {
    /// Creates settings with the default retry/timeout budget and a
    /// persistent connection.
    #[must_use]
    pub fn new(address: impl Into<String>, credential: impl Into<String>, version: f64) -> Self {
        Self {
            address: address.into(),
            credential: credential.into(),
            version,
            node_id: None,
            persistent: true,
            retry_limit: DEFAULT_RETRY_LIMIT,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the sub-node id.
    #[must_use]
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }
}

/// Link flavor requested from a factory.
///
/// Light devices get a color/brightness-capable link; everything else gets
/// a plain on/off link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkProfile {
    /// Plain on/off control.
    Switch,
    /// Color- and brightness-capable control.
    Light,
}

/// Async capability for talking to one device.
///
/// Calls are expected to fail fast (bounded by [`LinkSettings::retry_limit`]
/// and [`LinkSettings::timeout`]); the caller treats any error as the device
/// being offline and defers recovery to the next reconciliation cycle.
#[async_trait]
pub trait DeviceLink: Send + Sync {
    /// Queries the device's current channel values.
    async fn get_state(&self) -> Result<ChannelValues, LinkError>;

    /// Writes a boolean value to one channel.
    async fn set_channel(&self, channel: &ChannelId, on: bool) -> Result<(), LinkError>;

    /// Turns the whole device on.
    async fn turn_on(&self) -> Result<(), LinkError>;

    /// Turns the whole device off.
    async fn turn_off(&self) -> Result<(), LinkError>;

    /// Applies new connection parameters in place.
    fn configure(&self, settings: &LinkSettings);

    /// Returns the current connection parameters.
    fn settings(&self) -> LinkSettings;
}

/// Factory constructing [`DeviceLink`] handles.
///
/// The registry owns one factory and calls it lazily, only for devices that
/// have a resolvable address and no link yet.
pub trait LinkFactory: Send + Sync {
    /// Creates a link for the given device.
    fn create(
        &self,
        id: &DeviceId,
        profile: LinkProfile,
        settings: LinkSettings,
    ) -> Arc<dyn DeviceLink>;
}
