// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runtime device entry owned by the registry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::link::DeviceLink;
use crate::types::{ChannelId, ChannelMap, ChannelValues, DeviceId};

use super::DeviceKind;

/// Conventional primary on/off channels for single-relay devices.
///
/// Addressing a device without naming a channel falls back to these, in
/// order, restricted to channels already present in the cache. The
/// convention is vendor lore, not validated against the mapping; devices
/// that put their relay elsewhere need an explicit channel id.
pub const PRIMARY_CHANNELS: [&str; 2] = ["1", "20"];

/// One device as held in the registry cache.
///
/// Static fields are recomputed from the store on every registry load
/// (sub-devices re-derive address, credential and version from their
/// gateway); `values`, `online`, `last_update` and the owned `link` survive
/// reloads in place.
pub struct Device {
    /// Stable device id.
    pub id: DeviceId,
    /// Display name.
    pub name: String,
    /// Classified device kind; derived, never persisted.
    pub kind: DeviceKind,
    /// Vendor taxonomy code.
    pub category: String,
    /// Channel descriptor map.
    pub mapping: ChannelMap,
    /// Last observed channel values.
    pub values: ChannelValues,
    /// Resolved LAN address (inherited from the gateway for sub-devices).
    pub address: Option<String>,
    /// The address the device's own record reports, before inheritance.
    pub reported_address: String,
    /// Resolved credential.
    pub credential: String,
    /// Resolved protocol version.
    pub version: f64,
    /// Name of the owning gateway, for sub-devices.
    pub via: Option<String>,
    /// True for sub-devices.
    pub is_sub: bool,
    /// Sub-node id used by the gateway.
    pub node_id: Option<String>,
    /// Whether the device answered its most recent poll.
    pub online: bool,
    /// Time of the last successful poll or control.
    pub last_update: Option<DateTime<Utc>>,
    /// True when no resolvable address exists; excludes the device from
    /// polling and control.
    pub missing_address: bool,
    /// Owned link handle, created lazily and reused across cycles.
    pub link: Option<Arc<dyn DeviceLink>>,
}

impl Device {
    /// Merges polled channel values into the cache.
    ///
    /// The merge is a superset update: channels absent from `delta` keep
    /// their cached values. Returns true if any value actually changed.
    pub fn merge_values(&mut self, delta: &ChannelValues) -> bool {
        let mut changed = false;
        for (channel, value) in delta {
            if self.values.get(channel) != Some(value) {
                self.values.insert(channel.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }

    /// Reads a channel's boolean state from the cache.
    ///
    /// With no channel given, falls back to the first conventional primary
    /// channel present in the cache. Unknown or non-boolean values read as
    /// off.
    #[must_use]
    pub fn channel_is_on(&self, channel: Option<&ChannelId>) -> bool {
        if let Some(channel) = channel
            && let Some(value) = self.values.get(channel)
        {
            return value.as_bool().unwrap_or(false);
        }

        PRIMARY_CHANNELS.iter().any(|ch| {
            self.values
                .get(&ChannelId::from(*ch))
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false)
        })
    }

    /// Returns the conventional primary channels present in the cache.
    #[must_use]
    pub fn cached_primary_channels(&self) -> Vec<ChannelId> {
        PRIMARY_CHANNELS
            .iter()
            .map(|ch| ChannelId::from(*ch))
            .filter(|ch| self.values.contains_key(ch))
            .collect()
    }

    /// Returns the display name of a channel, if the mapping knows one.
    #[must_use]
    pub fn channel_display(&self, channel: &ChannelId) -> Option<&str> {
        self.mapping.get(channel).and_then(|spec| spec.display_name())
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("online", &self.online)
            .field("missing_address", &self.missing_address)
            .field("has_link", &self.link.is_some())
            .finish_non_exhaustive()
    }
}

/// Serializable view of a device, as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    /// Stable device id.
    pub id: DeviceId,
    /// Display name.
    pub name: String,
    /// Classified kind.
    pub kind: DeviceKind,
    /// Vendor taxonomy code.
    pub category: String,
    /// Resolved LAN address.
    pub address: Option<String>,
    /// The record's own address, before gateway inheritance.
    pub reported_address: String,
    /// Resolved protocol version.
    pub version: f64,
    /// Whether the device answered its most recent poll.
    pub online: bool,
    /// True when no resolvable address exists.
    pub missing_address: bool,
    /// Name of the owning gateway, for sub-devices.
    pub via: Option<String>,
    /// Channel descriptor map.
    pub mapping: ChannelMap,
    /// Last observed channel values.
    pub values: ChannelValues,
    /// Time of the last successful poll or control.
    pub last_update: Option<DateTime<Utc>>,
}

impl From<&Device> for DeviceSummary {
    fn from(device: &Device) -> Self {
        Self {
            id: device.id.clone(),
            name: device.name.clone(),
            kind: device.kind,
            category: device.category.clone(),
            address: device.address.clone(),
            reported_address: device.reported_address.clone(),
            version: device.version,
            online: device.online,
            missing_address: device.missing_address,
            via: device.via.clone(),
            mapping: device.mapping.clone(),
            values: device.values.clone(),
            last_update: device.last_update,
        }
    }
}
