// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Persisted device record.

use serde::{Deserialize, Serialize};

use crate::types::{ChannelMap, ChannelValues, DeviceId};

/// Durable record of one device, as stored by a [`super::DeviceStore`].
///
/// Holds both static configuration (address, credential, vendor taxonomy)
/// and the last persisted dynamic state (channel values, online flag).
/// Derived runtime attributes — classified kind, resolved gateway
/// inheritance, the live link — are never persisted; the registry recomputes
/// them on every load.
///
/// All fields except `id` default, so partial seed files deserialize
/// cleanly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Stable vendor-assigned device id; primary key.
    pub id: DeviceId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// LAN address, if the device has its own. Empty or `0.0.0.0` means
    /// no resolvable address.
    #[serde(default)]
    pub address: String,
    /// Local credential used by the device link.
    #[serde(default)]
    pub credential: String,
    /// Protocol version; `0.0` means unset.
    #[serde(default)]
    pub version: f64,
    /// Vendor taxonomy code (e.g. `cz`, `wg2`, `wsdcg`).
    #[serde(default)]
    pub category: String,
    /// Vendor product name, kept as a classification hint.
    #[serde(default)]
    pub product_name: String,
    /// Vendor product id.
    #[serde(default)]
    pub product_id: String,
    /// Vendor model string.
    #[serde(default)]
    pub model: String,
    /// True for sub-devices reachable only through a gateway.
    #[serde(default)]
    pub sub: bool,
    /// Identifier the gateway uses for this sub-device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Id of the owning gateway, for sub-devices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<DeviceId>,
    /// Channel descriptor map.
    #[serde(default)]
    pub mapping: ChannelMap,
    /// Last persisted channel values.
    #[serde(default)]
    pub values: ChannelValues,
    /// Whether the device was online at the last persistence point.
    #[serde(default)]
    pub online: bool,
    /// Unix timestamp (seconds) of the last state persistence.
    #[serde(default)]
    pub last_update: f64,
    /// True when no resolvable address existed at the last registry build.
    #[serde(default)]
    pub missing_address: bool,
}

impl DeviceRecord {
    /// Creates an empty record with the given id.
    #[must_use]
    pub fn new(id: impl Into<DeviceId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Returns the address if it is resolvable (non-empty and not the
    /// null-address sentinel).
    #[must_use]
    pub fn resolvable_address(&self) -> Option<&str> {
        if self.address.is_empty() || self.address == "0.0.0.0" {
            None
        } else {
            Some(&self.address)
        }
    }
}
