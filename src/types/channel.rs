// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Channel descriptors and channel value maps.
//!
//! A channel is one individually addressable point on a device: a relay
//! button on a multi-gang switch, a temperature reading on a sensor. The
//! vendor catalog describes each channel with a code and a data type; only
//! `Boolean` channels are controllable on/off points.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ChannelId;

/// Ordered channel descriptor map of a device.
pub type ChannelMap = BTreeMap<ChannelId, ChannelSpec>;

/// Last-known channel values of a device.
///
/// Values are raw JSON: booleans for switch channels, numbers and strings
/// for sensor readings.
pub type ChannelValues = BTreeMap<ChannelId, serde_json::Value>;

/// Data type of a channel as declared by the vendor catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelKind {
    /// On/off point; the only kind that is directly controllable.
    Boolean,
    /// Numeric reading or setting.
    Integer,
    /// Enumerated setting.
    Enum,
    /// Free-form string.
    #[default]
    String,
    /// Structured JSON payload.
    Json,
    /// Bitmap of fault flags.
    Bitmap,
    /// Raw, vendor-opaque payload.
    Raw,
    /// Any kind this crate does not model explicitly.
    #[serde(other)]
    Other,
}

impl ChannelKind {
    /// Returns true for channels that accept on/off control.
    #[must_use]
    pub const fn is_switchable(self) -> bool {
        matches!(self, Self::Boolean)
    }
}

/// Descriptor of a single channel.
///
/// Mirrors the vendor catalog entry: a machine `code`, an optional
/// user-assigned display `name`, and the data type. The display name, when
/// present, feeds the registry's name lookup index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    /// Vendor code of the channel (e.g. `switch_1`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// User-assigned display name, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Declared data type.
    #[serde(rename = "type", default)]
    pub kind: ChannelKind,
}

impl ChannelSpec {
    /// Creates a boolean (switchable) channel descriptor.
    #[must_use]
    pub fn boolean(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            name: None,
            kind: ChannelKind::Boolean,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the name shown to users: the display name when set, the
    /// vendor code otherwise.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.code.as_deref())
    }
}
