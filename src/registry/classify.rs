// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device kind classification from vendor taxonomy codes and channel maps.

use serde::Serialize;

use crate::store::DeviceRecord;

/// Vendor category codes that map to switches.
const SWITCH_CATEGORIES: [&str; 9] = ["cz", "kg", "cl", "qjdt", "dc", "dd", "fs", "ws", "qt"];

/// Vendor category codes that map to sensors.
const SENSOR_CATEGORIES: [&str; 8] = ["hjjcy", "wsdcg", "pir", "mcs", "ywbj", "door", "sgl", "ms"];

/// Classified device kind.
///
/// Derived from the vendor category and the channel map at registry build
/// time; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Relay or plug controlled per channel.
    Switch,
    /// Dimmable or color-capable light.
    Light,
    /// Read-only reporting device.
    Sensor,
    /// Hub relaying commands to sub-devices.
    Gateway,
    /// Infrared blaster.
    IrRemote,
}

impl DeviceKind {
    /// Returns the lowercase name used in API payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Switch => "switch",
            Self::Light => "light",
            Self::Sensor => "sensor",
            Self::Gateway => "gateway",
            Self::IrRemote => "ir_remote",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classifies a device record; first matching rule wins.
///
/// The rules mirror how vendor catalogs mark devices: the channel map is the
/// strongest signal (a `switch_n` code beats any category), then known
/// category code sets, then category substring markers. Anything unmatched
/// is a sensor, which is safe because sensors are never controlled.
#[must_use]
pub fn classify(record: &DeviceRecord) -> DeviceKind {
    let category = record.category.to_lowercase();
    let mapping_text = mapping_text(record);

    if mapping_text.contains("switch") {
        return DeviceKind::Switch;
    }
    if mapping_text.contains("led")
        || mapping_text.contains("light")
        || mapping_text.contains("colour")
        || category.contains("dj")
    {
        return DeviceKind::Light;
    }
    if SWITCH_CATEGORIES.contains(&category.as_str()) {
        return DeviceKind::Switch;
    }
    if SENSOR_CATEGORIES.contains(&category.as_str()) {
        return DeviceKind::Sensor;
    }
    if category.contains("wg") {
        return DeviceKind::Gateway;
    }
    if category.contains("infrared") || category.contains("wnykq") {
        return DeviceKind::IrRemote;
    }
    DeviceKind::Sensor
}

/// Flattens the channel map's codes and names into one lowercase haystack.
fn mapping_text(record: &DeviceRecord) -> String {
    let mut text = String::new();
    for spec in record.mapping.values() {
        if let Some(code) = &spec.code {
            text.push_str(&code.to_lowercase());
            text.push(' ');
        }
        if let Some(name) = &spec.name {
            text.push_str(&name.to_lowercase());
            text.push(' ');
        }
    }
    text
}
