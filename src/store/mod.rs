// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Durable persistence for device records and hub settings.
//!
//! The [`DeviceStore`] trait is the system of record for device identity,
//! static configuration and last-known channel values. The hub ships a
//! JSON-file implementation ([`JsonStore`]); the trait keeps the storage
//! engine swappable and lets tests substitute counting doubles.

mod json;
mod record;

use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::types::{ChannelValues, DeviceId};

pub use json::JsonStore;
pub use record::DeviceRecord;

/// Persistent store of device records and key/value settings.
///
/// Methods are synchronous: implementations are expected to be fast local
/// writes, and callers on async paths invoke them between awaits. All
/// methods take `&self`; implementations guard their own interior state.
pub trait DeviceStore: Send + Sync {
    /// Inserts a record, or replaces the stored record with the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    fn upsert_device(&self, record: &DeviceRecord) -> Result<(), StoreError>;

    /// Returns every stored device record.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn all_devices(&self) -> Result<Vec<DeviceRecord>, StoreError>;

    /// Merges a channel-value delta into the stored record, updating the
    /// online flag and the last-update timestamp.
    ///
    /// The delta is a superset merge: channels absent from the delta keep
    /// their stored values.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownDevice`] if no record exists for `id`,
    /// or an error if the store cannot be written.
    fn update_device_state(
        &self,
        id: &DeviceId,
        delta: &ChannelValues,
        online: bool,
    ) -> Result<(), StoreError>;

    /// Reads a setting by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes a setting, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Returns all settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn all_settings(&self) -> Result<BTreeMap<String, String>, StoreError>;
}
