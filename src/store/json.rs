// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JSON-file implementation of [`DeviceStore`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::{ChannelValues, DeviceId};

use super::{DeviceRecord, DeviceStore};

/// On-disk layout of the store file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    devices: BTreeMap<DeviceId, DeviceRecord>,
    #[serde(default)]
    settings: BTreeMap<String, String>,
}

/// A [`DeviceStore`] backed by a single pretty-printed JSON file.
///
/// The whole file is held in memory behind a mutex and rewritten on every
/// mutation. Write-through keeps the store crash-safe enough for a hub whose
/// write rate is already bounded by change detection in the reconciliation
/// loop.
pub struct JsonStore {
    path: PathBuf,
    inner: Mutex<StoreFile>,
}

impl JsonStore {
    /// Opens the store at `path`, creating an empty one if the file does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let inner = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            StoreFile::default()
        };

        Ok(Self {
            path,
            inner: Mutex::new(inner),
        })
    }

    /// Returns the number of stored device records.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.inner.lock().devices.len()
    }

    fn persist(&self, inner: &StoreFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(inner)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl DeviceStore for JsonStore {
    fn upsert_device(&self, record: &DeviceRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.devices.insert(record.id.clone(), record.clone());
        self.persist(&inner)
    }

    fn all_devices(&self) -> Result<Vec<DeviceRecord>, StoreError> {
        Ok(self.inner.lock().devices.values().cloned().collect())
    }

    fn update_device_state(
        &self,
        id: &DeviceId,
        delta: &ChannelValues,
        online: bool,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();

        let record = inner
            .devices
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownDevice(id.to_string()))?;

        for (channel, value) in delta {
            record.values.insert(channel.clone(), value.clone());
        }
        record.online = online;
        #[allow(clippy::cast_precision_loss)]
        {
            record.last_update = Utc::now().timestamp_millis() as f64 / 1000.0;
        }

        self.persist(&inner)
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().settings.get(key).cloned())
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.settings.insert(key.to_string(), value.to_string());
        self.persist(&inner)
    }

    fn all_settings(&self) -> Result<BTreeMap<String, String>, StoreError> {
        Ok(self.inner.lock().settings.clone())
    }
}

impl std::fmt::Debug for JsonStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonStore")
            .field("path", &self.path)
            .field("devices", &self.inner.lock().devices.len())
            .finish_non_exhaustive()
    }
}
