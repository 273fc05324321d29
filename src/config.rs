// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hub configuration.
//!
//! Loaded from a JSON file; every field has a default so a missing or
//! partial file still yields a runnable hub. The file location comes from
//! the `CASAHUB_CONFIG` environment variable, falling back to the
//! platform's config directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Runtime configuration of the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Socket address the HTTP API binds to.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Path of the JSON device store.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    /// Optional seed file imported into an empty store at startup.
    #[serde(default)]
    pub seed_file: Option<PathBuf>,
    /// Seconds between reconciliation cycles.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Milliseconds between two device polls within one cycle.
    #[serde(default = "default_device_pause")]
    pub device_pause_ms: u64,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("casahub")
        .join("hub.json")
}

fn default_poll_interval() -> u64 {
    5
}

fn default_device_pause() -> u64 {
    100
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            store_path: default_store_path(),
            seed_file: None,
            poll_interval_secs: default_poll_interval(),
            device_pause_ms: default_device_pause(),
        }
    }
}

impl HubConfig {
    /// Returns the path the configuration is loaded from: the
    /// `CASAHUB_CONFIG` environment variable if set, the platform config
    /// directory otherwise.
    #[must_use]
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("CASAHUB_CONFIG") {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("casahub")
            .join("config.json")
    }

    /// Loads the configuration from the default location.
    ///
    /// A missing file yields the defaults; an unreadable or malformed file
    /// is logged and also yields the defaults, so the hub always starts.
    #[must_use]
    pub fn load() -> Self {
        let path = Self::default_path();
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "using default configuration");
                Self::default()
            }
        }
    }

    /// Loads the configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Returns the reconciliation cycle interval.
    #[must_use]
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Returns the pause between device polls.
    #[must_use]
    pub fn device_pause(&self) -> Duration {
        Duration::from_millis(self.device_pause_ms)
    }
}
