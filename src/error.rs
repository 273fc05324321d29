// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `casahub` crate.
//!
//! This module provides the error hierarchy for failures across the hub:
//! persistent-store access, device link I/O, configuration, and resolution
//! of control targets.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Error from the persistent device store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error from a device link.
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    /// Error while loading or parsing configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error at the process boundary (socket bind, HTTP serve, seed
    /// import).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The addressed device is not known to the registry.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The addressed device has no usable link (missing address or never
    /// initialized).
    #[error("device has no link")]
    NotConnected,

    /// No device or channel matched the given display name.
    #[error("no device matches name: {0}")]
    UnknownName(String),
}

/// Errors from the persistent device store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding stored records failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A state update addressed a device that has no stored record.
    #[error("no stored record for device: {0}")]
    UnknownDevice(String),
}

/// Errors from device link I/O.
///
/// Link failures are treated as transient: the reconciliation loop marks the
/// device offline and retries on the next cycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Connection to the device failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The device did not answer within the socket timeout.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// The device answered with a protocol-level error payload.
    #[error("device reported an error: {0}")]
    Protocol(String),

    /// The device rejected the command.
    #[error("command rejected: {0}")]
    Rejected(String),
}

/// Errors while loading hub configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the configuration file failed.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path of the configuration file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Path of the configuration file.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
