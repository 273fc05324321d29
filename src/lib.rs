// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `casahub` - a local smart-home hub.
//!
//! The hub keeps three surfaces consistent for a flat universe of LAN
//! devices: the live devices themselves, an in-memory registry cache, and a
//! durable store. Gateways relay commands to their dependent sub-devices;
//! sub-devices inherit the gateway's address, credential and protocol
//! version at registry build time.
//!
//! # Architecture
//!
//! - [`store::DeviceStore`] — durable records and settings (JSON file
//!   implementation included)
//! - [`registry::DeviceRegistry`] — the in-memory device universe, its
//!   display-name lookup index and the owned [`link::DeviceLink`] handles
//! - [`sync::Reconciler`] — background loop: executes due timers, polls
//!   devices, persists only what changed
//! - [`timer::TimerScheduler`] — deferred one-shot power flips, one per
//!   device/channel key
//! - [`api`] — axum HTTP façade over all of the above
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use casahub::link::sim::SimLinkFactory;
//! use casahub::registry::DeviceRegistry;
//! use casahub::store::JsonStore;
//! use casahub::sync::Reconciler;
//! use casahub::timer::TimerScheduler;
//!
//! #[tokio::main]
//! async fn main() -> casahub::Result<()> {
//!     let store = Arc::new(JsonStore::open("hub.json")?);
//!     let links = Arc::new(SimLinkFactory::new());
//!     let registry = DeviceRegistry::new(store, links);
//!     registry.load().await?;
//!
//!     let timers = Arc::new(TimerScheduler::new());
//!     let reconciler = Reconciler::new(registry.clone(), timers);
//!
//!     let (_tx, rx) = tokio::sync::watch::channel(false);
//!     tokio::spawn(reconciler.run(rx));
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod link;
pub mod registry;
pub mod store;
pub mod sync;
pub mod timer;
pub mod types;

pub use config::HubConfig;
pub use error::{ConfigError, Error, LinkError, Result, StoreError};
pub use link::{DeviceLink, LinkFactory, LinkProfile, LinkSettings};
pub use registry::{Device, DeviceKind, DeviceRegistry, DeviceSummary, LookupTarget, classify};
pub use store::{DeviceRecord, DeviceStore, JsonStore};
pub use sync::Reconciler;
pub use timer::{SetOutcome, Timer, TimerKey, TimerScheduler};
pub use types::{
    ChannelId, ChannelKind, ChannelMap, ChannelSpec, ChannelValues, DeviceId, PowerAction,
};
