// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device registry: the in-memory device universe.
//!
//! The registry owns every [`Device`] entry and its link handle. It is built
//! from the persistent store, re-derives gateway inheritance and device
//! kinds on every load, and publishes a display-name lookup index. All
//! mutable state sits behind one `RwLock`; store reads and link I/O happen
//! outside it.

mod classify;
mod device;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::link::{DeviceLink, LinkFactory, LinkProfile, LinkSettings};
use crate::store::{DeviceRecord, DeviceStore};
use crate::types::{ChannelId, ChannelValues, DeviceId, PowerAction};

pub use classify::{DeviceKind, classify};
pub use device::{Device, DeviceSummary, PRIMARY_CHANNELS};

/// Protocol version assumed when a record (or its gateway) declares none.
const FALLBACK_VERSION: f64 = 3.3;

/// Result of a display-name lookup.
///
/// `channel` is set when the match was a named channel rather than a whole
/// device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTarget {
    /// Matched device.
    pub device: DeviceId,
    /// Matched channel, if the name belongs to one.
    pub channel: Option<ChannelId>,
    /// The display name that matched, in its original casing.
    pub display: String,
}

/// A store row with gateway inheritance and classification applied.
struct ResolvedRecord {
    id: DeviceId,
    name: String,
    kind: DeviceKind,
    category: String,
    mapping: crate::types::ChannelMap,
    address: Option<String>,
    reported_address: String,
    credential: String,
    version: f64,
    via: Option<String>,
    is_sub: bool,
    node_id: Option<String>,
}

#[derive(Default)]
struct RegistryInner {
    devices: HashMap<DeviceId, Device>,
    index: BTreeMap<String, LookupTarget>,
}

/// Shared, injectable registry of devices.
///
/// Cloning is cheap and shares the same underlying state, the same store
/// and the same link factory.
#[derive(Clone)]
pub struct DeviceRegistry {
    inner: Arc<RwLock<RegistryInner>>,
    store: Arc<dyn DeviceStore>,
    links: Arc<dyn LinkFactory>,
}

impl DeviceRegistry {
    /// Creates an empty registry over the given store and link factory.
    #[must_use]
    pub fn new(store: Arc<dyn DeviceStore>, links: Arc<dyn LinkFactory>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::default())),
            store,
            links,
        }
    }

    /// Returns the store this registry persists to.
    #[must_use]
    pub fn store(&self) -> Arc<dyn DeviceStore> {
        Arc::clone(&self.store)
    }

    // =========================================================================
    // Build / refresh
    // =========================================================================

    /// Builds or refreshes the registry from the store.
    ///
    /// Existing entries are updated in place, preserving cached channel
    /// values and the link handle; new entries start offline with empty
    /// values; entries whose record disappeared are dropped. Malformed rows
    /// are skipped with a warning. The write lock is held only for the
    /// in-memory merge, never for store reads or link construction.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store itself cannot be read.
    pub async fn load(&self) -> Result<usize> {
        let records = self.store.all_devices().map_err(Error::Store)?;

        let gateways: HashMap<DeviceId, DeviceRecord> = records
            .iter()
            .filter(|r| is_gateway_row(r))
            .map(|r| (r.id.clone(), r.clone()))
            .collect();

        let mut resolved = Vec::with_capacity(records.len());
        for record in &records {
            if record.id.is_empty() {
                tracing::warn!(name = %record.name, "skipping device record without id");
                continue;
            }
            resolved.push(resolve_record(record, &gateways));
        }

        let loaded = {
            let mut inner = self.inner.write().await;
            let seen: HashSet<DeviceId> = resolved.iter().map(|r| r.id.clone()).collect();

            for r in resolved {
                merge_entry(&mut inner.devices, r);
            }
            inner.devices.retain(|id, _| seen.contains(id));
            let index = rebuild_index(&inner.devices);
            inner.index = index;
            inner.devices.len()
        };

        self.refresh_links().await;

        tracing::info!(devices = loaded, "registry loaded");
        Ok(loaded)
    }

    /// Creates missing links and reconfigures existing ones.
    ///
    /// A link is constructed once per device and then only updated in
    /// place; reconstruction is reserved for devices that lost their link
    /// entirely, which bounds socket churn on the LAN.
    async fn refresh_links(&self) {
        let mut to_configure = Vec::new();
        let mut to_create = Vec::new();

        {
            let inner = self.inner.read().await;
            for dev in inner.devices.values() {
                let Some(address) = &dev.address else {
                    continue;
                };
                let mut settings =
                    LinkSettings::new(address.clone(), dev.credential.clone(), dev.version);
                if dev.is_sub
                    && let Some(node_id) = &dev.node_id
                {
                    settings = settings.with_node_id(node_id.clone());
                }

                match &dev.link {
                    Some(link) => to_configure.push((Arc::clone(link), settings)),
                    None => to_create.push((dev.id.clone(), link_profile(dev.kind), settings)),
                }
            }
        }

        for (link, settings) in to_configure {
            link.configure(&settings);
        }

        let created: Vec<(DeviceId, Arc<dyn DeviceLink>)> = to_create
            .into_iter()
            .map(|(id, profile, settings)| {
                let link = self.links.create(&id, profile, settings);
                (id, link)
            })
            .collect();

        if !created.is_empty() {
            let mut inner = self.inner.write().await;
            for (id, link) in created {
                if let Some(dev) = inner.devices.get_mut(&id)
                    && dev.link.is_none()
                {
                    dev.link = Some(link);
                }
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Returns the number of devices in the cache.
    pub async fn device_count(&self) -> usize {
        self.inner.read().await.devices.len()
    }

    /// Returns true if the device exists in the cache.
    pub async fn contains(&self, id: &DeviceId) -> bool {
        self.inner.read().await.devices.contains_key(id)
    }

    /// Returns the display name of a device.
    pub async fn device_name(&self, id: &DeviceId) -> Option<String> {
        self.inner
            .read()
            .await
            .devices
            .get(id)
            .map(|d| d.name.clone())
    }

    /// Returns the display name of a channel, falling back to its vendor
    /// code.
    pub async fn channel_label(&self, id: &DeviceId, channel: &ChannelId) -> Option<String> {
        self.inner
            .read()
            .await
            .devices
            .get(id)
            .and_then(|d| d.channel_display(channel).map(str::to_string))
    }

    /// Reads a channel's boolean state from the cache.
    ///
    /// Returns `None` if the device is unknown; unknown channel values read
    /// as off.
    pub async fn channel_state(&self, id: &DeviceId, channel: Option<&ChannelId>) -> Option<bool> {
        self.inner
            .read()
            .await
            .devices
            .get(id)
            .map(|d| d.channel_is_on(channel))
    }

    /// Returns serializable summaries of all devices, ordered by name.
    pub async fn summaries(&self) -> Vec<DeviceSummary> {
        let inner = self.inner.read().await;
        let mut list: Vec<DeviceSummary> = inner.devices.values().map(DeviceSummary::from).collect();
        list.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        list
    }

    /// Resolves a display name to a device or channel.
    ///
    /// Exact (case-insensitive, trimmed) matches win; otherwise the
    /// shortest, lexicographically-first index key containing the needle is
    /// chosen, which keeps substring matching deterministic.
    pub async fn resolve_by_name(&self, name: &str) -> Option<LookupTarget> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }

        let inner = self.inner.read().await;
        if let Some(target) = inner.index.get(&needle) {
            return Some(target.clone());
        }

        inner
            .index
            .iter()
            .filter(|(key, _)| key.contains(&needle))
            .min_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
            .map(|(_, target)| target.clone())
    }

    /// Returns the link of every pollable device.
    ///
    /// Devices with no link or no resolvable address are excluded. The
    /// returned handles are used outside the registry lock.
    pub async fn poll_targets(&self) -> Vec<(DeviceId, Arc<dyn DeviceLink>)> {
        self.inner
            .read()
            .await
            .devices
            .values()
            .filter(|d| !d.missing_address)
            .filter_map(|d| d.link.as_ref().map(|l| (d.id.clone(), Arc::clone(l))))
            .collect()
    }

    /// Returns the device's link handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] for unknown devices and
    /// [`Error::NotConnected`] for devices without a link.
    pub async fn link_for(&self, id: &DeviceId) -> Result<Arc<dyn DeviceLink>> {
        let inner = self.inner.read().await;
        let dev = inner
            .devices
            .get(id)
            .ok_or_else(|| Error::DeviceNotFound(id.to_string()))?;
        dev.link.as_ref().map(Arc::clone).ok_or(Error::NotConnected)
    }

    // =========================================================================
    // Cache mutation
    // =========================================================================

    /// Records a successful poll: merges values, flips the device online
    /// and stamps the update time.
    ///
    /// Returns whether anything changed (a value differed, or the device
    /// came back online); `None` if the device vanished from the cache.
    pub async fn record_poll_success(
        &self,
        id: &DeviceId,
        values: &ChannelValues,
    ) -> Option<bool> {
        let mut inner = self.inner.write().await;
        let dev = inner.devices.get_mut(id)?;

        let was_online = dev.online;
        let values_changed = dev.merge_values(values);
        dev.online = true;
        dev.last_update = Some(Utc::now());

        Some(values_changed || !was_online)
    }

    /// Records a failed poll: flips the device offline.
    ///
    /// Returns whether the device was online before (i.e. whether the
    /// transition needs persisting); `None` if the device vanished.
    pub async fn record_poll_failure(&self, id: &DeviceId) -> Option<bool> {
        let mut inner = self.inner.write().await;
        let dev = inner.devices.get_mut(id)?;

        let was_online = dev.online;
        dev.online = false;
        Some(was_online)
    }

    // =========================================================================
    // Control
    // =========================================================================

    /// Applies a power action to a device or one of its channels.
    ///
    /// Link I/O runs outside the registry lock. On success the cache is
    /// updated with the written values and the change is persisted
    /// (best-effort: a store failure is logged, not returned). Whole-device
    /// actions update the conventional primary channels already present in
    /// the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the device is unknown, has no link, or the link
    /// call fails.
    pub async fn apply_action(
        &self,
        id: &DeviceId,
        channel: Option<&ChannelId>,
        action: PowerAction,
    ) -> Result<ChannelValues> {
        let link = self.link_for(id).await?;

        match channel {
            Some(ch) => link.set_channel(ch, action.as_bool()).await?,
            None if action.as_bool() => link.turn_on().await?,
            None => link.turn_off().await?,
        }

        let delta = {
            let mut inner = self.inner.write().await;
            let dev = inner
                .devices
                .get_mut(id)
                .ok_or_else(|| Error::DeviceNotFound(id.to_string()))?;

            let mut delta = ChannelValues::new();
            match channel {
                Some(ch) => {
                    delta.insert(ch.clone(), serde_json::Value::Bool(action.as_bool()));
                }
                None => {
                    for ch in dev.cached_primary_channels() {
                        delta.insert(ch, serde_json::Value::Bool(action.as_bool()));
                    }
                }
            }
            dev.merge_values(&delta);
            dev.last_update = Some(Utc::now());
            delta
        };

        if let Err(e) = self.store.update_device_state(id, &delta, true) {
            tracing::warn!(%id, error = %e, "failed to persist control result");
        }

        Ok(delta)
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry").finish_non_exhaustive()
    }
}

/// A row is a gateway candidate if its category carries the gateway marker,
/// or it has its own resolvable address and no parent.
fn is_gateway_row(record: &DeviceRecord) -> bool {
    record.category.to_lowercase().contains("wg")
        || (record.resolvable_address().is_some() && record.parent.is_none())
}

/// Applies gateway inheritance and classification to one row.
///
/// A sub-device never keeps its own address or credential once its gateway
/// resolves; stale per-row address data must not mask a fresher gateway
/// value.
fn resolve_record(
    record: &DeviceRecord,
    gateways: &HashMap<DeviceId, DeviceRecord>,
) -> ResolvedRecord {
    let gateway = record.parent.as_ref().and_then(|pid| gateways.get(pid));

    let (address, credential, version, via, is_sub, node_id) = match gateway {
        Some(gw) => (
            gw.resolvable_address().map(str::to_string),
            gw.credential.clone(),
            if gw.version > 0.0 {
                gw.version
            } else {
                FALLBACK_VERSION
            },
            Some(gw.name.clone()),
            true,
            record
                .node_id
                .clone()
                .or_else(|| Some(record.id.to_string())),
        ),
        None => (
            record.resolvable_address().map(str::to_string),
            record.credential.clone(),
            if record.version > 0.0 {
                record.version
            } else {
                FALLBACK_VERSION
            },
            None,
            false,
            record.node_id.clone(),
        ),
    };

    ResolvedRecord {
        id: record.id.clone(),
        name: record.name.clone(),
        kind: classify(record),
        category: record.category.clone(),
        mapping: record.mapping.clone(),
        address,
        reported_address: record.address.clone(),
        credential,
        version,
        via,
        is_sub,
        node_id,
    }
}

/// Creates a new entry or updates an existing one in place, preserving
/// cached values, online state and the link handle.
fn merge_entry(devices: &mut HashMap<DeviceId, Device>, r: ResolvedRecord) {
    let missing_address = r.address.is_none();

    match devices.get_mut(&r.id) {
        Some(dev) => {
            dev.name = r.name;
            dev.kind = r.kind;
            dev.category = r.category;
            dev.mapping = r.mapping;
            dev.address = r.address;
            dev.reported_address = r.reported_address;
            dev.credential = r.credential;
            dev.version = r.version;
            dev.via = r.via;
            dev.is_sub = r.is_sub;
            dev.node_id = r.node_id;
            dev.missing_address = missing_address;
        }
        None => {
            devices.insert(
                r.id.clone(),
                Device {
                    id: r.id,
                    name: r.name,
                    kind: r.kind,
                    category: r.category,
                    mapping: r.mapping,
                    values: ChannelValues::new(),
                    address: r.address,
                    reported_address: r.reported_address,
                    credential: r.credential,
                    version: r.version,
                    via: r.via,
                    is_sub: r.is_sub,
                    node_id: r.node_id,
                    online: false,
                    last_update: None,
                    missing_address,
                    link: None,
                },
            );
        }
    }
}

/// Rebuilds the display-name index from scratch.
///
/// Devices are visited in id order so that name collisions resolve the same
/// way on every load. Boolean channels with a display name are indexed next
/// to whole devices.
fn rebuild_index(devices: &HashMap<DeviceId, Device>) -> BTreeMap<String, LookupTarget> {
    let mut index = BTreeMap::new();

    let mut ids: Vec<&DeviceId> = devices.keys().collect();
    ids.sort();

    for id in ids {
        let dev = &devices[id];

        let key = dev.name.trim().to_lowercase();
        if !key.is_empty() {
            index.insert(
                key,
                LookupTarget {
                    device: dev.id.clone(),
                    channel: None,
                    display: dev.name.trim().to_string(),
                },
            );
        }

        for (channel, spec) in &dev.mapping {
            if !spec.kind.is_switchable() {
                continue;
            }
            let Some(name) = spec.display_name() else {
                continue;
            };
            let key = name.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            index.insert(
                key,
                LookupTarget {
                    device: dev.id.clone(),
                    channel: Some(channel.clone()),
                    display: name.trim().to_string(),
                },
            );
        }
    }

    index
}

fn link_profile(kind: DeviceKind) -> LinkProfile {
    match kind {
        DeviceKind::Light => LinkProfile::Light,
        _ => LinkProfile::Switch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::sim::SimLinkFactory;
    use crate::store::JsonStore;
    use crate::types::ChannelSpec;
    use serde_json::json;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<JsonStore>,
        links: Arc<SimLinkFactory>,
        registry: DeviceRegistry,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonStore::open(dir.path().join("hub.json")).unwrap());
        let links = Arc::new(SimLinkFactory::new());
        let registry = DeviceRegistry::new(
            Arc::clone(&store) as Arc<dyn DeviceStore>,
            Arc::clone(&links) as Arc<dyn LinkFactory>,
        );
        Fixture {
            _dir: dir,
            store,
            links,
            registry,
        }
    }

    fn gateway_record() -> DeviceRecord {
        let mut gw = DeviceRecord::new("gw01");
        gw.name = "Zigbee hub".to_string();
        gw.category = "wg2".to_string();
        gw.address = "192.168.1.10".to_string();
        gw.credential = "gw-secret".to_string();
        gw
    }

    fn sub_record() -> DeviceRecord {
        let mut sub = DeviceRecord::new("sub01");
        sub.name = "Bedroom sensor".to_string();
        sub.category = "wsdcg".to_string();
        sub.parent = Some(DeviceId::from("gw01"));
        sub.sub = true;
        sub
    }

    #[tokio::test]
    async fn sub_devices_inherit_gateway_connection() {
        let f = fixture();
        f.store.upsert_device(&gateway_record()).unwrap();
        f.store.upsert_device(&sub_record()).unwrap();

        f.registry.load().await.unwrap();

        let link = f.links.created(&DeviceId::from("sub01")).unwrap();
        let settings = link.settings();
        assert_eq!(settings.address, "192.168.1.10");
        assert_eq!(settings.credential, "gw-secret");
        // Gateway declares no version: falls back to 3.3.
        assert!((settings.version - 3.3).abs() < f64::EPSILON);
        assert_eq!(settings.node_id.as_deref(), Some("sub01"));
    }

    #[tokio::test]
    async fn sub_devices_use_declared_gateway_version() {
        let f = fixture();
        let mut gw = gateway_record();
        gw.version = 3.4;
        f.store.upsert_device(&gw).unwrap();
        f.store.upsert_device(&sub_record()).unwrap();

        f.registry.load().await.unwrap();

        let link = f.links.created(&DeviceId::from("sub01")).unwrap();
        assert!((link.settings().version - 3.4).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn missing_address_devices_get_no_link() {
        let f = fixture();
        let mut record = DeviceRecord::new("bf01");
        record.name = "Orphan".to_string();
        record.address = "0.0.0.0".to_string();
        f.store.upsert_device(&record).unwrap();

        f.registry.load().await.unwrap();

        assert_eq!(f.links.created_count(), 0);
        assert!(f.registry.poll_targets().await.is_empty());
        let summary = &f.registry.summaries().await[0];
        assert!(summary.missing_address);
    }

    #[tokio::test]
    async fn reload_reuses_existing_links() {
        let f = fixture();
        let mut record = DeviceRecord::new("bf01");
        record.name = "Plug".to_string();
        record.category = "cz".to_string();
        record.address = "192.168.1.40".to_string();
        f.store.upsert_device(&record).unwrap();

        f.registry.load().await.unwrap();
        assert_eq!(f.links.created_count(), 1);

        // Change the address and reload: same link, new settings.
        record.address = "192.168.1.41".to_string();
        f.store.upsert_device(&record).unwrap();
        f.registry.load().await.unwrap();

        assert_eq!(f.links.created_count(), 1);
        let link = f.links.created(&DeviceId::from("bf01")).unwrap();
        assert_eq!(link.settings().address, "192.168.1.41");
    }

    #[tokio::test]
    async fn new_entries_start_offline_with_empty_values() {
        let f = fixture();
        let mut record = DeviceRecord::new("bf01");
        record.name = "Plug".to_string();
        record.address = "192.168.1.40".to_string();
        record.online = true;
        record.values.insert("1".into(), json!(true));
        f.store.upsert_device(&record).unwrap();

        f.registry.load().await.unwrap();

        let summary = &f.registry.summaries().await[0];
        assert!(!summary.online);
        assert!(summary.values.is_empty());
    }

    /// Minimal in-memory store for tests that need records to disappear.
    #[derive(Default)]
    struct MemStore {
        devices: parking_lot::Mutex<BTreeMap<DeviceId, DeviceRecord>>,
    }

    impl MemStore {
        fn remove(&self, id: &DeviceId) {
            self.devices.lock().remove(id);
        }
    }

    impl DeviceStore for MemStore {
        fn upsert_device(&self, record: &DeviceRecord) -> std::result::Result<(), crate::error::StoreError> {
            self.devices.lock().insert(record.id.clone(), record.clone());
            Ok(())
        }

        fn all_devices(&self) -> std::result::Result<Vec<DeviceRecord>, crate::error::StoreError> {
            Ok(self.devices.lock().values().cloned().collect())
        }

        fn update_device_state(
            &self,
            id: &DeviceId,
            delta: &ChannelValues,
            online: bool,
        ) -> std::result::Result<(), crate::error::StoreError> {
            let mut devices = self.devices.lock();
            let record = devices
                .get_mut(id)
                .ok_or_else(|| crate::error::StoreError::UnknownDevice(id.to_string()))?;
            for (ch, v) in delta {
                record.values.insert(ch.clone(), v.clone());
            }
            record.online = online;
            Ok(())
        }

        fn get_setting(&self, _key: &str) -> std::result::Result<Option<String>, crate::error::StoreError> {
            Ok(None)
        }

        fn set_setting(&self, _key: &str, _value: &str) -> std::result::Result<(), crate::error::StoreError> {
            Ok(())
        }

        fn all_settings(
            &self,
        ) -> std::result::Result<BTreeMap<String, String>, crate::error::StoreError> {
            Ok(BTreeMap::new())
        }
    }

    #[tokio::test]
    async fn reload_preserves_cached_values_and_drops_vanished_devices() {
        let store = Arc::new(MemStore::default());
        let links = Arc::new(SimLinkFactory::new());
        let registry = DeviceRegistry::new(
            Arc::clone(&store) as Arc<dyn DeviceStore>,
            Arc::clone(&links) as Arc<dyn LinkFactory>,
        );

        let mut keep = DeviceRecord::new("bf01");
        keep.name = "Plug".to_string();
        keep.address = "192.168.1.40".to_string();
        let mut gone = DeviceRecord::new("bf02");
        gone.name = "Old plug".to_string();
        gone.address = "192.168.1.41".to_string();
        store.upsert_device(&keep).unwrap();
        store.upsert_device(&gone).unwrap();

        registry.load().await.unwrap();
        assert_eq!(registry.device_count().await, 2);

        let id = DeviceId::from("bf01");
        let mut values = ChannelValues::new();
        values.insert("1".into(), json!(true));
        registry.record_poll_success(&id, &values).await.unwrap();

        store.remove(&DeviceId::from("bf02"));
        registry.load().await.unwrap();

        assert_eq!(registry.device_count().await, 1);
        // The surviving device kept its cached values across the reload.
        assert_eq!(
            registry.channel_state(&id, Some(&ChannelId::from("1"))).await,
            Some(true)
        );
    }

    #[tokio::test]
    async fn lookup_prefers_exact_match() {
        let f = fixture();
        let mut a = DeviceRecord::new("bf01");
        a.name = "Fan".to_string();
        a.address = "192.168.1.40".to_string();
        let mut b = DeviceRecord::new("bf02");
        b.name = "Fan light".to_string();
        b.address = "192.168.1.41".to_string();
        f.store.upsert_device(&a).unwrap();
        f.store.upsert_device(&b).unwrap();

        f.registry.load().await.unwrap();

        let hit = f.registry.resolve_by_name(" FAN ").await.unwrap();
        assert_eq!(hit.device, DeviceId::from("bf01"));
        assert!(hit.channel.is_none());
    }

    #[tokio::test]
    async fn lookup_substring_tie_break_is_deterministic() {
        let f = fixture();
        let mut a = DeviceRecord::new("bf01");
        a.name = "Ceiling fan bedroom".to_string();
        a.address = "192.168.1.40".to_string();
        let mut b = DeviceRecord::new("bf02");
        b.name = "Ceiling fan attic".to_string();
        b.address = "192.168.1.41".to_string();
        f.store.upsert_device(&a).unwrap();
        f.store.upsert_device(&b).unwrap();

        f.registry.load().await.unwrap();

        // Both contain "ceiling"; the shorter key wins the tie-break.
        let hit = f.registry.resolve_by_name("ceiling").await.unwrap();
        assert_eq!(hit.device, DeviceId::from("bf02"));
    }

    #[tokio::test]
    async fn lookup_finds_named_boolean_channels() {
        let f = fixture();
        let mut record = DeviceRecord::new("bf01");
        record.name = "Wall panel".to_string();
        record.address = "192.168.1.40".to_string();
        record.mapping.insert(
            "2".into(),
            ChannelSpec::boolean("switch_2").with_name("Desk lamp"),
        );
        f.store.upsert_device(&record).unwrap();

        f.registry.load().await.unwrap();

        let hit = f.registry.resolve_by_name("desk lamp").await.unwrap();
        assert_eq!(hit.device, DeviceId::from("bf01"));
        assert_eq!(hit.channel, Some(ChannelId::from("2")));
    }

    #[tokio::test]
    async fn unknown_name_returns_none() {
        let f = fixture();
        assert!(f.registry.resolve_by_name("nothing").await.is_none());
        assert!(f.registry.resolve_by_name("  ").await.is_none());
    }

    #[tokio::test]
    async fn apply_action_writes_link_and_cache_and_store() {
        let f = fixture();
        let mut record = DeviceRecord::new("bf01");
        record.name = "Plug".to_string();
        record.category = "cz".to_string();
        record.address = "192.168.1.40".to_string();
        f.store.upsert_device(&record).unwrap();
        f.registry.load().await.unwrap();

        let id = DeviceId::from("bf01");
        f.registry
            .apply_action(&id, Some(&ChannelId::from("1")), PowerAction::On)
            .await
            .unwrap();

        // Link saw the write.
        let link = f.links.created(&id).unwrap();
        assert_eq!(link.values().get(&ChannelId::from("1")), Some(&json!(true)));
        // Cache saw the write.
        assert_eq!(
            f.registry.channel_state(&id, Some(&ChannelId::from("1"))).await,
            Some(true)
        );
        // Store saw the write.
        let stored = &f.store.all_devices().unwrap()[0];
        assert_eq!(stored.values.get(&ChannelId::from("1")), Some(&json!(true)));
        assert!(stored.online);
    }

    #[tokio::test]
    async fn apply_action_without_channel_updates_cached_primaries() {
        let f = fixture();
        let mut record = DeviceRecord::new("bf01");
        record.name = "Plug".to_string();
        record.address = "192.168.1.40".to_string();
        f.store.upsert_device(&record).unwrap();
        f.registry.load().await.unwrap();

        let id = DeviceId::from("bf01");
        let mut polled = ChannelValues::new();
        polled.insert("1".into(), json!(false));
        polled.insert("20".into(), json!(false));
        polled.insert("9".into(), json!(0));
        f.registry.record_poll_success(&id, &polled).await.unwrap();

        let delta = f.registry.apply_action(&id, None, PowerAction::On).await.unwrap();

        assert_eq!(delta.len(), 2);
        assert_eq!(
            f.registry.channel_state(&id, Some(&ChannelId::from("20"))).await,
            Some(true)
        );
    }

    #[tokio::test]
    async fn apply_action_on_unknown_device_fails() {
        let f = fixture();
        let err = f
            .registry
            .apply_action(&DeviceId::from("ghost"), None, PowerAction::On)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound(_)));
    }

    #[tokio::test]
    async fn poll_bookkeeping_tracks_online_transitions() {
        let f = fixture();
        let mut record = DeviceRecord::new("bf01");
        record.name = "Plug".to_string();
        record.address = "192.168.1.40".to_string();
        f.store.upsert_device(&record).unwrap();
        f.registry.load().await.unwrap();

        let id = DeviceId::from("bf01");
        let mut values = ChannelValues::new();
        values.insert("1".into(), json!(false));

        // First success: offline -> online counts as a change.
        assert_eq!(f.registry.record_poll_success(&id, &values).await, Some(true));
        // Same values while online: no change.
        assert_eq!(f.registry.record_poll_success(&id, &values).await, Some(false));
        // Failure while online: needs persisting.
        assert_eq!(f.registry.record_poll_failure(&id).await, Some(true));
        // Failure while already offline: nothing to persist.
        assert_eq!(f.registry.record_poll_failure(&id).await, Some(false));
    }
}
