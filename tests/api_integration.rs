// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the HTTP API over a real socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use casahub::api::{ApiState, build_router};
use casahub::link::LinkFactory;
use casahub::link::sim::SimLinkFactory;
use casahub::registry::DeviceRegistry;
use casahub::store::{DeviceRecord, DeviceStore, JsonStore};
use casahub::sync::Reconciler;
use casahub::timer::{TimerKey, TimerScheduler};
use casahub::types::{ChannelId, ChannelSpec, ChannelValues, DeviceId, PowerAction};
use serde_json::{Value, json};

struct Hub {
    _dir: tempfile::TempDir,
    addr: SocketAddr,
    client: reqwest::Client,
    links: Arc<SimLinkFactory>,
    registry: DeviceRegistry,
    timers: Arc<TimerScheduler>,
    reconciler: Reconciler,
}

impl Hub {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

/// Starts a hub with a gateway, a dependent sub-device and a standalone
/// two-channel switch, served on an ephemeral port.
async fn spawn_hub() -> Hub {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonStore::open(dir.path().join("hub.json")).unwrap());
    let links = Arc::new(SimLinkFactory::new());

    let mut gateway = DeviceRecord::new("gw01");
    gateway.name = "Zigbee hub".to_string();
    gateway.category = "wg2".to_string();
    gateway.address = "192.168.1.10".to_string();
    gateway.credential = "gw-secret".to_string();
    store.upsert_device(&gateway).unwrap();

    let mut sensor = DeviceRecord::new("door1");
    sensor.name = "Front door".to_string();
    sensor.category = "mcs".to_string();
    sensor.parent = Some(DeviceId::from("gw01"));
    sensor.sub = true;
    store.upsert_device(&sensor).unwrap();

    let mut switch = DeviceRecord::new("sw1");
    switch.name = "Wall panel".to_string();
    switch.category = "kg".to_string();
    switch.address = "192.168.1.40".to_string();
    switch.mapping.insert(
        "1".into(),
        ChannelSpec::boolean("switch_1").with_name("Desk lamp"),
    );
    switch
        .mapping
        .insert("2".into(), ChannelSpec::boolean("switch_2"));
    store.upsert_device(&switch).unwrap();

    let registry = DeviceRegistry::new(
        Arc::clone(&store) as Arc<dyn DeviceStore>,
        Arc::clone(&links) as Arc<dyn LinkFactory>,
    );
    registry.load().await.unwrap();

    let timers = Arc::new(TimerScheduler::new());
    let reconciler = Reconciler::new(registry.clone(), Arc::clone(&timers))
        .with_cadence(Duration::from_millis(10), Duration::ZERO);

    let state = ApiState {
        registry: registry.clone(),
        timers: Arc::clone(&timers),
        store: store as Arc<dyn DeviceStore>,
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });

    Hub {
        _dir: dir,
        addr,
        client: reqwest::Client::new(),
        links,
        registry,
        timers,
        reconciler,
    }
}

fn entry<'a>(devices: &'a [Value], id: &str) -> &'a Value {
    devices
        .iter()
        .find(|d| d["id"] == id)
        .unwrap_or_else(|| panic!("device {id} missing from listing"))
}

#[tokio::test]
async fn listing_reflects_polled_state_and_inheritance() {
    let hub = spawn_hub().await;

    let mut values = ChannelValues::new();
    values.insert("1".into(), json!(true));
    hub.links
        .created(&DeviceId::from("sw1"))
        .unwrap()
        .seed(values);
    hub.reconciler.run_cycle().await;

    let devices: Vec<Value> = hub
        .client
        .get(hub.url("/api/devices"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(devices.len(), 3);

    let switch = entry(&devices, "sw1");
    assert_eq!(switch["online"], json!(true));
    assert_eq!(switch["values"]["1"], json!(true));
    assert_eq!(switch["kind"], json!("switch"));

    // The sub-device inherited its gateway's address.
    let door = entry(&devices, "door1");
    assert_eq!(door["via"], json!("Zigbee hub"));
    assert_eq!(door["address"], json!("192.168.1.10"));
    assert_eq!(door["kind"], json!("sensor"));
}

#[tokio::test]
async fn control_flips_channel_and_persists() {
    let hub = spawn_hub().await;

    let reply: Value = hub
        .client
        .post(hub.url("/api/control"))
        .json(&json!({"id": "sw1", "action": "on", "channel_id": "1"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(reply["success"], json!(true));

    let link = hub.links.created(&DeviceId::from("sw1")).unwrap();
    assert_eq!(link.values().get(&ChannelId::from("1")), Some(&json!(true)));

    let devices: Vec<Value> = hub
        .client
        .get(hub.url("/api/devices"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(entry(&devices, "sw1")["values"]["1"], json!(true));
}

#[tokio::test]
async fn control_unknown_device_returns_structured_404() {
    let hub = spawn_hub().await;

    let response = hub
        .client
        .post(hub.url("/api/control"))
        .json(&json!({"id": "ghost", "action": "on"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let reply: Value = response.json().await.unwrap();
    assert_eq!(reply["success"], json!(false));
    assert!(reply["message"].as_str().unwrap().contains("ghost"));
}

#[tokio::test]
async fn timer_is_listed_then_fires_then_disappears() {
    let hub = spawn_hub().await;
    let id = DeviceId::from("sw1");
    let ch = ChannelId::from("1");

    // Bring channel 1 online as on, so the timer schedules an Off.
    let mut values = ChannelValues::new();
    values.insert("1".into(), json!(true));
    hub.links.created(&id).unwrap().seed(values);
    hub.reconciler.run_cycle().await;

    let reply: Value = hub
        .client
        .post(hub.url("/api/set_timer"))
        .json(&json!({"id": "sw1", "channel_id": "1", "minutes": 10}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply["success"], json!(true));
    assert!(reply["message"].as_str().unwrap().contains("OFF"));

    let devices: Vec<Value> = hub
        .client
        .get(hub.url("/api/devices"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let label = entry(&devices, "sw1")["timers"]["1"].as_str().unwrap();
    assert!(label.starts_with("OFF in"), "got: {label}");

    // Re-key the pending timer to fire now, then run a cycle.
    hub.timers.schedule_at(
        TimerKey::new(id.clone(), Some(ch.clone())),
        PowerAction::Off,
        chrono::Utc::now() - chrono::Duration::seconds(1),
    );
    hub.reconciler.run_cycle().await;

    let link = hub.links.created(&id).unwrap();
    assert_eq!(link.values().get(&ch), Some(&json!(false)));

    let devices: Vec<Value> = hub
        .client
        .get(hub.url("/api/devices"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(entry(&devices, "sw1")["timers"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn cancelling_twice_stays_successful() {
    let hub = spawn_hub().await;

    hub.client
        .post(hub.url("/api/set_timer"))
        .json(&json!({"id": "sw1", "channel_id": "2", "minutes": 5}))
        .send()
        .await
        .unwrap();

    let reply: Value = hub
        .client
        .post(hub.url("/api/set_timer"))
        .json(&json!({"id": "sw1", "channel_id": "2", "minutes": 0}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply["success"], json!(true));
    assert_eq!(reply["message"], json!("Timer cancelled."));

    let reply: Value = hub
        .client
        .post(hub.url("/api/set_timer"))
        .json(&json!({"id": "sw1", "channel_id": "2", "minutes": 0}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply["success"], json!(true));
    assert!(reply["message"].as_str().unwrap().contains("No timer"));
}

#[tokio::test]
async fn config_update_renames_channel_and_rebuilds_index() {
    let hub = spawn_hub().await;

    let reply: Value = hub
        .client
        .post(hub.url("/api/update_config"))
        .json(&json!({
            "id": "sw1",
            "channel_id": "2",
            "channel_name": "Heater"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply["success"], json!(true));

    // The new channel name is now controllable through the lookup index.
    let reply: Value = hub
        .client
        .post(hub.url("/api/command"))
        .json(&json!({"name": "heater", "command": "on"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply["success"], json!(true));

    let link = hub.links.created(&DeviceId::from("sw1")).unwrap();
    assert_eq!(link.values().get(&ChannelId::from("2")), Some(&json!(true)));

    // No link was reconstructed by the registry reload the update triggered.
    assert_eq!(hub.links.created_count(), 3);
    assert_eq!(hub.registry.device_count().await, 3);
}

#[tokio::test]
async fn settings_round_trip_over_http() {
    let hub = spawn_hub().await;

    let reply: Value = hub
        .client
        .post(hub.url("/api/settings"))
        .json(&json!({"key": "announce_bills", "value": "on"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply["success"], json!(true));

    let settings: Value = hub
        .client
        .get(hub.url("/api/settings"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(settings["announce_bills"], json!("on"));
}
