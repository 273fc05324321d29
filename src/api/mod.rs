// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP control API.
//!
//! A thin façade over the registry, the timer scheduler and the store.
//! Every operation answers with a structured `{success, message}` reply;
//! internal failures are converted at this boundary, never propagated as
//! panics or raw errors.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::registry::{DeviceRegistry, DeviceSummary};
use crate::store::DeviceStore;
use crate::timer::{SetOutcome, TimerScheduler};
use crate::types::{ChannelId, ChannelSpec, DeviceId, PowerAction};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiState {
    /// The device registry.
    pub registry: DeviceRegistry,
    /// The timer scheduler.
    pub timers: Arc<TimerScheduler>,
    /// The persistent store (for config patches and settings).
    pub store: Arc<dyn DeviceStore>,
}

/// Structured reply of every mutating endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiReply {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
}

impl ApiReply {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// One device in the `GET /api/devices` listing.
#[derive(Debug, Serialize)]
pub struct DeviceEntry {
    /// Registry snapshot of the device.
    #[serde(flatten)]
    pub summary: DeviceSummary,
    /// Rendered remaining-time labels of pending timers, keyed by channel
    /// id (or `main` for whole-device timers).
    pub timers: BTreeMap<String, String>,
}

/// Builds the API router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/devices", get(list_devices))
        .route("/api/control", post(control))
        .route("/api/set_timer", post(set_timer))
        .route("/api/update_config", post(update_config))
        .route("/api/settings", get(get_settings).post(put_setting))
        .route("/api/command", post(command))
        .with_state(state)
}

fn error_status(err: &Error) -> StatusCode {
    match err {
        Error::DeviceNotFound(_) | Error::UnknownName(_) => StatusCode::NOT_FOUND,
        Error::NotConnected => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(err: &Error) -> (StatusCode, Json<ApiReply>) {
    (error_status(err), Json(ApiReply::fail(err.to_string())))
}

// =========================================================================
// GET /api/devices
// =========================================================================

async fn list_devices(State(state): State<ApiState>) -> Json<Vec<DeviceEntry>> {
    let now = Utc::now();
    let entries = state
        .registry
        .summaries()
        .await
        .into_iter()
        .map(|summary| {
            let timers = state.timers.labels_for(&summary.id, now);
            DeviceEntry { summary, timers }
        })
        .collect();
    Json(entries)
}

// =========================================================================
// POST /api/control
// =========================================================================

#[derive(Debug, Deserialize)]
struct ControlRequest {
    id: String,
    action: String,
    #[serde(default)]
    channel_id: Option<String>,
}

async fn control(
    State(state): State<ApiState>,
    Json(req): Json<ControlRequest>,
) -> (StatusCode, Json<ApiReply>) {
    let Ok(action) = req.action.parse::<PowerAction>() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiReply::fail(format!("unknown action: {}", req.action))),
        );
    };

    let id = DeviceId::from(req.id);
    let channel = req.channel_id.map(ChannelId::from);

    match state.registry.apply_action(&id, channel.as_ref(), action).await {
        Ok(_) => {
            let name = state
                .registry
                .device_name(&id)
                .await
                .unwrap_or_else(|| id.to_string());
            (
                StatusCode::OK,
                Json(ApiReply::ok(format!("Turned {} {name}.", action.as_str()))),
            )
        }
        Err(e) => error_reply(&e),
    }
}

// =========================================================================
// POST /api/set_timer
// =========================================================================

#[derive(Debug, Deserialize)]
struct SetTimerRequest {
    id: String,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    minutes: i64,
}

async fn set_timer(
    State(state): State<ApiState>,
    Json(req): Json<SetTimerRequest>,
) -> (StatusCode, Json<ApiReply>) {
    let id = DeviceId::from(req.id);
    let channel = req.channel_id.map(ChannelId::from);

    let outcome = state
        .timers
        .set(&state.registry, &id, channel.as_ref(), req.minutes)
        .await;

    match outcome {
        SetOutcome::Cancelled => (StatusCode::OK, Json(ApiReply::ok("Timer cancelled."))),
        SetOutcome::NothingToCancel => (
            StatusCode::OK,
            Json(ApiReply::ok("No timer was pending for this target.")),
        ),
        SetOutcome::UnknownDevice => (
            StatusCode::NOT_FOUND,
            Json(ApiReply::fail(format!("device not found: {id}"))),
        ),
        SetOutcome::Scheduled { action, .. } => {
            let mut target = state
                .registry
                .device_name(&id)
                .await
                .unwrap_or_else(|| id.to_string());
            if let Some(ch) = &channel
                && let Some(label) = state.registry.channel_label(&id, ch).await
            {
                target = format!("{target} ({label})");
            }
            (
                StatusCode::OK,
                Json(ApiReply::ok(format!(
                    "Will turn {} {target} in {} minutes.",
                    action.label(),
                    req.minutes
                ))),
            )
        }
    }
}

// =========================================================================
// POST /api/update_config
// =========================================================================

#[derive(Debug, Deserialize)]
struct UpdateConfigRequest {
    id: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    version: Option<f64>,
    #[serde(default)]
    device_name: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    channel_name: Option<String>,
}

async fn update_config(
    State(state): State<ApiState>,
    Json(req): Json<UpdateConfigRequest>,
) -> (StatusCode, Json<ApiReply>) {
    let id = DeviceId::from(req.id);

    let records = match state.store.all_devices() {
        Ok(records) => records,
        Err(e) => return error_reply(&Error::Store(e)),
    };
    let Some(mut record) = records.into_iter().find(|r| r.id == id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiReply::fail(format!("device not found: {id}"))),
        );
    };

    let mut changed = false;
    if let Some(address) = req.address {
        record.address = address;
        changed = true;
    }
    if let Some(version) = req.version {
        record.version = version;
        changed = true;
    }
    if let Some(name) = req.device_name {
        record.name = name.trim().to_string();
        changed = true;
    }
    if let (Some(channel_id), Some(channel_name)) = (req.channel_id, req.channel_name) {
        let channel = ChannelId::from(channel_id.as_str());
        record
            .mapping
            .entry(channel)
            .or_insert_with(|| ChannelSpec {
                code: Some(format!("dp_{channel_id}")),
                ..ChannelSpec::default()
            })
            .name = Some(channel_name);
        changed = true;
    }

    if !changed {
        return (
            StatusCode::OK,
            Json(ApiReply::fail("Nothing changed.")),
        );
    }

    if let Err(e) = state.store.upsert_device(&record) {
        return error_reply(&Error::Store(e));
    }
    // Reload so inherited fields and the lookup index stay consistent.
    if let Err(e) = state.registry.load().await {
        return error_reply(&e);
    }

    (StatusCode::OK, Json(ApiReply::ok("Configuration saved.")))
}

// =========================================================================
// GET/POST /api/settings
// =========================================================================

async fn get_settings(
    State(state): State<ApiState>,
) -> Result<Json<BTreeMap<String, String>>, (StatusCode, Json<ApiReply>)> {
    state
        .store
        .all_settings()
        .map(Json)
        .map_err(|e| error_reply(&Error::Store(e)))
}

#[derive(Debug, Deserialize)]
struct PutSettingRequest {
    key: String,
    value: String,
}

async fn put_setting(
    State(state): State<ApiState>,
    Json(req): Json<PutSettingRequest>,
) -> (StatusCode, Json<ApiReply>) {
    match state.store.set_setting(&req.key, &req.value) {
        Ok(()) => (StatusCode::OK, Json(ApiReply::ok("Setting saved."))),
        Err(e) => error_reply(&Error::Store(e)),
    }
}

// =========================================================================
// POST /api/command — control by display name
// =========================================================================

#[derive(Debug, Deserialize)]
struct CommandRequest {
    name: String,
    command: String,
}

async fn command(
    State(state): State<ApiState>,
    Json(req): Json<CommandRequest>,
) -> (StatusCode, Json<ApiReply>) {
    let Ok(action) = req.command.parse::<PowerAction>() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiReply::fail(format!("unknown command: {}", req.command))),
        );
    };

    let Some(target) = state.registry.resolve_by_name(&req.name).await else {
        return error_reply(&Error::UnknownName(req.name));
    };

    match state
        .registry
        .apply_action(&target.device, target.channel.as_ref(), action)
        .await
    {
        Ok(_) => (
            StatusCode::OK,
            Json(ApiReply::ok(format!(
                "Turned {} {}.",
                action.as_str(),
                target.display
            ))),
        ),
        Err(e) => error_reply(&e),
    }
}
