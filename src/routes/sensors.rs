use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::model::Sensor;
use crate::server::appstate::AppState;

pub async fn list(
    State(state): State<AppState>,
    Path(_apikey): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let core = state.core.lock().await;
    let out: HashMap<String, Sensor> = core
        .registry
        .sensors
        .iter()
        .map(|s| (s.id.clone(), s.clone()))
        .collect();
    Ok(Json(out))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path((_apikey, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let core = state.core.lock().await;
    let sensor = core
        .registry
        .sensor(&id)
        .ok_or_else(|| ApiError::NotFound(format!("/sensors/{id}")))?;
    Ok(Json(sensor.clone()))
}

#[derive(Debug, Deserialize, Default)]
pub struct SensorUpdate {
    pub name: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    Path((_apikey, id)): Path<(String, String)>,
    Json(patch): Json<SensorUpdate>,
) -> ApiResult<impl IntoResponse> {
    let mut core = state.core.lock().await;
    let sensor = core
        .registry
        .sensor_mut(&id)
        .ok_or_else(|| ApiError::NotFound(format!("/sensors/{id}")))?;
    let mut changed = Vec::new();
    if let Some(name) = patch.name {
        sensor.model = name;
        changed.push(("name".to_string(), json!(sensor.model)));
    }
    if !changed.is_empty() {
        sensor.touch_etag();
    }
    Ok(Json(crate::routes::success_envelope(
        &format!("/sensors/{id}"),
        &changed,
    )))
}

/// `CLIP Generic Flag`/`Status` sensors accept state writes from REST
/// (spec §3 "Sensor" — `ClipGenericFlag`/`ClipGenericStatus`).
#[derive(Debug, Deserialize, Default)]
pub struct SensorStateUpdate {
    pub flag: Option<bool>,
    pub status: Option<i32>,
}

pub async fn set_state(
    State(state): State<AppState>,
    Path((_apikey, id)): Path<(String, String)>,
    Json(patch): Json<SensorStateUpdate>,
) -> ApiResult<impl IntoResponse> {
    let mut core = state.core.lock().await;
    let sensor = core
        .registry
        .sensor_mut(&id)
        .ok_or_else(|| ApiError::NotFound(format!("/sensors/{id}/state")))?;

    let mut changed: Vec<(String, Value)> = Vec::new();
    if let Some(flag) = patch.flag {
        sensor.state.flag = Some(flag);
        changed.push(("flag".to_string(), json!(flag)));
    }
    if let Some(status) = patch.status {
        sensor.state.status = Some(status);
        changed.push(("status".to_string(), json!(status)));
    }
    sensor.state.lastupdated = Some(chrono::Utc::now());
    sensor.touch_etag();

    Ok(Json(crate::routes::success_envelope(
        &format!("/sensors/{id}/state"),
        &changed,
    )))
}

#[derive(Debug, Deserialize, Default)]
pub struct SensorConfigUpdate {
    pub on: Option<bool>,
    pub battery: Option<u8>,
}

pub async fn set_config(
    State(state): State<AppState>,
    Path((_apikey, id)): Path<(String, String)>,
    Json(patch): Json<SensorConfigUpdate>,
) -> ApiResult<impl IntoResponse> {
    let mut core = state.core.lock().await;
    let sensor = core
        .registry
        .sensor_mut(&id)
        .ok_or_else(|| ApiError::NotFound(format!("/sensors/{id}/config")))?;

    let mut changed: Vec<(String, Value)> = Vec::new();
    if let Some(on) = patch.on {
        sensor.config.on = on;
        changed.push(("on".to_string(), json!(on)));
    }
    if let Some(battery) = patch.battery {
        sensor.config.battery = battery;
        changed.push(("battery".to_string(), json!(battery)));
    }
    sensor.touch_etag();

    Ok(Json(crate::routes::success_envelope(
        &format!("/sensors/{id}/config"),
        &changed,
    )))
}
