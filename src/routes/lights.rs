use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::model::Light;
use crate::radio::{Destination, RadioTask, TaskKind};
use crate::server::appstate::AppState;

pub async fn list(
    State(state): State<AppState>,
    Path(_apikey): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let core = state.core.lock().await;
    let out: HashMap<String, Light> = core
        .registry
        .lights
        .iter()
        .map(|l| (l.id.clone(), l.clone()))
        .collect();
    Ok(Json(out))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path((_apikey, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let core = state.core.lock().await;
    let light = core
        .registry
        .light(&id)
        .ok_or_else(|| ApiError::NotFound(format!("/lights/{id}")))?;
    Ok(Json(light.clone()))
}

#[derive(Debug, Deserialize, Default)]
pub struct LightUpdate {
    pub name: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    Path((_apikey, id)): Path<(String, String)>,
    Json(patch): Json<LightUpdate>,
) -> ApiResult<impl IntoResponse> {
    let mut core = state.core.lock().await;
    let light = core
        .registry
        .light_mut(&id)
        .ok_or_else(|| ApiError::NotFound(format!("/lights/{id}")))?;
    let mut changed = Vec::new();
    if let Some(name) = patch.name {
        light.model = name;
        changed.push(("name".to_string(), json!(light.model)));
    }
    if !changed.is_empty() {
        light.touch_etag();
    }
    Ok(Json(crate::routes::success_envelope(
        &format!("/lights/{id}"),
        &changed,
    )))
}

#[derive(Debug, Deserialize, Default)]
pub struct LightStateUpdate {
    pub on: Option<bool>,
    pub bri: Option<u8>,
    pub xy: Option<[f64; 2]>,
    pub ct: Option<u16>,
}

/// spec §4.5 "internal REST replay" writes land here the same as a
/// direct HTTP `PUT`; both paths also fan the command out as a
/// unicast `RadioTask` so the light actually receives it over the air.
pub async fn set_state(
    State(state): State<AppState>,
    Path((_apikey, id)): Path<(String, String)>,
    Json(patch): Json<LightStateUpdate>,
) -> ApiResult<impl IntoResponse> {
    let mut core = state.core.lock().await;
    let light = core
        .registry
        .light_mut(&id)
        .ok_or_else(|| ApiError::NotFound(format!("/lights/{id}/state")))?;

    let dest = Destination::Unicast { ext_addr: light.ext_addr, endpoint: light.endpoint };
    let profile_id = light.profile_id;

    let mut changed: Vec<(String, Value)> = Vec::new();
    let mut tasks = Vec::new();
    if let Some(on) = patch.on {
        light.on = on;
        changed.push(("on".to_string(), json!(on)));
        tasks.push(RadioTask::new(TaskKind::SetOnOff, dest, profile_id, vec![u8::from(on)]));
    }
    if let Some(bri) = patch.bri {
        light.level = bri;
        changed.push(("bri".to_string(), json!(bri)));
        tasks.push(RadioTask::new(TaskKind::SetLevel, dest, profile_id, vec![bri]));
    }
    if let Some([x, y]) = patch.xy {
        light.color_x = (x * 65535.0) as u16;
        light.color_y = (y * 65535.0) as u16;
        light.color_mode = crate::model::ColorMode::Xy;
        changed.push(("xy".to_string(), json!([x, y])));
        let mut payload = light.color_x.to_le_bytes().to_vec();
        payload.extend_from_slice(&light.color_y.to_le_bytes());
        tasks.push(RadioTask::new(TaskKind::SetColor, dest, profile_id, payload));
    }
    if let Some(ct) = patch.ct {
        light.color_temperature = ct;
        light.color_mode = crate::model::ColorMode::Ct;
        changed.push(("ct".to_string(), json!(ct)));
        tasks.push(RadioTask::new(TaskKind::SetColor, dest, profile_id, ct.to_le_bytes().to_vec()));
    }
    if !changed.is_empty() {
        light.touch_etag();
    }

    for task in tasks {
        core.pipeline.enqueue(task);
    }

    Ok(Json(crate::routes::success_envelope(
        &format!("/lights/{id}/state"),
        &changed,
    )))
}
