use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::model::Group;
use crate::radio::{Destination, RadioTask, TaskKind};
use crate::server::appstate::AppState;

pub async fn list(
    State(state): State<AppState>,
    Path(_apikey): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let core = state.core.lock().await;
    let out: HashMap<String, Group> = core
        .registry
        .groups
        .iter()
        .map(|g| (g.id.clone(), g.clone()))
        .collect();
    Ok(Json(out))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path((_apikey, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let core = state.core.lock().await;
    let group = core
        .registry
        .group(&id)
        .ok_or_else(|| ApiError::NotFound(format!("/groups/{id}")))?;
    Ok(Json(group.clone()))
}

#[derive(Debug, Deserialize, Default)]
pub struct GroupUpdate {
    pub name: Option<String>,
}

pub async fn update(
    State(state): State<AppState>,
    Path((_apikey, id)): Path<(String, String)>,
    Json(patch): Json<GroupUpdate>,
) -> ApiResult<impl IntoResponse> {
    let mut core = state.core.lock().await;
    let group = core
        .registry
        .group_mut(&id)
        .ok_or_else(|| ApiError::NotFound(format!("/groups/{id}")))?;
    let mut changed = Vec::new();
    if let Some(name) = patch.name {
        group.name = name;
        changed.push(("name".to_string(), json!(group.name)));
    }
    if !changed.is_empty() {
        group.touch_etag();
    }
    Ok(Json(crate::routes::success_envelope(
        &format!("/groups/{id}"),
        &changed,
    )))
}

#[derive(Debug, Deserialize, Default)]
pub struct GroupAction {
    pub on: Option<bool>,
    pub bri: Option<u8>,
    pub scene: Option<String>,
}

/// spec §4.5 "group broadcast": a `/groups/<id>/action` PUT applies
/// on/off and brightness to the group record, then fans the same
/// command out as a `Destination::Group` `RadioTask` so every member
/// light actually receives it over the air.
pub async fn action(
    State(state): State<AppState>,
    Path((_apikey, id)): Path<(String, String)>,
    Json(patch): Json<GroupAction>,
) -> ApiResult<impl IntoResponse> {
    let mut core = state.core.lock().await;
    let group = core
        .registry
        .group_mut(&id)
        .ok_or_else(|| ApiError::NotFound(format!("/groups/{id}/action")))?;

    let dest = Destination::Group(group.address);
    let mut changed: Vec<(String, Value)> = Vec::new();
    let mut tasks = Vec::new();
    if let Some(on) = patch.on {
        group.on = on;
        changed.push(("on".to_string(), json!(on)));
        tasks.push(RadioTask::new(TaskKind::SetOnOff, dest, 0x0104, vec![u8::from(on)]));
    }
    if let Some(bri) = patch.bri {
        group.level = bri;
        changed.push(("bri".to_string(), json!(bri)));
        tasks.push(RadioTask::new(TaskKind::SetLevel, dest, 0x0104, vec![bri]));
    }
    if let Some(scene) = patch.scene {
        changed.push(("scene".to_string(), json!(scene)));
    }
    group.touch_etag();

    for task in tasks {
        core.pipeline.enqueue(task);
    }

    Ok(Json(crate::routes::success_envelope(
        &format!("/groups/{id}/action"),
        &changed,
    )))
}
