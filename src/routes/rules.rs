use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::model::{Action, Condition, Rule, RuleState, RuleStatus};
use crate::rules_engine::MAX_RULE_NAME_LENGTH;
use crate::server::appstate::AppState;

pub async fn list(
    State(state): State<AppState>,
    Path(_apikey): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let core = state.core.lock().await;
    let out: HashMap<String, Rule> = core
        .rules
        .rules
        .iter()
        .filter(|r| r.state != RuleState::Deleted)
        .map(|r| (r.id.clone(), r.clone()))
        .collect();
    Ok(Json(out))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path((_apikey, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let core = state.core.lock().await;
    let rule = core
        .rules
        .rule(&id)
        .filter(|r| r.state != RuleState::Deleted)
        .ok_or_else(|| ApiError::NotFound(format!("/rules/{id}")))?;
    Ok(Json(rule.clone()))
}

#[derive(Debug, Deserialize)]
pub struct NewRule {
    pub name: String,
    #[serde(default)]
    pub status: RuleStatus,
    #[serde(default = "default_trigger")]
    pub trigger_periodic: i64,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
}

fn default_trigger() -> i64 {
    0
}

pub async fn create(
    State(state): State<AppState>,
    Path(apikey): Path<String>,
    Json(new_rule): Json<NewRule>,
) -> ApiResult<impl IntoResponse> {
    let mut core = state.core.lock().await;
    let rule = core.rules.create_rule(
        new_rule.name,
        apikey,
        new_rule.status,
        new_rule.trigger_periodic,
        new_rule.conditions,
        new_rule.actions,
        &core.registry,
        Utc::now(),
    )?;
    Ok(Json(vec![json!({"success": {"id": rule.id}})]))
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub status: Option<RuleStatus>,
    pub conditions: Option<Vec<Condition>>,
    pub actions: Option<Vec<Action>>,
    pub periodic: Option<i64>,
}

/// `Json<RuleUpdate>` would bury a `deny_unknown_fields` rejection in
/// axum's generic `JsonRejection`; parse by hand so an unknown key maps
/// to the REST surface's `ParameterNotAvailable` error (spec §6).
fn parse_rule_update(body: &[u8]) -> ApiResult<RuleUpdate> {
    serde_json::from_slice(body).map_err(|e| {
        let msg = e.to_string();
        if msg.contains("unknown field") {
            ApiError::ParameterNotAvailable(msg)
        } else {
            ApiError::SerdeJson(e)
        }
    })
}

pub async fn update(
    State(state): State<AppState>,
    Path((_apikey, id)): Path<(String, String)>,
    body: axum::body::Bytes,
) -> ApiResult<impl IntoResponse> {
    let patch = parse_rule_update(&body)?;
    if patch.name.as_ref().is_some_and(|n| n.len() > MAX_RULE_NAME_LENGTH) {
        return Err(ApiError::InvalidValue {
            address: "name".to_string(),
            description: format!("name exceeds {MAX_RULE_NAME_LENGTH} characters"),
        });
    }
    let mut core = state.core.lock().await;
    let mut changed: Vec<(String, Value)> = Vec::new();

    let rewires_bindings = patch.conditions.is_some() || patch.actions.is_some();
    if rewires_bindings {
        core.set_rule_status(&id, crate::model::RuleStatus::Disabled)?;
    }

    {
        let rule = core
            .rules
            .rule_mut(&id)
            .ok_or_else(|| ApiError::NotFound(format!("/rules/{id}")))?;
        if let Some(name) = patch.name {
            rule.name = name;
            changed.push(("name".to_string(), json!(rule.name)));
        }
        if let Some(conditions) = patch.conditions {
            rule.conditions = conditions;
            changed.push(("conditions".to_string(), json!("updated")));
        }
        if let Some(actions) = patch.actions {
            rule.actions = actions;
            changed.push(("actions".to_string(), json!("updated")));
        }
        if let Some(periodic) = patch.periodic {
            rule.trigger_periodic = periodic;
            changed.push(("periodic".to_string(), json!(periodic)));
        }
        if !changed.is_empty() {
            rule.touch_etag();
        }
    }

    if let Some(status) = patch.status {
        core.set_rule_status(&id, status)?;
        changed.push(("status".to_string(), json!(status)));
    } else if rewires_bindings {
        core.set_rule_status(&id, crate::model::RuleStatus::Enabled)?;
    }

    Ok(Json(crate::routes::success_envelope(
        &format!("/rules/{id}"),
        &changed,
    )))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((_apikey, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let mut core = state.core.lock().await;
    core.delete_rule(&id)?;
    Ok(Json(vec![json!({"success": format!("/rules/{id} deleted")})]))
}
