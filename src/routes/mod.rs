//! REST surface (spec §6): rules, groups, lights, sensors only — the
//! rest of the Hue-compatible API is out of scope.

pub mod groups;
pub mod lights;
pub mod rules;
pub mod sensors;

use axum::routing::{get, put};
use axum::Router;
use serde_json::{json, Value};

use crate::server::appstate::AppState;

/// `PUT`/`POST` success envelope (spec §6): a list of
/// `{"success": {"<address>": <value>}}` entries, one per changed
/// field.
#[must_use]
pub fn success_envelope(address_prefix: &str, changed: &[(String, Value)]) -> Vec<Value> {
    changed
        .iter()
        .map(|(field, value)| {
            json!({ "success": { format!("{address_prefix}/{field}"): value } })
        })
        .collect()
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rules", get(rules::list).post(rules::create))
        .route(
            "/rules/:id",
            get(rules::get_one).put(rules::update).delete(rules::delete),
        )
        .route("/groups", get(groups::list))
        .route(
            "/groups/:id",
            get(groups::get_one).put(groups::update),
        )
        .route("/groups/:id/action", put(groups::action))
        .route("/lights", get(lights::list))
        .route("/lights/:id", get(lights::get_one).put(lights::update))
        .route("/lights/:id/state", put(lights::set_state))
        .route("/sensors", get(sensors::list))
        .route("/sensors/:id", get(sensors::get_one).put(sensors::update))
        .route("/sensors/:id/state", put(sensors::set_state))
        .route("/sensors/:id/config", put(sensors::set_config))
}
