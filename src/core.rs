//! `Core` bundles every control-plane component behind one
//! `tokio::sync::Mutex` (spec §5 "Concurrency & Resource Model"):
//! there is exactly one logical writer, scheduled by the timer tasks
//! in `server::run`, generalized from the teacher's single
//! `Mutex<Resources>` held by `AppState`.

use std::time::Instant;

use serde_json::Value;

use crate::attr_cache::AttributeCache;
use crate::config::GatewayTuning;
use crate::error::{ApiError, ApiResult};
use crate::model::LightSceneState;
use crate::pipeline::Pipeline;
use crate::radio::{Destination, RadioTask, TaskKind};
use crate::registry::NodeRegistry;
use crate::rules_engine::action::RestExecutor;
use crate::rules_engine::RulesEngine;
use crate::sync::Synchronizer;

pub struct Core {
    pub registry: NodeRegistry,
    pub cache: AttributeCache,
    pub pipeline: Pipeline,
    pub synchronizer: Synchronizer,
    pub rules: RulesEngine,
    pub tuning: GatewayTuning,
    pub started_at: Instant,
    /// Monotonic idle-loop clock in milliseconds, advanced by the 1s
    /// idle tick; used for the rule binding-verification min-delay.
    pub idle_total_ms: i64,
}

impl Core {
    #[must_use]
    pub fn new(tuning: GatewayTuning) -> Self {
        Self {
            registry: NodeRegistry::new(),
            cache: AttributeCache::new(),
            pipeline: Pipeline::new(),
            synchronizer: Synchronizer::new(),
            rules: RulesEngine::new(),
            tuning,
            started_at: Instant::now(),
            idle_total_ms: 0,
        }
    }

    /// spec §4.6: delete marks the rule deleted and schedules an
    /// Unbind pass against its trigger sensors' bindings.
    pub fn delete_rule(&mut self, id: &str) -> ApiResult<()> {
        self.rules.delete_rule(id, &self.registry, &mut self.pipeline)
    }

    /// spec §4.6 "disable -> unbind -> re-enable" dance.
    pub fn set_rule_status(
        &mut self,
        id: &str,
        status: crate::model::RuleStatus,
    ) -> ApiResult<()> {
        self.rules.set_status(id, status, &self.registry, &mut self.pipeline)
    }
}

/// Applies a PUT body directly against registry state, the same
/// mutation a `routes::*` handler would have made, without a round
/// trip through HTTP (spec §4.5 "internal REST replay").
impl RestExecutor for Core {
    fn put(&mut self, address: &str, body: &str) -> ApiResult<()> {
        let value: Value = serde_json::from_str(body)?;

        if let Some(rest) = address.strip_prefix("/groups/") {
            if let Some((id, scene)) = rest.split_once("/scenes/") {
                let scene_id: u8 = scene
                    .parse()
                    .map_err(|_| ApiError::InvalidValue {
                        address: address.to_string(),
                        description: "scene id must be 0..255".to_string(),
                    })?;
                let group = self
                    .registry
                    .group_mut(id)
                    .ok_or_else(|| ApiError::NotFound(address.to_string()))?;
                let group_address = group.address;
                let scene_lights = group.scene(scene_id).map(|s| s.lights.clone());

                let mut payload = group_address.to_le_bytes().to_vec();
                payload.push(scene_id);
                self.pipeline.enqueue(RadioTask::new(
                    TaskKind::SceneRecall,
                    Destination::Group(group_address),
                    0x0104,
                    payload.clone(),
                ));

                // spec §4.5 reactive scene-recall flavor: walk the stored
                // per-light snapshot and reconcile each available light's
                // colorloop/on/level against it.
                if let Some(lights) = scene_lights {
                    let mut colorloop_deactivated = false;
                    for state in &lights {
                        if reconcile_light_against_scene(&mut self.registry, state) {
                            colorloop_deactivated = true;
                        }
                    }
                    if colorloop_deactivated {
                        self.pipeline.enqueue(RadioTask::new(
                            TaskKind::SceneRecall,
                            Destination::Group(group_address),
                            0x0104,
                            payload,
                        ));
                    }
                }
                return Ok(());
            }

            let (id, _) = rest.split_once('/').unwrap_or((rest, ""));
            let group = self
                .registry
                .group_mut(id)
                .ok_or_else(|| ApiError::NotFound(address.to_string()))?;
            let group_address = group.address;
            let was_on = group.on;
            let sets_on = value.get("on").and_then(Value::as_bool).is_some();
            apply_light_state(&value, &mut group.on, &mut group.level);
            let turned_on = group.on && !was_on;
            let mut killed_colorloop = false;
            if turned_on && group.color_loop_active {
                group.color_loop_active = false;
                killed_colorloop = true;
            }
            group.touch_etag();
            let on = group.on;
            let level = group.level;

            if sets_on {
                self.pipeline.enqueue(RadioTask::new(
                    TaskKind::SetOnOff,
                    Destination::Group(group_address),
                    0x0104,
                    vec![u8::from(on)],
                ));
            }

            // spec §4.5 reactive group on/off flavor: propagate to every
            // light currently tracked as a member and kill any colorloop
            // running on them too.
            for light in self.registry.lights_in_group_mut(group_address) {
                light.on = on;
                light.level = level;
                if turned_on && light.color_loop_active {
                    light.color_loop_active = false;
                    killed_colorloop = true;
                }
                light.touch_etag();
            }
            if killed_colorloop {
                self.pipeline.enqueue(RadioTask::new(
                    TaskKind::SetColor,
                    Destination::Group(group_address),
                    0x0104,
                    vec![0],
                ));
            }
            return Ok(());
        }

        if let Some(rest) = address.strip_prefix("/lights/") {
            let (id, _) = rest.split_once('/').unwrap_or((rest, ""));
            let light = self
                .registry
                .light_mut(id)
                .ok_or_else(|| ApiError::NotFound(address.to_string()))?;
            apply_light_state(&value, &mut light.on, &mut light.level);
            light.touch_etag();
            return Ok(());
        }

        Err(ApiError::NotHandled)
    }
}

/// Reconcile one light against its stored scene snapshot. Returns
/// `true` if the light's colorloop had to be killed (the caller then
/// re-recalls the scene so the device-side level/color still applies).
fn reconcile_light_against_scene(registry: &mut NodeRegistry, state: &LightSceneState) -> bool {
    let Some(light) = registry.light_mut(&state.lid) else {
        return false;
    };
    if !light.reachable {
        return false;
    }
    light.on = state.on;
    light.level = state.bri;
    light.color_x = (state.xy.x * 65535.0) as u16;
    light.color_y = (state.xy.y * 65535.0) as u16;
    light.color_mode = crate::model::ColorMode::Xy;
    light.color_loop_speed = state.colorloop_time;
    light.touch_etag();

    if light.color_loop_active && !state.colorloop_active {
        light.color_loop_active = false;
        return true;
    }
    light.color_loop_active = state.colorloop_active;
    false
}

fn apply_light_state(value: &Value, on: &mut bool, level: &mut u8) {
    if let Some(v) = value.get("on").and_then(Value::as_bool) {
        *on = v;
    }
    if let Some(v) = value.get("bri").and_then(Value::as_u64) {
        *level = v.min(255) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PROFILE_HA;

    #[test]
    fn group_on_propagates_to_member_lights_and_kills_colorloop() {
        let mut core = Core::new(GatewayTuning::default());
        core.registry.admit_light(1, 1, PROFILE_HA, 0x0100, &[]);
        let light_id = core.registry.light_by_addr(1, 1).unwrap().id.clone();
        core.registry.light_mut(&light_id).unwrap().color_loop_active = true;

        let group = core.registry.ensure_group(5);
        let group_id = group.id.clone();
        group.color_loop_active = true;
        core.registry
            .light_mut(&light_id)
            .unwrap()
            .group_memberships
            .insert(5);

        core.put(&format!("/groups/{group_id}"), r#"{"on":true}"#).unwrap();

        let light = core.registry.light(&light_id).unwrap();
        assert!(light.on);
        assert!(!light.color_loop_active);
        assert!(!core.registry.group(&group_id).unwrap().color_loop_active);
        assert_eq!(core.pipeline.pending_tasks(), 2); // on/off broadcast + colorloop kill
    }

    #[test]
    fn scene_recall_reconciles_member_lights_and_re_recalls_on_colorloop_kill() {
        let mut core = Core::new(GatewayTuning::default());
        core.registry.admit_light(1, 1, PROFILE_HA, 0x0100, &[]);
        let light_id = core.registry.light_by_addr(1, 1).unwrap().id.clone();
        core.registry.light_mut(&light_id).unwrap().color_loop_active = true;

        let group = core.registry.ensure_group(7);
        let group_id = group.id.clone();
        let scene = group.ensure_scene(10);
        scene.pending_view = false;
        scene.lights.push(LightSceneState {
            lid: light_id.clone(),
            on: true,
            bri: 200,
            xy: crate::model::Xy { x: 0.3, y: 0.3 },
            colorloop_active: false,
            colorloop_time: 0,
            transitiontime: 0,
        });

        core.put(&format!("/groups/{group_id}/scenes/10"), "{}").unwrap();

        let light = core.registry.light(&light_id).unwrap();
        assert!(light.on);
        assert_eq!(light.level, 200);
        assert!(!light.color_loop_active);
        // the colorloop-kill re-recall coalesces with the initial one:
        // same destination/cluster/payload, not yet dispatched.
        assert_eq!(core.pipeline.pending_tasks(), 1);
    }
}
