//! Binding verification phase (spec §4.5): ensures a rule's trigger
//! sensors have attribute-report bindings installed, gated by queue
//! depth and a minimum re-verify delay. Two flavors of binding are
//! installed per rule: an attribute-report binding from each trigger
//! sensor back to the coordinator (so the gateway itself observes the
//! change), and, for any action the rule marks `ActionMethod::Bind`, a
//! direct sensor-to-destination binding that lets the mesh carry out
//! the action without a round trip through the gateway.

use crate::config::GatewayTuning;
use crate::model::{Action, ActionMethod, Binding, BindingAction, BindingTask, DstMode, Rule};
use crate::pipeline::Pipeline;
use crate::registry::NodeRegistry;
use crate::rules_engine::action::cluster_for_action;

const MAX_BINDING_QUEUE: usize = 16;
/// Coordinator's own network address; bindings to it are how attribute
/// reports reach this gateway.
const COORDINATOR_ADDRESS: u64 = 0x0000;

/// The ZCL cluster an attribute-report binding should carry for a
/// condition's leaf. Leaves with no cluster-backed attribute (flag,
/// status, on, reachable, battery, lastupdated, ...) aren't bound this
/// way at all.
fn cluster_for_leaf(leaf: &str) -> Option<u16> {
    match leaf {
        "buttonevent" => Some(0x0006),
        "illuminance" => Some(0x0400),
        "presence" => Some(0x0406),
        _ => None,
    }
}

/// Resolve a `Bind`-method action's address into a native binding
/// destination: a group's network address, or a light's ext/endpoint.
fn dst_binding_target(action: &Action, registry: &NodeRegistry) -> Option<(DstMode, u64, u8)> {
    if let Some(id) = action
        .address
        .strip_prefix("/groups/")
        .and_then(|rest| rest.strip_suffix("/action"))
    {
        let group = registry.group(id)?;
        return Some((DstMode::Group, u64::from(group.address), 0));
    }
    if let Some(id) = action
        .address
        .strip_prefix("/lights/")
        .and_then(|rest| rest.strip_suffix("/state"))
    {
        let light = registry.light(id)?;
        return Some((DstMode::ExtAddress, light.ext_addr, light.endpoint));
    }
    None
}

/// Build the binding tasks a rule's event sources still need, then
/// enqueue as many as fit.
///
/// `idle_total_ms` is the engine's running idle-loop clock, compared
/// against `rule.last_verify + tuning.max_verify_delay`.
pub fn verify_rule(
    rule: &mut Rule,
    registry: &NodeRegistry,
    pipeline: &mut Pipeline,
    tuning: &GatewayTuning,
    idle_total_ms: i64,
) -> usize {
    if pipeline.binding_queue.len() >= MAX_BINDING_QUEUE {
        return 0;
    }
    if rule.last_verify + tuning.max_verify_delay_ms as i64 >= idle_total_ms {
        return 0;
    }
    rule.last_verify = idle_total_ms;

    let mut installed = 0;
    for condition in &rule.conditions {
        let Some(sensor_id) = condition.sensor_id() else {
            continue;
        };
        let Some(sensor) = registry.sensor(sensor_id) else {
            continue;
        };
        if sensor.is_green_power() {
            continue;
        }
        let Some(endpoint) = sensor.endpoint else {
            continue;
        };
        let Some(cluster_id) = condition.leaf().and_then(cluster_for_leaf) else {
            continue;
        };
        let action = if sensor.config.on {
            BindingAction::Bind
        } else {
            BindingAction::Unbind
        };

        if pipeline.binding_queue.len() >= MAX_BINDING_QUEUE {
            break;
        }
        let binding = Binding {
            src_ext_addr: sensor.ext_addr,
            src_endpoint: endpoint,
            dst_mode: DstMode::ExtAddress,
            dst_address: COORDINATOR_ADDRESS,
            dst_endpoint: 0,
            cluster_id,
        };
        pipeline
            .binding_queue
            .push_back(BindingTask::new(binding, action, Some(sensor_id.to_string())));
        installed += 1;

        if action != BindingAction::Bind {
            continue;
        }
        for bind_action in rule.actions.iter().filter(|a| a.method == ActionMethod::Bind) {
            if pipeline.binding_queue.len() >= MAX_BINDING_QUEUE {
                break;
            }
            let Some((dst_mode, dst_address, dst_endpoint)) = dst_binding_target(bind_action, registry) else {
                continue;
            };
            let binding = Binding {
                src_ext_addr: sensor.ext_addr,
                src_endpoint: endpoint,
                dst_mode,
                dst_address,
                dst_endpoint,
                cluster_id: cluster_for_action(bind_action),
            };
            pipeline.binding_queue.push_back(BindingTask::new(
                binding,
                BindingAction::Bind,
                Some(sensor_id.to_string()),
            ));
            installed += 1;
        }
    }
    installed
}

/// Queue `Unbind` tasks for a deleted/disabled rule's bindings
/// (spec §4.6 "disable schedules an Unbind pass").
pub fn unbind_rule(rule: &Rule, registry: &NodeRegistry, pipeline: &mut Pipeline) {
    for condition in &rule.conditions {
        let Some(sensor_id) = condition.sensor_id() else {
            continue;
        };
        let Some(sensor) = registry.sensor(sensor_id) else {
            continue;
        };
        let Some(endpoint) = sensor.endpoint else {
            continue;
        };
        let Some(cluster_id) = condition.leaf().and_then(cluster_for_leaf) else {
            continue;
        };
        let binding = Binding {
            src_ext_addr: sensor.ext_addr,
            src_endpoint: endpoint,
            dst_mode: DstMode::ExtAddress,
            dst_address: COORDINATOR_ADDRESS,
            dst_endpoint: 0,
            cluster_id,
        };
        pipeline.binding_queue.push_back(BindingTask::new(
            binding,
            BindingAction::Unbind,
            Some(sensor_id.to_string()),
        ));

        for bind_action in rule.actions.iter().filter(|a| a.method == ActionMethod::Bind) {
            let Some((dst_mode, dst_address, dst_endpoint)) = dst_binding_target(bind_action, registry) else {
                continue;
            };
            let binding = Binding {
                src_ext_addr: sensor.ext_addr,
                src_endpoint: endpoint,
                dst_mode,
                dst_address,
                dst_endpoint,
                cluster_id: cluster_for_action(bind_action),
            };
            pipeline.binding_queue.push_back(BindingTask::new(
                binding,
                BindingAction::Unbind,
                Some(sensor_id.to_string()),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sensor::Fingerprint;
    use crate::model::{Action, ActionMethod, Condition, ConditionOperator, RuleStatus};
    use chrono::Utc;

    fn rule_with_sensor_condition(sensor_id: &str) -> Rule {
        Rule::new(
            "1".into(),
            "r".into(),
            "key".into(),
            RuleStatus::Enabled,
            0,
            vec![Condition {
                address: format!("/sensors/{sensor_id}/state/buttonevent"),
                operator: ConditionOperator::Eq,
                value: Some("1".into()),
            }],
            vec![Action {
                address: "/groups/1/action".into(),
                method: ActionMethod::Put,
                body: r#"{"on":true}"#.into(),
            }],
            Utc::now(),
        )
    }

    #[test]
    fn verify_installs_binding_for_trigger_sensor() {
        let mut registry = NodeRegistry::new();
        let fp = Fingerprint {
            endpoint: 2,
            device_id: 0x0000,
            profile_id: 0x0104,
            in_clusters: vec![0x0007],
            out_clusters: vec![0x0006],
        };
        let sensor = registry.admit_sensor(9, fp).unwrap();
        let sensor_id = sensor.id.clone();

        let mut rule = rule_with_sensor_condition(&sensor_id);
        let mut pipeline = Pipeline::new();
        let tuning = GatewayTuning::default();

        let installed = verify_rule(&mut rule, &registry, &mut pipeline, &tuning, 100_000);
        assert_eq!(installed, 1);
        assert_eq!(pipeline.binding_queue.len(), 1);
    }

    #[test]
    fn verify_respects_min_delay() {
        let mut registry = NodeRegistry::new();
        let fp = Fingerprint {
            endpoint: 2,
            device_id: 0x0000,
            profile_id: 0x0104,
            in_clusters: vec![],
            out_clusters: vec![0x0006],
        };
        let sensor = registry.admit_sensor(9, fp).unwrap();
        let sensor_id = sensor.id.clone();

        let mut rule = rule_with_sensor_condition(&sensor_id);
        rule.last_verify = 99_000;
        let mut pipeline = Pipeline::new();
        let tuning = GatewayTuning::default();

        let installed = verify_rule(&mut rule, &registry, &mut pipeline, &tuning, 100_000);
        assert_eq!(installed, 0);
    }

    #[test]
    fn verify_installs_dst_side_binding_for_bind_action() {
        let mut registry = NodeRegistry::new();
        let fp = Fingerprint {
            endpoint: 2,
            device_id: 0x0000,
            profile_id: 0x0104,
            in_clusters: vec![0x0007],
            out_clusters: vec![0x0006],
        };
        let sensor = registry.admit_sensor(9, fp).unwrap();
        let sensor_id = sensor.id.clone();
        registry.ensure_group(3);
        let group_id = registry.group_by_address(3).unwrap().id.clone();

        let mut rule = Rule::new(
            "1".into(),
            "r".into(),
            "key".into(),
            RuleStatus::Enabled,
            0,
            vec![Condition {
                address: format!("/sensors/{sensor_id}/state/buttonevent"),
                operator: ConditionOperator::Eq,
                value: Some("1".into()),
            }],
            vec![Action {
                address: format!("/groups/{group_id}/action"),
                method: ActionMethod::Bind,
                body: r#"{"on":true}"#.into(),
            }],
            Utc::now(),
        );
        let mut pipeline = Pipeline::new();
        let tuning = GatewayTuning::default();

        let installed = verify_rule(&mut rule, &registry, &mut pipeline, &tuning, 100_000);
        assert_eq!(installed, 2);
        let dst_task = pipeline
            .binding_queue
            .iter()
            .find(|t| t.binding.dst_mode == DstMode::Group)
            .unwrap();
        assert_eq!(dst_task.binding.dst_address, 3);
        assert_eq!(dst_task.action, BindingAction::Bind);
    }

    #[test]
    fn verify_unbinds_when_sensor_disabled() {
        let mut registry = NodeRegistry::new();
        let fp = Fingerprint {
            endpoint: 2,
            device_id: 0x0000,
            profile_id: 0x0104,
            in_clusters: vec![0x0007],
            out_clusters: vec![0x0006],
        };
        let sensor = registry.admit_sensor(9, fp).unwrap();
        sensor.config.on = false;
        let sensor_id = sensor.id.clone();

        let mut rule = rule_with_sensor_condition(&sensor_id);
        let mut pipeline = Pipeline::new();
        let tuning = GatewayTuning::default();

        let installed = verify_rule(&mut rule, &registry, &mut pipeline, &tuning, 100_000);
        assert_eq!(installed, 1);
        assert_eq!(pipeline.binding_queue[0].action, BindingAction::Unbind);
    }
}
