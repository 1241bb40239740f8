//! Condition evaluation (spec §4.5 / §6 "Condition validation").

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::attr_cache::{AttrKey, AttributeCache};
use crate::model::{Condition, ConditionOperator};
use crate::registry::NodeRegistry;

const CLUSTER_ILLUMINANCE: u16 = 0x0400;
const CLUSTER_OCCUPANCY: u16 = 0x0406;

/// Everything a condition's leaf attribute can resolve to.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Num(f64),
    Text(String),
}

impl Value {
    fn parse_like(&self, text: &str) -> Option<Self> {
        match self {
            Self::Bool(_) => text.parse::<bool>().ok().map(Self::Bool),
            Self::Num(_) => text.parse::<f64>().ok().map(Self::Num),
            Self::Text(_) => Some(Self::Text(text.to_string())),
        }
    }
}

/// Resolve `/sensors/<id>/state/<leaf>` or `/sensors/<id>/config/<leaf>`
/// against the registry's current sensor state.
#[must_use]
pub fn resolve(registry: &NodeRegistry, condition: &Condition) -> Option<Value> {
    let sensor_id = condition.sensor_id()?;
    let sensor = registry.sensor(sensor_id)?;
    let leaf = condition.leaf()?;
    match leaf {
        "buttonevent" => sensor.state.buttonevent.map(|v| Value::Num(f64::from(v))),
        "presence" => sensor.state.presence.map(Value::Bool),
        "flag" => sensor.state.flag.map(Value::Bool),
        "status" => sensor.state.status.map(|v| Value::Num(f64::from(v))),
        "daylight" => sensor.state.daylight.map(Value::Bool),
        "illuminance" => sensor.state.lux.map(|v| Value::Num(f64::from(v))),
        "on" => Some(Value::Bool(sensor.config.on)),
        "reachable" => Some(Value::Bool(sensor.config.reachable)),
        "battery" => Some(Value::Num(f64::from(sensor.config.battery))),
        "lastupdated" => sensor
            .state
            .lastupdated
            .map(|t| Value::Text(t.to_rfc3339())),
        _ => None,
    }
}

#[must_use]
fn changed_since(registry: &NodeRegistry, condition: &Condition, since: DateTime<Utc>) -> bool {
    registry
        .sensor(condition.sensor_id().unwrap_or_default())
        .and_then(|s| s.state.lastupdated)
        .is_some_and(|t| t > since)
}

/// The Attribute Cache key backing a condition's leaf, for the leaves
/// that are actually populated via `Synchronizer::consume_indication`
/// (spec §4.2) rather than set directly on sensor state. Conditions on
/// any other leaf (buttonevent, flag, on, reachable, ...) have no
/// cache-backed freshness notion and are always considered fresh.
fn attr_key_for_condition(registry: &NodeRegistry, condition: &Condition) -> Option<AttrKey> {
    let sensor = registry.sensor(condition.sensor_id()?)?;
    let cluster = match condition.leaf()? {
        "illuminance" => CLUSTER_ILLUMINANCE,
        "presence" => CLUSTER_OCCUPANCY,
        _ => return None,
    };
    Some(AttrKey { ext_addr: sensor.ext_addr, cluster, attribute: 0x0000 })
}

/// spec §6 "condition validation": a condition referencing a known
/// sensor must name a leaf that sensor type actually exposes. A
/// condition on an unknown sensor id can't be checked against a type
/// catalog and is left to fail resolution at evaluation time instead.
#[must_use]
pub fn attribute_is_valid(registry: &NodeRegistry, condition: &Condition) -> bool {
    let Some(sensor_id) = condition.sensor_id() else {
        return true;
    };
    let Some(leaf) = condition.leaf() else {
        return false;
    };
    match registry.sensor(sensor_id) {
        Some(sensor) => sensor.sensor_type.valid_attributes().contains(&leaf),
        None => true,
    }
}

/// spec §4.5 bullet 1 / §4.1: a periodic (and event-driven) condition
/// on a cache-backed attribute must not fire against a stale reading.
#[must_use]
fn is_attribute_fresh(
    registry: &NodeRegistry,
    cache: &AttributeCache,
    condition: &Condition,
    max_age: Duration,
    now: Instant,
) -> bool {
    match attr_key_for_condition(registry, condition) {
        Some(key) => cache.is_fresh(&key, max_age, now),
        None => true,
    }
}

/// Evaluate one condition. `since` bounds `dx` ("just changed")
/// semantics — typically the engine's previous tick time. `max_age`/
/// `now` bound the attribute-freshness check.
#[must_use]
pub fn evaluate(
    registry: &NodeRegistry,
    cache: &AttributeCache,
    condition: &Condition,
    since: DateTime<Utc>,
    max_age: Duration,
    now: Instant,
) -> bool {
    if condition.operator == ConditionOperator::Dx {
        return changed_since(registry, condition, since);
    }
    if !is_attribute_fresh(registry, cache, condition, max_age, now) {
        return false;
    }

    let Some(current) = resolve(registry, condition) else {
        return false;
    };
    let Some(expected) = condition.value.as_deref().and_then(|v| current.parse_like(v)) else {
        return false;
    };

    match (condition.operator, &current, &expected) {
        (ConditionOperator::Eq, a, b) => a == b,
        (ConditionOperator::Lt, Value::Num(a), Value::Num(b)) => a < b,
        (ConditionOperator::Gt, Value::Num(a), Value::Num(b)) => a > b,
        _ => false,
    }
}

/// All conditions must hold (spec §4.5: rules AND their conditions).
#[must_use]
pub fn all_match(
    registry: &NodeRegistry,
    cache: &AttributeCache,
    conditions: &[Condition],
    since: DateTime<Utc>,
    max_age: Duration,
    now: Instant,
) -> bool {
    conditions
        .iter()
        .all(|c| evaluate(registry, cache, c, since, max_age, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sensor::Fingerprint;
    use crate::model::SensorType;

    const MAX_AGE: Duration = Duration::from_secs(15);

    fn registry_with_sensor() -> (NodeRegistry, AttributeCache, String, Instant) {
        let mut registry = NodeRegistry::new();
        let fp = Fingerprint {
            endpoint: 1,
            device_id: 0x0106,
            profile_id: 0x0104,
            in_clusters: vec![0x0400],
            out_clusters: vec![],
        };
        let sensor = registry.admit_sensor(1, fp).unwrap();
        sensor.state.lux = Some(500);
        let id = sensor.id.clone();

        let now = Instant::now();
        let mut cache = AttributeCache::new();
        cache.set(
            AttrKey { ext_addr: 1, cluster: CLUSTER_ILLUMINANCE, attribute: 0 },
            crate::attr_cache::AttrValue::U16(40000),
            crate::attr_cache::UpdateType::ByReport,
            now,
        );
        (registry, cache, id, now)
    }

    #[test]
    fn gt_condition_on_illuminance() {
        let (registry, cache, id, now) = registry_with_sensor();
        let cond = Condition {
            address: format!("/sensors/{id}/state/illuminance"),
            operator: ConditionOperator::Gt,
            value: Some("100".to_string()),
        };
        assert!(evaluate(&registry, &cache, &cond, Utc::now(), MAX_AGE, now));
    }

    #[test]
    fn lt_condition_false_when_above_threshold() {
        let (registry, cache, id, now) = registry_with_sensor();
        let cond = Condition {
            address: format!("/sensors/{id}/state/illuminance"),
            operator: ConditionOperator::Lt,
            value: Some("100".to_string()),
        };
        assert!(!evaluate(&registry, &cache, &cond, Utc::now(), MAX_AGE, now));
    }

    #[test]
    fn stale_illuminance_condition_does_not_fire() {
        let (registry, cache, id, now) = registry_with_sensor();
        let cond = Condition {
            address: format!("/sensors/{id}/state/illuminance"),
            operator: ConditionOperator::Gt,
            value: Some("100".to_string()),
        };
        let much_later = now + Duration::from_secs(60);
        assert!(!evaluate(&registry, &cache, &cond, Utc::now(), MAX_AGE, much_later));
    }

    #[test]
    fn dx_fires_only_after_since() {
        let (mut registry, cache, id, now) = registry_with_sensor();
        let before = Utc::now() - chrono::Duration::seconds(10);
        let cond = Condition {
            address: format!("/sensors/{id}/state/lastupdated"),
            operator: ConditionOperator::Dx,
            value: None,
        };
        assert!(!evaluate(&registry, &cache, &cond, Utc::now(), MAX_AGE, now));

        registry.sensor_mut(&id).unwrap().state.lastupdated = Some(Utc::now());
        assert!(evaluate(&registry, &cache, &cond, before, MAX_AGE, now));
    }
}
