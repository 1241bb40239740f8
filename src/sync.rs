//! The Synchronizer (spec §4.4): idle-timer driven stale-attribute
//! reads and attribute-report consumption, keeping the Attribute Cache,
//! Node Registry and REST-visible entity fields in lockstep.

use std::time::{Duration, Instant};

use crate::attr_cache::{AttrKey, AttrValue, AttributeCache, UpdateType};
use crate::config::GatewayTuning;
use crate::model::PendingReads;
use crate::radio::zcl::{decode_illuminance, parse_group_membership_response, parse_scene_membership_response};
use crate::radio::{DataIndication, Destination, RadioTask, TaskKind};
use crate::registry::NodeRegistry;

const CLUSTER_ON_OFF: u16 = 0x0006;
const CLUSTER_LEVEL: u16 = 0x0008;
const CLUSTER_ILLUMINANCE: u16 = 0x0400;
const CLUSTER_OCCUPANCY: u16 = 0x0406;
const CLUSTER_GROUPS: u16 = 0x0004;
const CLUSTER_SCENES: u16 = 0x0005;

const ATTR_ON_OFF: u16 = 0x0000;
const ATTR_CURRENT_LEVEL: u16 = 0x0000;
const ATTR_ILLUMINANCE: u16 = 0x0000;

/// spec §4.4 "binding table (if enabled via a manufacturer/model
/// whitelist — only known-cooperative devices)": an empty whitelist
/// means every manufacturer is trusted; a non-empty one restricts
/// binding-table reads to listed manufacturers only.
#[derive(Debug, Default)]
pub struct Synchronizer {
    pub cooperative_binding_manufacturers: Vec<String>,
}

impl Synchronizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn trusts_binding_table(&self, manufacturer: &str) -> bool {
        self.cooperative_binding_manufacturers.is_empty()
            || self
                .cooperative_binding_manufacturers
                .iter()
                .any(|m| m == manufacturer)
    }

    /// spec §4.4 "~1s idle timer": walk lights and sensors, enqueueing
    /// forced reads for attributes stale past the relevant limit. Stamps
    /// `timestamp_last_read_request` on every forced read so the cache's
    /// own half-window suppression (`needs_forced_read`) actually takes
    /// effect on the next tick, instead of re-requesting every second.
    pub fn idle_tick(
        &self,
        registry: &NodeRegistry,
        cache: &mut AttributeCache,
        tuning: &GatewayTuning,
        now: Instant,
    ) -> Vec<RadioTask> {
        let mut tasks = Vec::new();
        let read_limit = Duration::from_secs(tuning.idle_read_limit_secs);

        for light in &registry.lights {
            if !light.reachable {
                continue;
            }
            let key = AttrKey {
                ext_addr: light.ext_addr,
                cluster: CLUSTER_ON_OFF,
                attribute: ATTR_ON_OFF,
            };
            if cache.needs_forced_read(&key, read_limit, now) {
                cache.note_read_request(key, now);
                tasks.push(RadioTask::new(
                    TaskKind::ReadAttributes,
                    Destination::Unicast {
                        ext_addr: light.ext_addr,
                        endpoint: light.endpoint,
                    },
                    light.profile_id,
                    vec![0, 0],
                ));
            }
        }

        for sensor in &registry.sensors {
            if sensor.is_green_power() || !sensor.config.reachable {
                continue;
            }
            let Some(endpoint) = sensor.endpoint else {
                continue;
            };
            if sensor.sensor_type != crate::model::SensorType::ZhaLight {
                continue;
            }
            let key = AttrKey {
                ext_addr: sensor.ext_addr,
                cluster: CLUSTER_ILLUMINANCE,
                attribute: ATTR_ILLUMINANCE,
            };
            if cache.needs_forced_read(&key, read_limit, now) {
                cache.note_read_request(key, now);
                tasks.push(RadioTask::new(
                    TaskKind::ReadAttributes,
                    Destination::Unicast { ext_addr: sensor.ext_addr, endpoint },
                    0x0104,
                    vec![0, 0],
                ));
            }
        }

        tasks
    }

    /// spec §4.4 "~750ms attribute-processing timer": at most two ZCL
    /// operations issued per tick per entity, in on/off, level, color,
    /// groups, scenes, model-id, sw-build, vendor, binding-table order.
    pub fn attribute_processing_tick(
        &self,
        registry: &NodeRegistry,
        max_per_entity: usize,
    ) -> Vec<(String, RadioTask)> {
        let order = [
            PendingReads::ON_OFF,
            PendingReads::LEVEL,
            PendingReads::COLOR,
            PendingReads::GROUPS,
            PendingReads::SCENES,
            PendingReads::MODEL_ID,
            PendingReads::SW_BUILD_ID,
            PendingReads::VENDOR,
            PendingReads::BINDING_TABLE,
        ];
        let mut out = Vec::new();
        for light in &registry.lights {
            if !light.reachable {
                continue;
            }
            let mut issued = 0;
            for &flag in &order {
                if issued >= max_per_entity {
                    break;
                }
                if flag == PendingReads::BINDING_TABLE && !self.trusts_binding_table(&light.manufacturer) {
                    continue;
                }
                if light.pending_read_flags.contains(flag) {
                    out.push((
                        light.id.clone(),
                        read_task_for_flag(flag, light.ext_addr, light.endpoint, light.profile_id),
                    ));
                    issued += 1;
                }
            }
        }
        out
    }

    /// spec §4.4 "indication consumption": fold a `DataIndication` into
    /// the cache, refresh REST-visible fields, bump the etag. Groups
    /// (0x0004) and Scenes (0x0005) cluster indications carry
    /// `GetGroupMembership`/`GetSceneMembership` responses rather than
    /// attribute reports (spec §4.2); reconciling the former can yield
    /// `GroupAdd`/`GroupRemove` follow-up tasks, returned for the
    /// caller to enqueue.
    pub fn consume_indication(
        &self,
        registry: &mut NodeRegistry,
        cache: &mut AttributeCache,
        indication: &DataIndication,
        now: Instant,
    ) -> Vec<RadioTask> {
        if indication.cluster_id == CLUSTER_GROUPS {
            return self.consume_group_membership(registry, indication);
        }
        if indication.cluster_id == CLUSTER_SCENES {
            if let Some(response) = parse_scene_membership_response(&indication.payload) {
                registry.reconcile_scene_membership(&response);
            }
            return Vec::new();
        }

        let key = AttrKey {
            ext_addr: indication.src_ext_addr,
            cluster: indication.cluster_id,
            attribute: first_attribute_id(&indication.payload),
        };

        match indication.cluster_id {
            CLUSTER_ON_OFF => {
                if let Some(on) = indication.payload.last().map(|&b| b != 0) {
                    cache.set(key, AttrValue::Bool(on), UpdateType::ByReport, now);
                    if let Some(light) =
                        registry.light_by_addr_mut(indication.src_ext_addr, indication.src_endpoint)
                    {
                        light.on = on;
                        light.touch_etag();
                    }
                }
            }
            CLUSTER_LEVEL => {
                if let Some(&level) = indication.payload.last() {
                    cache.set(key, AttrValue::U8(level), UpdateType::ByReport, now);
                    if let Some(light) =
                        registry.light_by_addr_mut(indication.src_ext_addr, indication.src_endpoint)
                    {
                        light.level = level;
                        light.touch_etag();
                    }
                }
            }
            CLUSTER_ILLUMINANCE => {
                if indication.payload.len() >= 2 {
                    let raw = u16::from_le_bytes([indication.payload[0], indication.payload[1]]);
                    cache.set(key, AttrValue::U16(raw), UpdateType::ByReport, now);
                    if let Some(sensor) = registry
                        .sensors
                        .iter_mut()
                        .find(|s| s.ext_addr == indication.src_ext_addr)
                    {
                        if let Some(lux) = decode_illuminance(raw) {
                            sensor.state.lux = Some(lux.round() as u32);
                            sensor.state.lastupdated = Some(chrono::Utc::now());
                            sensor.touch_etag();
                        }
                    }
                }
            }
            CLUSTER_OCCUPANCY => {
                if let Some(&raw) = indication.payload.first() {
                    let presence = raw & 0x01 != 0;
                    cache.set(key, AttrValue::Bool(presence), UpdateType::ByReport, now);
                    if let Some(sensor) = registry
                        .sensors
                        .iter_mut()
                        .find(|s| s.ext_addr == indication.src_ext_addr)
                    {
                        sensor.state.presence = Some(presence);
                        sensor.state.lastupdated = Some(chrono::Utc::now());
                        sensor.touch_etag();
                    }
                }
            }
            _ => {}
        }
        Vec::new()
    }

    /// spec §4.2 group-membership drift: decode the response, fold it
    /// into the reporting light's tracked membership, and turn the
    /// resulting drift correction into `GroupAdd`/`GroupRemove` tasks
    /// addressed back at that light.
    fn consume_group_membership(&self, registry: &mut NodeRegistry, indication: &DataIndication) -> Vec<RadioTask> {
        let Some(response) = parse_group_membership_response(&indication.payload) else {
            return Vec::new();
        };
        let Some(light_id) = registry
            .light_by_addr(indication.src_ext_addr, indication.src_endpoint)
            .map(|l| l.id.clone())
        else {
            return Vec::new();
        };

        let result = registry.apply_group_membership_response(&light_id, &response);
        let dest = Destination::Unicast {
            ext_addr: indication.src_ext_addr,
            endpoint: indication.src_endpoint,
        };
        let mut tasks = Vec::new();
        for addr in result.force_add {
            let mut payload = addr.to_le_bytes().to_vec();
            payload.push(0); // empty group name
            tasks.push(RadioTask::new(TaskKind::GroupAdd, dest, indication.profile_id, payload));
        }
        for addr in result.mark_not_in_group {
            tasks.push(RadioTask::new(
                TaskKind::GroupRemove,
                dest,
                indication.profile_id,
                addr.to_le_bytes().to_vec(),
            ));
        }
        tasks
    }
}

fn first_attribute_id(payload: &[u8]) -> u16 {
    if payload.len() >= 2 {
        u16::from_le_bytes([payload[0], payload[1]])
    } else {
        ATTR_CURRENT_LEVEL
    }
}

fn read_task_for_flag(flag: PendingReads, ext_addr: u64, endpoint: u8, profile_id: u16) -> RadioTask {
    let destination = Destination::Unicast { ext_addr, endpoint };
    RadioTask::new(TaskKind::ReadAttributes, destination, profile_id, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{NodeRegistry, PROFILE_HA};

    #[test]
    fn idle_tick_reads_stale_light_on_off() {
        let mut registry = NodeRegistry::new();
        registry.admit_light(1, 1, PROFILE_HA, 0x0100, &[]);
        let mut cache = AttributeCache::new();
        let tuning = GatewayTuning::default();
        let sync = Synchronizer::new();
        let tasks = sync.idle_tick(&registry, &mut cache, &tuning, Instant::now());
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn idle_tick_skips_fresh_attribute() {
        let mut registry = NodeRegistry::new();
        registry.admit_light(1, 1, PROFILE_HA, 0x0100, &[]);
        let mut cache = AttributeCache::new();
        let now = Instant::now();
        cache.set(
            AttrKey { ext_addr: 1, cluster: CLUSTER_ON_OFF, attribute: 0 },
            AttrValue::Bool(true),
            UpdateType::ByReport,
            now,
        );
        let tuning = GatewayTuning::default();
        let sync = Synchronizer::new();
        let tasks = sync.idle_tick(&registry, &mut cache, &tuning, now);
        assert!(tasks.is_empty());
    }

    #[test]
    fn indication_updates_light_on_off_and_etag() {
        let mut registry = NodeRegistry::new();
        registry.admit_light(1, 1, PROFILE_HA, 0x0100, &[]);
        let etag_before = registry.light("1").unwrap().etag.clone();
        let mut cache = AttributeCache::new();
        let sync = Synchronizer::new();

        let indication = DataIndication {
            src_ext_addr: 1,
            src_endpoint: 1,
            profile_id: PROFILE_HA,
            cluster_id: CLUSTER_ON_OFF,
            payload: vec![0, 0, 1],
        };
        sync.consume_indication(&mut registry, &mut cache, &indication, Instant::now());

        let light = registry.light("1").unwrap();
        assert!(light.on);
        assert_ne!(light.etag, etag_before);
    }

    #[test]
    fn indication_decodes_illuminance_into_sensor_state() {
        use crate::model::sensor::Fingerprint;
        use crate::model::SensorType;

        let mut registry = NodeRegistry::new();
        let fp = Fingerprint {
            endpoint: 2,
            device_id: 0x0106,
            profile_id: PROFILE_HA,
            in_clusters: vec![CLUSTER_ILLUMINANCE],
            out_clusters: vec![],
        };
        registry.admit_sensor(2, fp);
        let mut cache = AttributeCache::new();
        let sync = Synchronizer::new();

        let indication = DataIndication {
            src_ext_addr: 2,
            src_endpoint: 2,
            profile_id: PROFILE_HA,
            cluster_id: CLUSTER_ILLUMINANCE,
            payload: 40000u16.to_le_bytes().to_vec(),
        };
        sync.consume_indication(&mut registry, &mut cache, &indication, Instant::now());

        let sensor = registry
            .sensors
            .iter()
            .find(|s| s.ext_addr == 2)
            .unwrap();
        assert!(sensor.state.lux.is_some());
    }

    #[test]
    fn group_membership_indication_force_re_adds_dropped_user_created_group() {
        let mut registry = NodeRegistry::new();
        registry.admit_light(1, 1, PROFILE_HA, 0x0100, &[]);
        let light_id = registry.light_by_addr(1, 1).unwrap().id.clone();
        registry.ensure_group(4); // user-created
        registry.light_mut(&light_id).unwrap().group_memberships.insert(4);

        let mut cache = AttributeCache::new();
        let sync = Synchronizer::new();
        let indication = DataIndication {
            src_ext_addr: 1,
            src_endpoint: 1,
            profile_id: PROFILE_HA,
            cluster_id: CLUSTER_GROUPS,
            payload: vec![10, 0], // capacity 10, count 0, no groups reported
        };
        let tasks = sync.consume_indication(&mut registry, &mut cache, &indication, Instant::now());

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind, TaskKind::GroupAdd);
        assert!(registry.light(&light_id).unwrap().group_memberships.contains(&4));
    }

    #[test]
    fn scene_membership_indication_marks_scenes_pending_view() {
        let mut registry = NodeRegistry::new();
        let mut cache = AttributeCache::new();
        let sync = Synchronizer::new();
        let indication = DataIndication {
            src_ext_addr: 1,
            src_endpoint: 1,
            profile_id: PROFILE_HA,
            cluster_id: CLUSTER_SCENES,
            payload: vec![0, 16, 5, 0, 2, 1, 2], // status 0, capacity 16, group 5, count 2, scenes [1,2]
        };
        let tasks = sync.consume_indication(&mut registry, &mut cache, &indication, Instant::now());

        assert!(tasks.is_empty());
        let group = registry.group_by_address(5).unwrap();
        assert!(group.scene(1).unwrap().pending_view);
        assert!(group.scene(2).unwrap().pending_view);
    }

    #[test]
    fn binding_table_read_withheld_for_untrusted_manufacturer() {
        let mut registry = NodeRegistry::new();
        registry.admit_light(1, 1, PROFILE_HA, 0x0100, &[]);
        registry.light_mut("1").unwrap().manufacturer = "Untrusted".to_string();

        let whitelisted = Synchronizer {
            cooperative_binding_manufacturers: vec!["ACME".to_string()],
        };
        let trusts_none = whitelisted.attribute_processing_tick(&registry, 9);

        registry.light_mut("1").unwrap().manufacturer = "ACME".to_string();
        let trusts_acme = whitelisted.attribute_processing_tick(&registry, 9);

        assert_eq!(trusts_acme.len(), trusts_none.len() + 1, "ACME should also get a binding-table read");
    }

    #[test]
    fn binding_table_read_allowed_when_whitelist_empty() {
        let mut registry = NodeRegistry::new();
        registry.admit_light(1, 1, PROFILE_HA, 0x0100, &[]);
        let sync = Synchronizer::new();
        let reads = sync.attribute_processing_tick(&registry, 9);
        assert_eq!(reads.len(), 9, "every default pending-read flag, including binding table, should be issued");
    }
}
