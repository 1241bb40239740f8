//! The Node Registry (spec §4.2): catalog of lights, sensors, groups,
//! scenes; lifecycle; fingerprints; reachability. Sole owner of all
//! entity state (spec §3 "Ownership and lifecycle").

use std::collections::{BTreeSet, HashMap};

use crate::model::sensor::Fingerprint;
use crate::model::{ids, Group, GroupState, Light, Sensor, SensorType};
use crate::radio::zcl::{GroupMembershipResponse, SceneMembershipResponse};

/// HA/ZLL profile ids.
pub const PROFILE_HA: u16 = 0x0104;
pub const PROFILE_ZLL: u16 = 0xC05E;

/// Device-id whitelist admitted as lights (spec §4.2 step 2): on/off,
/// dimmable, color, color-temperature lights, mains outlet, on/off
/// plug-in unit.
pub const LIGHT_DEVICE_IDS: &[u16] = &[
    0x0000, // on/off light
    0x0010, // on/off plug-in unit
    0x0100, // dimmable light
    0x0051, // smart plug
    0x0102, // color dimmable light
    0x010C, // extended color light
    0x010D, // color temperature light
];

/// ZLL "color controller" device id — admitted as a light only if both
/// a color and a level cluster are present (heuristic for the
/// vendor-specific 4-key switch, spec §4.2 step 2).
pub const ZLL_COLOR_CONTROLLER: u16 = 0x0800;

const CLUSTER_ON_OFF: u16 = 0x0006;
const CLUSTER_LEVEL: u16 = 0x0008;
const CLUSTER_COLOR: u16 = 0x0300;
const CLUSTER_SCENES: u16 = 0x0005;
const CLUSTER_ON_OFF_SWITCH_CONFIG: u16 = 0x0007;
const CLUSTER_OCCUPANCY: u16 = 0x0406;
const CLUSTER_ILLUMINANCE: u16 = 0x0400;

/// Device id `0x02` is the only green-power device admitted in the
/// current design (spec §4.2).
pub const GP_ON_OFF_SWITCH: u8 = 0x02;

#[derive(Debug, Clone, Default)]
pub struct NodeInfo {
    pub zombie: bool,
    pub active_endpoints: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct NodeRegistry {
    pub lights: Vec<Light>,
    pub sensors: Vec<Sensor>,
    pub groups: Vec<Group>,
    pub nodes: HashMap<u64, NodeInfo>,
}

impl NodeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(taken: impl Iterator<Item = String>) -> String {
        let set: BTreeSet<u32> = taken.filter_map(|s| s.parse().ok()).collect();
        ids::smallest_unused(&set).to_string()
    }

    // ---- lookups -----------------------------------------------------

    #[must_use]
    pub fn light(&self, id: &str) -> Option<&Light> {
        self.lights.iter().find(|l| l.id == id)
    }

    #[must_use]
    pub fn light_mut(&mut self, id: &str) -> Option<&mut Light> {
        self.lights.iter_mut().find(|l| l.id == id)
    }

    #[must_use]
    pub fn light_by_addr(&self, ext_addr: u64, endpoint: u8) -> Option<&Light> {
        self.lights
            .iter()
            .find(|l| l.ext_addr == ext_addr && l.endpoint == endpoint)
    }

    #[must_use]
    pub fn light_by_addr_mut(&mut self, ext_addr: u64, endpoint: u8) -> Option<&mut Light> {
        self.lights
            .iter_mut()
            .find(|l| l.ext_addr == ext_addr && l.endpoint == endpoint)
    }

    #[must_use]
    pub fn sensor(&self, id: &str) -> Option<&Sensor> {
        self.sensors.iter().find(|s| s.id == id)
    }

    #[must_use]
    pub fn sensor_mut(&mut self, id: &str) -> Option<&mut Sensor> {
        self.sensors.iter_mut().find(|s| s.id == id)
    }

    #[must_use]
    pub fn sensor_by_fingerprint(
        &self,
        ext_addr: u64,
        fingerprint: &Fingerprint,
        sensor_type: SensorType,
    ) -> Option<&Sensor> {
        self.sensors.iter().find(|s| {
            s.ext_addr == ext_addr
                && s.fingerprint.as_ref() == Some(fingerprint)
                && s.sensor_type == sensor_type
        })
    }

    #[must_use]
    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    #[must_use]
    pub fn group_mut(&mut self, id: &str) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.id == id)
    }

    #[must_use]
    pub fn group_by_address(&self, address: u16) -> Option<&Group> {
        self.groups.iter().find(|g| g.address == address)
    }

    #[must_use]
    pub fn group_by_address_mut(&mut self, address: u16) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.address == address)
    }

    // ---- node / reachability -----------------------------------------

    pub fn note_node_event(&mut self, ext_addr: u64, zombie: bool, active_endpoints: Vec<u8>) {
        let node = self.nodes.entry(ext_addr).or_default();
        node.zombie = zombie;
        node.active_endpoints = active_endpoints;
        self.recompute_reachability(ext_addr);
    }

    /// spec §4.4 "Reachability": a light is reachable iff the node is
    /// non-zombie and its endpoint is active; a sensor mirrors this,
    /// except green-power sensors which are always reachable.
    pub fn recompute_reachability(&mut self, ext_addr: u64) {
        let node = self.nodes.get(&ext_addr).cloned().unwrap_or_default();
        for light in self.lights.iter_mut().filter(|l| l.ext_addr == ext_addr) {
            light.reachable = !node.zombie && node.active_endpoints.contains(&light.endpoint);
        }
        for sensor in self.sensors.iter_mut().filter(|s| s.ext_addr == ext_addr) {
            sensor.config.reachable = sensor.is_green_power()
                || (!node.zombie
                    && sensor
                        .endpoint
                        .is_some_and(|ep| node.active_endpoints.contains(&ep)));
        }
    }

    // ---- admission -----------------------------------------------------

    /// spec §4.2 step 2: admit only devices in the `(profile_id,
    /// device_id)` whitelist; the ZLL color-controller heuristic needs
    /// both a color and level cluster present.
    #[must_use]
    pub fn is_light_admissible(profile_id: u16, device_id: u16, in_clusters: &[u16]) -> bool {
        if profile_id != PROFILE_HA && profile_id != PROFILE_ZLL {
            return false;
        }
        if device_id == ZLL_COLOR_CONTROLLER {
            return in_clusters.contains(&CLUSTER_COLOR) && in_clusters.contains(&CLUSTER_LEVEL);
        }
        LIGHT_DEVICE_IDS.contains(&device_id)
    }

    /// Admit or refresh a light discovered via a simple descriptor
    /// (spec §4.2 step 3).
    pub fn admit_light(
        &mut self,
        ext_addr: u64,
        endpoint: u8,
        profile_id: u16,
        device_id: u16,
        in_clusters: &[u16],
    ) -> Option<&mut Light> {
        if !Self::is_light_admissible(profile_id, device_id, in_clusters) {
            return None;
        }

        if self.light_by_addr(ext_addr, endpoint).is_none() {
            let id = Self::next_id(self.lights.iter().map(|l| l.id.clone()));
            let light = Light::new(id, ext_addr, endpoint, profile_id, device_id);
            self.lights.push(light);
        }

        let light = self.light_by_addr_mut(ext_addr, endpoint)?;
        light.reachable = true;
        light.ensure_unique_id();
        Some(light)
    }

    /// spec §4.2: classify a sensor fingerprint into a `SensorType`.
    #[must_use]
    pub fn classify_sensor_fingerprint(fingerprint: &Fingerprint) -> Option<SensorType> {
        if fingerprint.in_clusters.contains(&CLUSTER_OCCUPANCY) {
            return Some(SensorType::ZhaPresence);
        }
        if fingerprint.in_clusters.contains(&CLUSTER_ILLUMINANCE) {
            return Some(SensorType::ZhaLight);
        }
        let switch_like = fingerprint.in_clusters.contains(&CLUSTER_ON_OFF_SWITCH_CONFIG)
            || fingerprint.out_clusters.contains(&CLUSTER_ON_OFF)
            || fingerprint.out_clusters.contains(&CLUSTER_LEVEL)
            || fingerprint.out_clusters.contains(&CLUSTER_SCENES);
        if switch_like {
            return Some(SensorType::ZhaSwitch);
        }
        None
    }

    /// Admit a sensor discovered via a fingerprint. A single physical
    /// node may produce multiple sensor records, one per fingerprint
    /// (spec §4.2).
    pub fn admit_sensor(&mut self, ext_addr: u64, fingerprint: Fingerprint) -> Option<&mut Sensor> {
        let sensor_type = Self::classify_sensor_fingerprint(&fingerprint)?;
        if self
            .sensor_by_fingerprint(ext_addr, &fingerprint, sensor_type)
            .is_none()
        {
            let id = Self::next_id(self.sensors.iter().map(|s| s.id.clone()));
            self.sensors
                .push(Sensor::new(id, ext_addr, sensor_type, Some(fingerprint.clone())));
        }
        self.sensors.iter_mut().find(|s| {
            s.ext_addr == ext_addr && s.fingerprint.as_ref() == Some(&fingerprint)
        })
    }

    /// Green-power admission: keyed by `gpd_src_id`; only device id
    /// `0x02` accepted (spec §4.2).
    pub fn admit_green_power(&mut self, gpd_src_id: u32, device_id: u8) -> Option<&mut Sensor> {
        if device_id != GP_ON_OFF_SWITCH {
            return None;
        }
        let ext_addr = u64::from(gpd_src_id);
        if self
            .sensors
            .iter()
            .any(|s| s.ext_addr == ext_addr && s.sensor_type == SensorType::ZgpSwitch)
        {
            return self
                .sensors
                .iter_mut()
                .find(|s| s.ext_addr == ext_addr && s.sensor_type == SensorType::ZgpSwitch);
        }
        let id = Self::next_id(self.sensors.iter().map(|s| s.id.clone()));
        self.sensors
            .push(Sensor::new(id, ext_addr, SensorType::ZgpSwitch, None));
        self.sensors.last_mut()
    }

    pub fn ensure_group(&mut self, address: u16) -> &mut Group {
        if self.group_by_address(address).is_none() {
            let id = Self::next_id(self.groups.iter().map(|g| g.id.clone()));
            self.groups.push(Group::new(address, id));
        }
        self.group_by_address_mut(address).expect("just inserted")
    }

    /// spec §4.2 "Groups/Scenes discovery": reconcile a light's
    /// `GetGroupMembership` response against its local membership
    /// record. Returns the set of group addresses the light should now
    /// force-add (user-created groups it silently dropped) and the set
    /// it should mark `NotInGroup` (switch-authored groups that removed
    /// it deliberately).
    pub fn reconcile_group_membership(
        &mut self,
        light_id: &str,
        response: &GroupMembershipResponse,
        previously_in: &BTreeSet<u16>,
    ) -> GroupReconciliation {
        let mut result = GroupReconciliation::default();

        if let Some(light) = self.light_mut(light_id) {
            light.group_capacity = response.capacity;
            light.group_count = response.count;
        }

        for &addr in &response.groups {
            let group = self.ensure_group(addr);
            group.multi_device_ids.remove(light_id);
        }

        let reported: BTreeSet<u16> = response.groups.iter().copied().collect();
        for &addr in previously_in.difference(&reported) {
            let is_user_created = self
                .group_by_address(addr)
                .is_some_and(Group::is_user_created);
            if is_user_created {
                result.force_add.insert(addr);
            } else {
                result.mark_not_in_group.insert(addr);
            }
        }

        result
    }

    /// spec §4.2: fold a decoded `GetGroupMembership` response into the
    /// registry, taking the light's own previously-tracked membership
    /// as `previously_in` instead of requiring the caller to carry it,
    /// then updates that tracked set to match what the device just
    /// reported (plus any group a drift correction is about to force
    /// back on).
    pub fn apply_group_membership_response(
        &mut self,
        light_id: &str,
        response: &GroupMembershipResponse,
    ) -> GroupReconciliation {
        let previously_in = self
            .light(light_id)
            .map(|l| l.group_memberships.clone())
            .unwrap_or_default();
        let result = self.reconcile_group_membership(light_id, response, &previously_in);

        let reported: BTreeSet<u16> = response.groups.iter().copied().collect();
        if let Some(light) = self.light_mut(light_id) {
            light.group_memberships = reported.union(&result.force_add).copied().collect();
        }
        result
    }

    /// The lights currently known to belong to `group_address` (spec
    /// §4.5 group on/off propagation to member lights).
    #[must_use]
    pub fn lights_in_group(&self, group_address: u16) -> Vec<&Light> {
        self.lights
            .iter()
            .filter(|l| l.group_memberships.contains(&group_address))
            .collect()
    }

    pub fn lights_in_group_mut(&mut self, group_address: u16) -> impl Iterator<Item = &mut Light> {
        self.lights
            .iter_mut()
            .filter(move |l| l.group_memberships.contains(&group_address))
    }

    /// spec §4.2: each reported scene id is ensured present on the
    /// group (named `"Scene N"` by default) and marked pending
    /// `READ_SCENE_DETAILS` on the reporting light.
    pub fn reconcile_scene_membership(
        &mut self,
        response: &SceneMembershipResponse,
    ) -> Vec<u8> {
        let group = self.ensure_group(response.group);
        for &scene_id in &response.scenes {
            group.ensure_scene(scene_id).pending_view = true;
        }
        response.scenes.clone()
    }
}

#[derive(Debug, Default, Clone)]
pub struct GroupReconciliation {
    pub force_add: BTreeSet<u16>,
    pub mark_not_in_group: BTreeSet<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::zcl::GroupMembershipResponse;

    fn ha_fingerprint(endpoint: u8) -> Fingerprint {
        Fingerprint {
            endpoint,
            device_id: 0x0000,
            profile_id: PROFILE_HA,
            in_clusters: vec![CLUSTER_ON_OFF_SWITCH_CONFIG],
            out_clusters: vec![CLUSTER_ON_OFF],
        }
    }

    #[test]
    fn admits_whitelisted_light() {
        let mut reg = NodeRegistry::new();
        let light = reg
            .admit_light(1, 1, PROFILE_HA, 0x0100, &[])
            .expect("dimmable light should be admitted");
        assert_eq!(light.id, "1");
    }

    #[test]
    fn rejects_non_whitelisted_device() {
        let mut reg = NodeRegistry::new();
        assert!(reg.admit_light(1, 1, PROFILE_HA, 0xFFFF, &[]).is_none());
    }

    #[test]
    fn zll_color_controller_needs_color_and_level() {
        let mut reg = NodeRegistry::new();
        assert!(reg
            .admit_light(1, 1, PROFILE_ZLL, ZLL_COLOR_CONTROLLER, &[CLUSTER_COLOR])
            .is_none());
        assert!(reg
            .admit_light(1, 1, PROFILE_ZLL, ZLL_COLOR_CONTROLLER, &[CLUSTER_COLOR, CLUSTER_LEVEL])
            .is_some());
    }

    #[test]
    fn green_power_rejects_non_switch_device_id() {
        let mut reg = NodeRegistry::new();
        assert!(reg.admit_green_power(0x1234, 0x01).is_none());
        assert!(reg.admit_green_power(0x1234, GP_ON_OFF_SWITCH).is_some());
    }

    #[test]
    fn user_created_group_drift_forces_add() {
        let mut reg = NodeRegistry::new();
        reg.admit_light(1, 1, PROFILE_HA, 0x0100, &[]);
        reg.ensure_group(4); // no device_memberships: user-created

        let response = GroupMembershipResponse {
            capacity: 10,
            count: 0,
            groups: vec![],
        };
        let mut previously_in = BTreeSet::new();
        previously_in.insert(4);

        let result = reg.reconcile_group_membership("1", &response, &previously_in);
        assert!(result.force_add.contains(&4));
        assert!(result.mark_not_in_group.is_empty());
    }

    #[test]
    fn switch_authored_group_drift_marks_not_in_group() {
        let mut reg = NodeRegistry::new();
        reg.admit_light(1, 1, PROFILE_HA, 0x0100, &[]);
        reg.ensure_group(4).device_memberships.insert("5".to_string());

        let response = GroupMembershipResponse {
            capacity: 10,
            count: 0,
            groups: vec![],
        };
        let mut previously_in = BTreeSet::new();
        previously_in.insert(4);

        let result = reg.reconcile_group_membership("1", &response, &previously_in);
        assert!(result.mark_not_in_group.contains(&4));
        assert!(result.force_add.is_empty());
    }

    #[test]
    fn reachability_follows_node_zombie_and_active_endpoints() {
        let mut reg = NodeRegistry::new();
        reg.admit_light(1, 5, PROFILE_HA, 0x0100, &[]);
        reg.note_node_event(1, false, vec![5]);
        assert!(reg.light_by_addr(1, 5).unwrap().reachable);

        reg.note_node_event(1, true, vec![5]);
        assert!(!reg.light_by_addr(1, 5).unwrap().reachable);
    }

    #[test]
    fn green_power_sensor_always_reachable() {
        let mut reg = NodeRegistry::new();
        reg.admit_green_power(0xaa, GP_ON_OFF_SWITCH);
        reg.note_node_event(0xaa, true, vec![]);
        assert!(reg.sensors[0].config.reachable);
    }
}
