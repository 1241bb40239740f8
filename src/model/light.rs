use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{ColorMode, PendingReads, Xy};

/// A light entity as held by the Node Registry (spec §3 "Light").
/// Never removed once discovered; `reachable` toggles instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Light {
    pub id: String,
    pub ext_addr: u64,
    pub endpoint: u8,
    pub profile_id: u16,
    pub device_id: u16,
    pub manufacturer: String,
    pub model: String,
    pub sw_build: String,
    pub unique_id: String,

    pub on: bool,
    pub level: u8,
    pub hue: u16,
    pub enhanced_hue: u16,
    pub saturation: u8,
    pub color_x: u16,
    pub color_y: u16,
    pub color_temperature: u16,
    pub color_mode: ColorMode,
    pub color_loop_active: bool,
    pub color_loop_speed: u8,

    pub reachable: bool,
    pub etag: String,

    pub group_capacity: u8,
    pub group_count: u8,
    pub scene_capacity: u8,
    /// Per-group scene count, keyed by group address.
    pub scene_count: std::collections::BTreeMap<u16, u8>,
    /// Group addresses this light is currently known to belong to, per
    /// the last `GetGroupMembership` response (spec §4.2). Drives the
    /// group on/off propagation to member lights.
    pub group_memberships: BTreeSet<u16>,

    pub last_read: i64,
    pub last_attribute_report_bind: i64,
    #[serde(skip, default)]
    pub pending_read_flags: PendingReads,
}

impl Light {
    #[must_use]
    pub fn new(id: String, ext_addr: u64, endpoint: u8, profile_id: u16, device_id: u16) -> Self {
        Self {
            unique_id: format_unique_id(ext_addr, endpoint),
            id,
            ext_addr,
            endpoint,
            profile_id,
            device_id,
            manufacturer: String::new(),
            model: String::new(),
            sw_build: String::new(),
            on: false,
            level: 0,
            hue: 0,
            enhanced_hue: 0,
            saturation: 0,
            color_x: 0,
            color_y: 0,
            color_temperature: 0,
            color_mode: ColorMode::Xy,
            color_loop_active: false,
            color_loop_speed: 15,
            reachable: true,
            etag: crate::model::etag::generate(),
            group_capacity: 0,
            group_count: 0,
            scene_capacity: 0,
            scene_count: std::collections::BTreeMap::new(),
            group_memberships: BTreeSet::new(),
            last_read: 0,
            last_attribute_report_bind: 0,
            pending_read_flags: PendingReads::DEFAULT_SET,
        }
    }

    /// Invariant (spec §3 + §8 property 1): capacity and count stay
    /// within `[0,255]`; callers clamp before calling this.
    pub fn apply_group_delta(&mut self, delta: i16, endpoint_count: u8) {
        let new_count = i32::from(self.group_count) + i32::from(delta);
        self.group_count = new_count.clamp(0, 255) as u8;

        let cap_delta = i32::from(delta) * i32::from(endpoint_count);
        let new_cap = i32::from(self.group_capacity) - cap_delta;
        self.group_capacity = new_cap.clamp(0, 255) as u8;
    }

    /// Rewrite the unique id if it is missing or not in the stable
    /// `mac-endpoint` format (spec §3 invariant).
    pub fn ensure_unique_id(&mut self) {
        let expected = format_unique_id(self.ext_addr, self.endpoint);
        if self.unique_id != expected {
            self.unique_id = expected;
        }
    }

    pub fn touch_etag(&mut self) {
        self.etag = crate::model::etag::generate();
    }
}

#[must_use]
pub fn format_unique_id(ext_addr: u64, endpoint: u8) -> String {
    let bytes = ext_addr.to_be_bytes();
    let mac = bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":");
    format!("{mac}-{endpoint:02x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_id_format_is_stable() {
        assert_eq!(
            format_unique_id(0x0017_880c_1234_5678, 0x0b),
            "00:17:88:0c:12:34:56:78-0b"
        );
    }

    #[test]
    fn group_delta_clamps_to_bounds() {
        let mut light = Light::new("1".into(), 1, 1, 0x0104, 0x0100);
        light.group_capacity = 2;
        light.group_count = 0;
        light.apply_group_delta(1, 3);
        assert_eq!(light.group_count, 1);
        assert_eq!(light.group_capacity, 0); // 2 - 1*3 clamps at 0

        light.apply_group_delta(-1, 3);
        assert_eq!(light.group_count, 0);
        assert_eq!(light.group_capacity, 3);
    }

    #[test]
    fn ensure_unique_id_rewrites_legacy_format() {
        let mut light = Light::new("1".into(), 1, 1, 0x0104, 0x0100);
        light.unique_id = "legacy-format".to_string();
        light.ensure_unique_id();
        assert_eq!(light.unique_id, format_unique_id(1, 1));
    }
}
