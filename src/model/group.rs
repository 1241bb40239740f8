use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::scene::Scene;

#[derive(Copy, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupState {
    #[default]
    Normal,
    Deleted,
    /// Terminal marker: a switch-authored group superseded and ready
    /// to be purged from persistent storage (spec §4.6).
    DeleteFromDb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub address: u16,
    pub id: String,
    pub name: String,
    pub on: bool,
    pub level: u8,
    pub hue: u16,
    pub saturation: u8,
    pub color_x: u16,
    pub color_y: u16,
    pub color_temperature: u16,
    pub color_loop_active: bool,
    pub scenes: Vec<Scene>,
    /// sensor ids that authored this group (switch-created groups).
    pub device_memberships: BTreeSet<String>,
    /// sensor ids whose membership write is pending confirmation.
    pub multi_device_ids: BTreeSet<String>,
    pub state: GroupState,
    pub etag: String,
    pub last_send_time: i64,
}

impl Group {
    pub const BROADCAST_ADDRESS: u16 = 0;

    #[must_use]
    pub fn new(address: u16, id: String) -> Self {
        Self {
            name: format!("Group {id}"),
            address,
            id,
            on: false,
            level: 0,
            hue: 0,
            saturation: 0,
            color_x: 0,
            color_y: 0,
            color_temperature: 0,
            color_loop_active: false,
            scenes: Vec::new(),
            device_memberships: BTreeSet::new(),
            multi_device_ids: BTreeSet::new(),
            state: GroupState::Normal,
            etag: crate::model::etag::generate(),
            last_send_time: 0,
        }
    }

    /// A user-created group has no authoring sensors (spec §4.2
    /// group-membership drift rule).
    #[must_use]
    pub fn is_user_created(&self) -> bool {
        self.device_memberships.is_empty()
    }

    #[must_use]
    pub fn is_switch_authored(&self) -> bool {
        !self.device_memberships.is_empty()
    }

    pub fn touch_etag(&mut self) {
        self.etag = crate::model::etag::generate();
    }

    #[must_use]
    pub fn scene_mut(&mut self, id: u8) -> Option<&mut Scene> {
        self.scenes.iter_mut().find(|s| s.id == id)
    }

    #[must_use]
    pub fn scene(&self, id: u8) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == id)
    }

    pub fn ensure_scene(&mut self, id: u8) -> &mut Scene {
        if self.scene(id).is_none() {
            self.scenes.push(Scene::new(id, self.address));
        }
        self.scene_mut(id).expect("just inserted")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_created_group_has_no_memberships() {
        let g = Group::new(4, "4".into());
        assert!(g.is_user_created());
    }

    #[test]
    fn switch_authored_group_has_memberships() {
        let mut g = Group::new(4, "4".into());
        g.device_memberships.insert("5".to_string());
        assert!(g.is_switch_authored());
    }

    #[test]
    fn ensure_scene_creates_once() {
        let mut g = Group::new(3, "3".into());
        g.ensure_scene(10);
        g.ensure_scene(10);
        assert_eq!(g.scenes.len(), 1);
        assert_eq!(g.scenes[0].name, "Scene 10");
    }
}
