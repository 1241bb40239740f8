use serde::{Deserialize, Serialize};

use crate::model::Xy;

/// Per-light snapshot inside a scene (spec §3 "Scene").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightSceneState {
    pub lid: String,
    pub on: bool,
    pub bri: u8,
    pub xy: Xy,
    pub colorloop_active: bool,
    pub colorloop_time: u8,
    pub transitiontime: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    /// 0..255, group-scoped id.
    pub id: u8,
    pub group_address: u16,
    pub name: String,
    pub lights: Vec<LightSceneState>,
    /// set when a light pending `READ_SCENE_DETAILS` still needs a
    /// `ViewScene` round-trip before `lights` is trustworthy.
    pub pending_view: bool,
    /// deferred scene-delete set: lights that still report this scene
    /// after it was marked deleted locally (spec §4.2).
    pub remove_from_lights: Vec<String>,
}

impl Scene {
    #[must_use]
    pub fn new(id: u8, group_address: u16) -> Self {
        Self {
            id,
            group_address,
            name: format!("Scene {id}"),
            lights: Vec::new(),
            pending_view: true,
            remove_from_lights: Vec::new(),
        }
    }

    #[must_use]
    pub fn light_state(&self, lid: &str) -> Option<&LightSceneState> {
        self.lights.iter().find(|l| l.lid == lid)
    }
}
