pub mod binding;
pub mod etag;
pub mod group;
pub mod ids;
pub mod light;
pub mod rule;
pub mod scene;
pub mod sensor;

pub use binding::{Binding, BindingAction, BindingTask, BindingTaskState, DstMode};
pub use group::{Group, GroupState};
pub use light::Light;
pub use rule::{Action, ActionMethod, Condition, ConditionOperator, Rule, RuleState, RuleStatus};
pub use scene::{LightSceneState, Scene};
pub use sensor::{Sensor, SensorConfig, SensorState, SensorType};

use serde::{Deserialize, Serialize};

#[derive(Copy, Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Xy {
    pub x: f64,
    pub y: f64,
}

impl Xy {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Copy, Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Hs,
    Xy,
    Ct,
}

/// Per-device-type pending-read bitset, generalized from the teacher's
/// preference for small inherent bitset types (`LightMode`-style enums)
/// into a manual flag set, since the read catalog (on/off, level,
/// color, groups, scenes, modelid, swbuildid, vendor, binding table) has
/// no natural single-variant representation.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PendingReads(u16);

impl PendingReads {
    pub const ON_OFF: Self = Self(1 << 0);
    pub const LEVEL: Self = Self(1 << 1);
    pub const COLOR: Self = Self(1 << 2);
    pub const GROUPS: Self = Self(1 << 3);
    pub const SCENES: Self = Self(1 << 4);
    pub const MODEL_ID: Self = Self(1 << 5);
    pub const SW_BUILD_ID: Self = Self(1 << 6);
    pub const VENDOR: Self = Self(1 << 7);
    pub const BINDING_TABLE: Self = Self(1 << 8);
    pub const SCENE_DETAILS: Self = Self(1 << 9);

    pub const NONE: Self = Self(0);
    pub const DEFAULT_SET: Self = Self(
        Self::ON_OFF.0
            | Self::LEVEL.0
            | Self::COLOR.0
            | Self::GROUPS.0
            | Self::SCENES.0
            | Self::MODEL_ID.0
            | Self::SW_BUILD_ID.0
            | Self::VENDOR.0
            | Self::BINDING_TABLE.0,
    );

    #[must_use]
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    pub fn insert(&mut self, flag: Self) {
        self.0 |= flag.0;
    }

    pub fn remove(&mut self, flag: Self) {
        self.0 &= !flag.0;
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for PendingReads {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
