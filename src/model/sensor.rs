use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub endpoint: u8,
    pub device_id: u16,
    pub profile_id: u16,
    pub in_clusters: Vec<u16>,
    pub out_clusters: Vec<u16>,
}

#[derive(Copy, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum SensorType {
    ZgpSwitch,
    ZhaSwitch,
    ZhaLight,
    ZhaPresence,
    ClipGenericFlag,
    ClipGenericStatus,
    DaylightSensor,
}

impl SensorType {
    /// The condition-address catalog a sensor type admits, keyed by the
    /// leaf attribute name (spec §6 "Condition validation").
    #[must_use]
    pub fn valid_attributes(self) -> &'static [&'static str] {
        match self {
            Self::ZgpSwitch => &["buttonevent", "reachable", "on", "battery", "lastupdated"],
            Self::ZhaSwitch => &["buttonevent", "reachable", "on", "battery", "lastupdated"],
            Self::ZhaLight => &["illuminance", "reachable", "on", "battery", "lastupdated"],
            Self::ZhaPresence => &["presence", "reachable", "on", "battery", "lastupdated"],
            Self::ClipGenericFlag => &["flag", "reachable", "on", "battery", "lastupdated"],
            Self::ClipGenericStatus => &["status", "reachable", "on", "battery", "lastupdated"],
            Self::DaylightSensor => &[
                "daylight",
                "long",
                "lat",
                "sunriseoffset",
                "sunsetoffset",
                "reachable",
                "on",
                "battery",
                "lastupdated",
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SensorConfig {
    pub reachable: bool,
    pub on: bool,
    /// 0..100, or 255 meaning "unknown".
    pub battery: u8,
    pub duration: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SensorState {
    pub lastupdated: Option<DateTime<Utc>>,
    pub buttonevent: Option<u32>,
    pub lux: Option<u32>,
    pub presence: Option<bool>,
    pub flag: Option<bool>,
    pub status: Option<i32>,
    pub daylight: Option<bool>,
}

#[derive(Copy, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeletedState {
    #[default]
    Normal,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sensor {
    pub id: String,
    pub ext_addr: u64,
    pub endpoint: Option<u8>,
    pub fingerprint: Option<Fingerprint>,
    pub sensor_type: SensorType,
    pub manufacturer: String,
    pub model: String,
    pub sw_version: String,
    pub config: SensorConfig,
    pub state: SensorState,
    pub state_cluster_values: BTreeMap<u16, u16>,
    pub deleted_state: DeletedState,
    pub etag: String,
}

impl Sensor {
    #[must_use]
    pub fn new(id: String, ext_addr: u64, sensor_type: SensorType, fingerprint: Option<Fingerprint>) -> Self {
        let endpoint = fingerprint.as_ref().map(|f| f.endpoint);
        Self {
            id,
            ext_addr,
            endpoint,
            fingerprint,
            sensor_type,
            manufacturer: String::new(),
            model: String::new(),
            sw_version: String::new(),
            config: SensorConfig {
                reachable: true,
                on: true,
                battery: 255,
                duration: 0,
            },
            state: SensorState::default(),
            state_cluster_values: BTreeMap::new(),
            deleted_state: DeletedState::Normal,
            etag: crate::model::etag::generate(),
        }
    }

    /// spec §3 invariant: green-power (endpoint-less) sensors are
    /// always reachable; otherwise reachability follows the node.
    #[must_use]
    pub const fn is_green_power(&self) -> bool {
        self.fingerprint.is_none()
    }

    pub fn touch_etag(&mut self) {
        self.etag = crate::model::etag::generate();
    }

    pub fn set_button_event(&mut self, value: u32, now: DateTime<Utc>) {
        self.state.buttonevent = Some(value);
        self.state.lastupdated = Some(now);
        self.touch_etag();
    }
}
