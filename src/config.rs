use std::net::Ipv4Addr;
use std::time::Duration;

use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub name: String,
    pub ipaddress: Ipv4Addr,
    pub http_port: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name: "meshgate".to_string(),
            ipaddress: Ipv4Addr::UNSPECIFIED,
            http_port: 8080,
        }
    }
}

/// Gateway-wide tuning knobs named throughout spec §4 and §9. Defaults
/// match the values the spec calls out as the implementation defaults.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayTuning {
    /// Minimum interval between two messages to the same group address.
    pub group_send_delay_ms: u64,
    /// Maximum number of pending group-membership/scene tasks allowed
    /// in flight before the group-task tick backs off.
    pub max_group_tasks: usize,
    /// Attribute freshness window used by the periodic rule evaluator.
    pub max_rule_attr_age_ms: u64,
    /// Seconds of REST-write inactivity before the idle loop starts
    /// walking lights/sensors for stale reads.
    pub idle_user_limit_secs: u64,
    /// How stale `last_read` must be before a device is re-queued.
    pub idle_read_limit_secs: u64,
    /// How stale `last_attribute_report_bind` must be before bindings
    /// are reinstalled.
    pub idle_attr_report_bind_limit_secs: u64,
    /// Minimum spacing between binding-verification passes for a rule.
    pub max_verify_delay_ms: u64,
    /// Debounce window for persisting rule trigger metadata.
    pub rule_save_debounce_ms: u64,
}

impl Default for GatewayTuning {
    fn default() -> Self {
        Self {
            group_send_delay_ms: 50,
            max_group_tasks: 4,
            max_rule_attr_age_ms: 15_000,
            idle_user_limit_secs: 20,
            idle_read_limit_secs: 300,
            idle_attr_report_bind_limit_secs: 300,
            max_verify_delay_ms: 5_000,
            rule_save_debounce_ms: 3_000,
        }
    }
}

impl GatewayTuning {
    #[must_use]
    pub const fn group_send_delay(&self) -> Duration {
        Duration::from_millis(self.group_send_delay_ms)
    }

    #[must_use]
    pub const fn max_rule_attr_age(&self) -> Duration {
        Duration::from_millis(self.max_rule_attr_age_ms)
    }

    #[must_use]
    pub const fn max_verify_delay(&self) -> Duration {
        Duration::from_millis(self.max_verify_delay_ms)
    }

    #[must_use]
    pub const fn rule_save_debounce(&self) -> Duration {
        Duration::from_millis(self.rule_save_debounce_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub tuning: GatewayTuning,
}

pub fn parse(filename: &str) -> Result<AppConfig, ConfigError> {
    let settings = Config::builder()
        .add_source(config::File::with_name(filename).required(false))
        .build()?;

    settings.try_deserialize()
}
