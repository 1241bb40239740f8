//! The Rules Engine (spec §4.5): ordered rule store, periodic trigger
//! evaluation, reactive green-power handling, binding verification.

pub mod action;
pub mod binding_installer;
pub mod condition;

use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::attr_cache::AttributeCache;
use crate::config::GatewayTuning;
use crate::error::{ApiError, ApiResult};
use crate::model::{Action, ActionMethod, Condition, Rule, RuleStatus};
use crate::pipeline::Pipeline;
use crate::registry::NodeRegistry;
use crate::rules_engine::action::RestExecutor;

/// Open question resolution (spec §9): the rule store caps at 100
/// entries, matching the REST surface's `RuleEngineFull` error.
pub const MAX_RULES_COUNT: usize = 100;

/// spec §6: a rule name longer than this is rejected outright.
pub const MAX_RULE_NAME_LENGTH: usize = 32;

#[derive(Debug, Default)]
pub struct RulesEngine {
    pub rules: Vec<Rule>,
    verify_cursor: usize,
    last_tick: Option<DateTime<Utc>>,
}

impl RulesEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    #[must_use]
    pub fn rule_mut(&mut self, id: &str) -> Option<&mut Rule> {
        self.rules.iter_mut().find(|r| r.id == id)
    }

    fn next_id(&self) -> String {
        let set: std::collections::BTreeSet<u32> =
            self.rules.iter().filter_map(|r| r.id.parse().ok()).collect();
        crate::model::ids::smallest_unused(&set).to_string()
    }

    /// spec §6 "create rule": validates item-count bounds, name length,
    /// action prefixes and within-rule action uniqueness, and condition
    /// leaves against the referenced sensor's type catalog; rejects an
    /// exact (conditions, actions) duplicate; enforces the rule-count cap.
    pub fn create_rule(
        &mut self,
        name: String,
        owner: String,
        status: RuleStatus,
        trigger_periodic: i64,
        conditions: Vec<Condition>,
        actions: Vec<Action>,
        registry: &NodeRegistry,
        now: DateTime<Utc>,
    ) -> ApiResult<&Rule> {
        if name.len() > MAX_RULE_NAME_LENGTH {
            return Err(ApiError::InvalidValue {
                address: "name".to_string(),
                description: format!("name exceeds {MAX_RULE_NAME_LENGTH} characters"),
            });
        }
        if conditions.len() < Rule::MIN_ITEMS || conditions.len() > Rule::MAX_ITEMS {
            return Err(ApiError::TooManyItems("conditions".to_string()));
        }
        if actions.len() < Rule::MIN_ITEMS || actions.len() > Rule::MAX_ITEMS {
            return Err(ApiError::TooManyItems("actions".to_string()));
        }
        if !conditions.iter().all(Condition::is_well_formed) {
            return Err(ApiError::InvalidValue {
                address: "conditions".to_string(),
                description: "dx operator forbids a value".to_string(),
            });
        }
        if !conditions
            .iter()
            .all(|c| condition::attribute_is_valid(registry, c))
        {
            return Err(ApiError::InvalidValue {
                address: "conditions".to_string(),
                description: "address not valid for the sensor's type".to_string(),
            });
        }
        if !actions.iter().all(Action::has_valid_prefix) {
            return Err(ApiError::ActionError(
                "action address outside the allowed resource prefixes".to_string(),
            ));
        }
        let mut seen_addresses = std::collections::HashSet::new();
        if !actions.iter().all(|a| seen_addresses.insert(&a.address)) {
            return Err(ApiError::ActionError(
                "duplicate action address within a rule".to_string(),
            ));
        }

        let candidate = Rule::new(
            String::new(),
            name,
            owner,
            status,
            trigger_periodic,
            conditions,
            actions,
            now,
        );
        if let Some(dup) = self
            .rules
            .iter()
            .find(|r| r.same_conditions_and_actions(&candidate))
        {
            return Ok(dup);
        }

        if self.rules.len() >= MAX_RULES_COUNT {
            return Err(ApiError::RuleEngineFull);
        }

        let id = self.next_id();
        let mut rule = candidate;
        rule.id = id;
        self.rules.push(rule);
        Ok(self.rules.last().expect("just pushed"))
    }

    /// spec §4.6: DELETE marks the rule deleted/disabled and schedules
    /// an Unbind pass.
    pub fn delete_rule(&mut self, id: &str, registry: &NodeRegistry, pipeline: &mut Pipeline) -> ApiResult<()> {
        let rule = self.rule_mut(id).ok_or_else(|| ApiError::NotFound(id.to_string()))?;
        binding_installer::unbind_rule(rule, registry, pipeline);
        rule.mark_deleted();
        Ok(())
    }

    /// spec §4.6 "disable -> unbind -> re-enable": toggling `status` to
    /// `Disabled` schedules an Unbind pass; toggling back to `Enabled`
    /// resets `last_verify` so the next idle tick re-installs bindings.
    pub fn set_status(
        &mut self,
        id: &str,
        status: RuleStatus,
        registry: &NodeRegistry,
        pipeline: &mut Pipeline,
    ) -> ApiResult<()> {
        let rule = self.rule_mut(id).ok_or_else(|| ApiError::NotFound(id.to_string()))?;
        if rule.status == status {
            return Ok(());
        }
        if status == RuleStatus::Disabled {
            binding_installer::unbind_rule(rule, registry, pipeline);
        } else {
            rule.last_verify = 0;
        }
        rule.status = status;
        rule.touch_etag();
        Ok(())
    }

    /// spec §4.5 "~5s tick": evaluate every periodic rule's conditions
    /// and replay its actions on a match. `cache_now`/`tuning` bound the
    /// attribute-freshness check (spec §4.1/§4.5 bullet 1): a rule
    /// whose condition reads a stale attribute does not fire.
    pub fn periodic_tick(
        &mut self,
        registry: &NodeRegistry,
        cache: &AttributeCache,
        tuning: &GatewayTuning,
        executor: &mut impl RestExecutor,
        now: DateTime<Utc>,
        cache_now: Instant,
    ) {
        let since = self.last_tick.unwrap_or(now);
        let max_age = tuning.max_rule_attr_age();
        for rule in &mut self.rules {
            if !rule.is_active() || rule.trigger_periodic <= 0 {
                continue;
            }
            let due = rule
                .last_triggered
                .map_or(true, |last| (now - last).num_milliseconds() >= rule.trigger_periodic);
            if !due {
                continue;
            }
            if condition::all_match(registry, cache, &rule.conditions, since, max_age, cache_now) {
                if action::replay(executor, &rule.actions).is_ok() {
                    rule.record_trigger(now);
                }
            }
        }
        self.last_tick = Some(now);
    }

    /// spec §4.5 "event-driven rules": a sensor changed; re-evaluate
    /// every enabled event-driven rule that references it.
    pub fn on_sensor_changed(
        &mut self,
        sensor_id: &str,
        registry: &NodeRegistry,
        cache: &AttributeCache,
        tuning: &GatewayTuning,
        executor: &mut impl RestExecutor,
        now: DateTime<Utc>,
        cache_now: Instant,
    ) {
        let since = now - chrono::Duration::milliseconds(1);
        let max_age = tuning.max_rule_attr_age();
        for rule in &mut self.rules {
            if !rule.is_active() || rule.trigger_periodic != 0 {
                continue;
            }
            let references = rule
                .conditions
                .iter()
                .any(|c| c.sensor_id() == Some(sensor_id));
            if !references {
                continue;
            }
            if condition::all_match(registry, cache, &rule.conditions, since, max_age, cache_now) {
                if action::replay(executor, &rule.actions).is_ok() {
                    rule.record_trigger(now);
                }
            }
        }
    }

    /// spec §4.5 "binding verification phase": round-robin one rule
    /// per call.
    pub fn verify_tick(
        &mut self,
        registry: &NodeRegistry,
        pipeline: &mut Pipeline,
        tuning: &GatewayTuning,
        idle_total_ms: i64,
    ) -> usize {
        if self.rules.is_empty() {
            return 0;
        }
        let idx = self.verify_cursor % self.rules.len();
        self.verify_cursor = self.verify_cursor.wrapping_add(1);
        let rule = &mut self.rules[idx];
        if !rule.is_active() {
            return 0;
        }
        binding_installer::verify_rule(rule, registry, pipeline, tuning, idle_total_ms)
    }
}
