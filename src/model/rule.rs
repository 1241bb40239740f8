use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Copy, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    #[default]
    Enabled,
    Disabled,
}

#[derive(Copy, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleState {
    #[default]
    Normal,
    Deleted,
}

#[derive(Copy, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOperator {
    Eq,
    Lt,
    Gt,
    Dx,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Condition {
    pub address: String,
    pub operator: ConditionOperator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Condition {
    /// spec §3 invariant 4 / §8: `dx` forbids a value.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        match self.operator {
            ConditionOperator::Dx => self.value.is_none(),
            _ => self.value.is_some(),
        }
    }

    /// The sensor id referenced by a `/sensors/<id>/...` address, if any.
    #[must_use]
    pub fn sensor_id(&self) -> Option<&str> {
        self.address
            .strip_prefix("/sensors/")
            .and_then(|rest| rest.split('/').next())
    }

    /// The leaf attribute name, e.g. `buttonevent` from
    /// `/sensors/7/state/buttonevent`.
    #[must_use]
    pub fn leaf(&self) -> Option<&str> {
        self.address.rsplit('/').next()
    }
}

#[derive(Copy, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionMethod {
    Put,
    Post,
    Delete,
    Bind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Action {
    pub address: String,
    pub method: ActionMethod,
    pub body: String,
}

impl Action {
    const VALID_PREFIXES: &'static [&'static str] =
        &["/lights", "/groups", "/scenes", "/schedules", "/sensors"];

    #[must_use]
    pub fn has_valid_prefix(&self) -> bool {
        Self::VALID_PREFIXES
            .iter()
            .any(|p| self.address.starts_with(p))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub status: RuleStatus,
    pub state: RuleState,
    /// -1 disabled, 0 event-driven, >0 period in ms.
    pub trigger_periodic: i64,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    pub created: DateTime<Utc>,
    pub last_triggered: Option<DateTime<Utc>>,
    pub times_triggered: u64,
    pub etag: String,
    /// idle-loop tick at which binding verification last ran.
    pub last_verify: i64,
}

impl Rule {
    pub const MIN_ITEMS: usize = 1;
    pub const MAX_ITEMS: usize = 8;

    #[must_use]
    pub fn new(
        id: String,
        name: String,
        owner: String,
        status: RuleStatus,
        trigger_periodic: i64,
        conditions: Vec<Condition>,
        actions: Vec<Action>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            owner,
            status,
            state: RuleState::Normal,
            trigger_periodic,
            conditions,
            actions,
            created: now,
            last_triggered: None,
            times_triggered: 0,
            etag: crate::model::etag::generate(),
            last_verify: 0,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == RuleState::Normal && self.status == RuleStatus::Enabled
    }

    /// Rule state-machine transition on DELETE (spec §4.6): also
    /// disables the rule, which schedules an Unbind pass.
    pub fn mark_deleted(&mut self) {
        self.state = RuleState::Deleted;
        self.status = RuleStatus::Disabled;
        self.touch_etag();
    }

    pub fn record_trigger(&mut self, now: DateTime<Utc>) {
        self.last_triggered = Some(now);
        self.times_triggered += 1;
    }

    pub fn touch_etag(&mut self) {
        self.etag = crate::model::etag::generate();
    }

    /// Same (conditions, actions) sets regardless of order — used for
    /// the POST de-dup rule (spec §6, §8 invariant 6).
    #[must_use]
    pub fn same_conditions_and_actions(&self, other: &Rule) -> bool {
        same_set(&self.conditions, &other.conditions) && same_set(&self.actions, &other.actions)
    }
}

fn same_set<T: PartialEq>(a: &[T], b: &[T]) -> bool {
    a.len() == b.len() && a.iter().all(|x| b.contains(x)) && b.iter().all(|x| a.contains(x))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(addr: &str, op: ConditionOperator, val: Option<&str>) -> Condition {
        Condition {
            address: addr.to_string(),
            operator: op,
            value: val.map(str::to_string),
        }
    }

    #[test]
    fn dx_condition_forbids_value() {
        assert!(cond("/sensors/1/state/lastupdated", ConditionOperator::Dx, None).is_well_formed());
        assert!(!cond("/sensors/1/state/lastupdated", ConditionOperator::Dx, Some("x")).is_well_formed());
    }

    #[test]
    fn non_dx_condition_requires_value() {
        assert!(cond("/sensors/1/state/buttonevent", ConditionOperator::Eq, Some("1")).is_well_formed());
        assert!(!cond("/sensors/1/state/buttonevent", ConditionOperator::Eq, None).is_well_formed());
    }

    #[test]
    fn sensor_id_parses_from_address() {
        let c = cond("/sensors/7/state/buttonevent", ConditionOperator::Eq, Some("1"));
        assert_eq!(c.sensor_id(), Some("7"));
        assert_eq!(c.leaf(), Some("buttonevent"));
    }

    #[test]
    fn action_prefix_validation() {
        let ok = Action {
            address: "/groups/1/action".into(),
            method: ActionMethod::Put,
            body: "{}".into(),
        };
        let bad = Action {
            address: "/outlets/1".into(),
            method: ActionMethod::Put,
            body: "{}".into(),
        };
        assert!(ok.has_valid_prefix());
        assert!(!bad.has_valid_prefix());
    }

    #[test]
    fn dedup_ignores_order() {
        let now = Utc::now();
        let c1 = cond("/sensors/1/state/buttonevent", ConditionOperator::Eq, Some("1"));
        let c2 = cond("/sensors/2/state/buttonevent", ConditionOperator::Eq, Some("2"));
        let a1 = Action { address: "/groups/1".into(), method: ActionMethod::Put, body: "{}".into() };

        let r1 = Rule::new("1".into(), "a".into(), "key".into(), RuleStatus::Enabled, 0, vec![c1.clone(), c2.clone()], vec![a1.clone()], now);
        let r2 = Rule::new("2".into(), "b".into(), "key".into(), RuleStatus::Enabled, 0, vec![c2, c1], vec![a1], now);
        assert!(r1.same_conditions_and_actions(&r2));
    }
}
