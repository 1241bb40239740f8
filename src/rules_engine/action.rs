//! Action execution: internal REST replay and the cluster-selection
//! rule the binding installer uses to pick a binding's cluster
//! (spec §4.5).

use crate::error::ApiResult;
use crate::model::{Action, ActionMethod};

/// Implemented by the REST layer so the Rules Engine can replay an
/// action without going through HTTP. Only `PUT` is replayed (spec
/// §4.5); anything else is rejected with `NotHandled`.
pub trait RestExecutor {
    fn put(&mut self, address: &str, body: &str) -> ApiResult<()>;
}

/// Collects the PUTs a rule's actions would issue instead of applying
/// them immediately — used by the rule tick to evaluate conditions
/// against an immutably-borrowed registry snapshot, then apply the
/// resulting writes afterward without aliasing that same registry
/// mutably mid-evaluation.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    pub calls: Vec<(String, String)>,
}

impl RestExecutor for RecordingExecutor {
    fn put(&mut self, address: &str, body: &str) -> ApiResult<()> {
        self.calls.push((address.to_string(), body.to_string()));
        Ok(())
    }
}

/// Replay a rule's actions in order, aborting on the first failure
/// (spec §4.5 "abort on NOT_HANDLED").
pub fn replay(executor: &mut impl RestExecutor, actions: &[Action]) -> ApiResult<()> {
    for action in actions {
        if action.method != ActionMethod::Put {
            return Err(crate::error::ApiError::NotHandled);
        }
        executor.put(&action.address, &action.body)?;
    }
    Ok(())
}

/// Pick the ZCL cluster a binding for this action should target, by
/// substring match on the action body (spec §4.5 binding installer
/// cluster-selection rule).
#[must_use]
pub fn cluster_for_action(action: &Action) -> u16 {
    let body = action.body.as_str();
    if body.contains("scene") {
        0x0005
    } else if body.contains("illum") {
        0x0400
    } else if body.contains("occ") {
        0x0406
    } else if body.contains("bri") {
        0x0008
    } else if body.contains("on") {
        0x0006
    } else {
        0x0006
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(body: &str) -> Action {
        Action {
            address: "/groups/1/action".to_string(),
            method: ActionMethod::Put,
            body: body.to_string(),
        }
    }

    #[test]
    fn picks_level_cluster_for_brightness() {
        assert_eq!(cluster_for_action(&action(r#"{"bri":100}"#)), 0x0008);
    }

    #[test]
    fn picks_scene_cluster() {
        assert_eq!(cluster_for_action(&action(r#"{"scene":"1"}"#)), 0x0005);
    }

    #[test]
    fn picks_onoff_cluster_by_default() {
        assert_eq!(cluster_for_action(&action(r#"{"on":true}"#)), 0x0006);
    }

    struct Recorder(Vec<(String, String)>);
    impl RestExecutor for Recorder {
        fn put(&mut self, address: &str, body: &str) -> ApiResult<()> {
            self.0.push((address.to_string(), body.to_string()));
            Ok(())
        }
    }

    #[test]
    fn replay_runs_puts_in_order() {
        let mut rec = Recorder(Vec::new());
        let actions = vec![action(r#"{"on":true}"#), action(r#"{"bri":10}"#)];
        replay(&mut rec, &actions).unwrap();
        assert_eq!(rec.0.len(), 2);
    }

    #[test]
    fn replay_rejects_non_put() {
        let mut rec = Recorder(Vec::new());
        let mut bad = action(r#"{"on":true}"#);
        bad.method = ActionMethod::Delete;
        assert!(replay(&mut rec, &[bad]).is_err());
    }
}
