use serde::{Deserialize, Serialize};

#[derive(Copy, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DstMode {
    Group,
    ExtAddress,
}

#[derive(Copy, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum BindingAction {
    Bind,
    Unbind,
}

#[derive(Copy, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[allow(clippy::module_name_repetitions)]
pub enum BindingTaskState {
    Idle,
    Check,
    InProgress,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Binding {
    pub src_ext_addr: u64,
    pub src_endpoint: u8,
    pub dst_mode: DstMode,
    pub dst_address: u64,
    pub dst_endpoint: u8,
    pub cluster_id: u16,
}

/// A pending binding install/remove. `rest_node` is a weak reference
/// to the sensor that authored this task — a plain id, revalidated via
/// registry lookup before use, per the "cyclic object graphs" design
/// note: the registry is the sole owner, every cross-reference is an id
/// plus a lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BindingTask {
    pub binding: Binding,
    pub state: BindingTaskState,
    pub action: BindingAction,
    pub rest_node: Option<String>,
}

impl BindingTask {
    #[must_use]
    pub const fn new(binding: Binding, action: BindingAction, rest_node: Option<String>) -> Self {
        Self {
            binding,
            state: BindingTaskState::Idle,
            action,
            rest_node,
        }
    }

    /// BindingTask state machine transition (spec §4.6):
    /// `Idle -> Check -> InProgress -> Finished`.
    pub fn advance(&mut self) {
        self.state = match self.state {
            BindingTaskState::Idle => BindingTaskState::Check,
            BindingTaskState::Check => BindingTaskState::InProgress,
            BindingTaskState::InProgress | BindingTaskState::Finished => {
                BindingTaskState::Finished
            }
        };
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self.state, BindingTaskState::Finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding() -> Binding {
        Binding {
            src_ext_addr: 1,
            src_endpoint: 1,
            dst_mode: DstMode::Group,
            dst_address: 3,
            dst_endpoint: 0,
            cluster_id: 0x0006,
        }
    }

    #[test]
    fn state_machine_advances_in_order() {
        let mut t = BindingTask::new(binding(), BindingAction::Bind, None);
        assert_eq!(t.state, BindingTaskState::Idle);
        t.advance();
        assert_eq!(t.state, BindingTaskState::Check);
        t.advance();
        assert_eq!(t.state, BindingTaskState::InProgress);
        t.advance();
        assert!(t.is_finished());
    }
}
