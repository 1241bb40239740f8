//! The Radio I/O Pipeline (spec §4.3): bounded outbound task queue,
//! 100ms dispatch loop, 250ms group-rate-limit loop, confirm
//! correlation. Generalized from the teacher's `z2m::Client` outbound
//! path (a single `mpsc` feeding one socket writer) into a queue the
//! Synchronizer and Rules Engine both enqueue onto.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use crate::model::BindingTask;
use crate::radio::{ConfirmStatus, DataConfirm, Destination, OutboundFrame, RadioDriver, RadioTask};

/// spec §4.3: bounded queues.
pub const MAX_TASKS: usize = 20;
pub const MAX_RUNNING_TASKS: usize = 4;

#[derive(Debug)]
struct InFlight {
    request_id: u8,
    destination: Destination,
    enqueued_at: Instant,
}

#[derive(Debug, Default)]
pub struct Pipeline {
    tasks: VecDeque<RadioTask>,
    running: Vec<InFlight>,
    pub binding_queue: VecDeque<BindingTask>,
    last_group_send: HashMap<u16, Instant>,
    unavailable_nodes: std::collections::HashSet<u64>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    Coalesced,
    QueueFull,
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_unavailable(&mut self, ext_addr: u64) {
        self.unavailable_nodes.insert(ext_addr);
    }

    pub fn mark_available(&mut self, ext_addr: u64) {
        self.unavailable_nodes.remove(&ext_addr);
    }

    /// spec §4.3: apply the coalescing-vs-append enqueue rule, dropping
    /// the task outright if the queue is at capacity and it cannot
    /// coalesce.
    pub fn enqueue(&mut self, task: RadioTask) -> EnqueueOutcome {
        if !task.kind.is_always_appended() {
            if let Some(existing) = self.tasks.iter_mut().find(|t| t.coalesces_with(&task)) {
                *existing = task;
                return EnqueueOutcome::Coalesced;
            }
        }
        if self.tasks.len() >= MAX_TASKS {
            return EnqueueOutcome::QueueFull;
        }
        self.tasks.push_back(task);
        EnqueueOutcome::Enqueued
    }

    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn running_tasks(&self) -> usize {
        self.running.len()
    }

    /// spec §4.3 "100ms dispatch tick": pop tasks until `running` hits
    /// its cap, dropping any destined to a known-unavailable node and
    /// respecting one-task-per-destination serialization. Group-destined
    /// tasks additionally respect a per-group `group_min_interval` so a
    /// group never gets two messages closer together than
    /// `gwGroupSendDelay`. The narrow membership/scene-mutation subset
    /// (`TaskKind::is_group_membership_or_scene_mutation`) is left alone
    /// here — that's `group_rate_limit_tick`'s job.
    pub async fn dispatch_tick<R: RadioDriver>(
        &mut self,
        radio: &mut R,
        group_min_interval: std::time::Duration,
        now: Instant,
    ) {
        if !radio.in_network() {
            return;
        }
        let mut skip = Vec::new();
        while self.running.len() < MAX_RUNNING_TASKS {
            let last_group_send = &self.last_group_send;
            let Some(idx) = self.tasks.iter().position(|t| {
                !t.kind.is_group_membership_or_scene_mutation()
                    && !skip.contains(&t.destination)
                    && !self.destination_in_flight(t.destination)
                    && match t.destination {
                        Destination::Group(addr) => last_group_send
                            .get(&addr)
                            .map_or(true, |last| now.saturating_duration_since(*last) >= group_min_interval),
                        Destination::Unicast { .. } => true,
                    }
            }) else {
                break;
            };
            let task = self.tasks.remove(idx).expect("index just found");

            if let Destination::Unicast { ext_addr, .. } = task.destination {
                if self.unavailable_nodes.contains(&ext_addr) {
                    continue;
                }
            }

            skip.push(task.destination);
            let destination = task.destination;
            let frame = OutboundFrame {
                request_id: 0,
                destination: task.destination,
                profile_id: task.profile_id,
                cluster_id: task.cluster_id,
                tx_options: task.tx_options,
                payload: task.payload,
            };
            if let Ok(request_id) = radio.send(frame).await {
                self.running.push(InFlight {
                    request_id,
                    destination,
                    enqueued_at: now,
                });
                if let Destination::Group(addr) = destination {
                    self.last_group_send.insert(addr, now);
                }
            }
        }
    }

    fn destination_in_flight(&self, destination: Destination) -> bool {
        self.running.iter().any(|r| r.destination == destination)
    }

    /// spec §4.3: correlate a confirm by request id; a `NoAck` on a
    /// group read is rescheduled rather than dropped.
    pub fn on_confirm(&mut self, confirm: DataConfirm) -> Option<RadioTask> {
        let idx = self
            .running
            .iter()
            .position(|r| r.request_id == confirm.request_id)?;
        let in_flight = self.running.remove(idx);

        if confirm.status == ConfirmStatus::NoAck && in_flight.destination.is_group() {
            return Some(RadioTask::new(
                crate::radio::TaskKind::ReadAttributes,
                in_flight.destination,
                0x0104,
                Vec::new(),
            ));
        }
        None
    }

    /// spec §4.3 "250ms group rate limit tick": flushes at most one
    /// pending per-light group membership change (`GroupAdd`/
    /// `GroupRemove`) or scene store/remove/add per invocation,
    /// backpressured by the queue's total depth rather than this tick's
    /// own concurrency — `if |tasks| > max_group_tasks, skip`.
    pub async fn group_rate_limit_tick<R: RadioDriver>(
        &mut self,
        radio: &mut R,
        max_group_tasks: usize,
        now: Instant,
    ) {
        if !radio.in_network() {
            return;
        }
        if self.tasks.len() > max_group_tasks {
            return;
        }

        let Some(idx) = self
            .tasks
            .iter()
            .position(|t| t.kind.is_group_membership_or_scene_mutation())
        else {
            return;
        };
        let task = self.tasks.remove(idx).expect("index just found");
        let destination = task.destination;
        let frame = OutboundFrame {
            request_id: 0,
            destination: task.destination,
            profile_id: task.profile_id,
            cluster_id: task.cluster_id,
            tx_options: task.tx_options,
            payload: task.payload,
        };
        if let Ok(request_id) = radio.send(frame).await {
            self.running.push(InFlight { request_id, destination, enqueued_at: now });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::mock::MockRadio;
    use crate::radio::{Destination, TaskKind};

    fn task(kind: TaskKind, dest: Destination) -> RadioTask {
        RadioTask::new(kind, dest, 0x0104, vec![1, 2, 3])
    }

    #[test]
    fn coalesces_matching_set_level_tasks() {
        let mut pipeline = Pipeline::new();
        let dest = Destination::Unicast { ext_addr: 1, endpoint: 1 };
        assert_eq!(
            pipeline.enqueue(task(TaskKind::SetLevel, dest)),
            EnqueueOutcome::Enqueued
        );
        assert_eq!(
            pipeline.enqueue(task(TaskKind::SetLevel, dest)),
            EnqueueOutcome::Coalesced
        );
        assert_eq!(pipeline.pending_tasks(), 1);
    }

    #[test]
    fn read_attributes_always_appended() {
        let mut pipeline = Pipeline::new();
        let dest = Destination::Unicast { ext_addr: 1, endpoint: 1 };
        pipeline.enqueue(task(TaskKind::ReadAttributes, dest));
        pipeline.enqueue(task(TaskKind::ReadAttributes, dest));
        assert_eq!(pipeline.pending_tasks(), 2);
    }

    #[test]
    fn queue_full_drops_new_task() {
        let mut pipeline = Pipeline::new();
        for ep in 0..MAX_TASKS as u8 {
            pipeline.enqueue(task(
                TaskKind::ReadAttributes,
                Destination::Unicast { ext_addr: 1, endpoint: ep },
            ));
        }
        let outcome = pipeline.enqueue(task(
            TaskKind::ReadAttributes,
            Destination::Unicast { ext_addr: 1, endpoint: 99 },
        ));
        assert_eq!(outcome, EnqueueOutcome::QueueFull);
    }

    const NO_GROUP_DELAY: std::time::Duration = std::time::Duration::from_millis(0);

    #[tokio::test]
    async fn dispatch_tick_serializes_per_destination() {
        let mut pipeline = Pipeline::new();
        let dest = Destination::Unicast { ext_addr: 1, endpoint: 1 };
        pipeline.enqueue(task(TaskKind::ReadAttributes, dest));
        pipeline.enqueue(task(TaskKind::WriteAttribute, dest));

        let mut radio = MockRadio::new();
        pipeline.dispatch_tick(&mut radio, NO_GROUP_DELAY, Instant::now()).await;

        assert_eq!(radio.sent.len(), 1);
        assert_eq!(pipeline.running_tasks(), 1);
        assert_eq!(pipeline.pending_tasks(), 1);
    }

    #[tokio::test]
    async fn dispatch_tick_skips_unavailable_node() {
        let mut pipeline = Pipeline::new();
        let dest = Destination::Unicast { ext_addr: 7, endpoint: 1 };
        pipeline.enqueue(task(TaskKind::ReadAttributes, dest));
        pipeline.mark_unavailable(7);

        let mut radio = MockRadio::new();
        pipeline.dispatch_tick(&mut radio, NO_GROUP_DELAY, Instant::now()).await;

        assert!(radio.sent.is_empty());
        assert_eq!(pipeline.running_tasks(), 0);
    }

    #[tokio::test]
    async fn dispatch_tick_skips_group_membership_and_scene_mutation_tasks() {
        let mut pipeline = Pipeline::new();
        pipeline.enqueue(task(TaskKind::GroupAdd, Destination::Group(3)));

        let mut radio = MockRadio::new();
        pipeline.dispatch_tick(&mut radio, NO_GROUP_DELAY, Instant::now()).await;

        assert!(radio.sent.is_empty(), "GroupAdd is the group-rate-limit tick's job");
        assert_eq!(pipeline.pending_tasks(), 1);
    }

    #[tokio::test]
    async fn dispatch_tick_sends_ordinary_group_task_once_interval_elapses() {
        let mut pipeline = Pipeline::new();
        let dest = Destination::Group(3);
        pipeline.enqueue(task(TaskKind::SetOnOff, dest));

        let mut radio = MockRadio::new();
        let min_interval = std::time::Duration::from_millis(50);
        let t0 = Instant::now();
        pipeline.dispatch_tick(&mut radio, min_interval, t0).await;
        assert_eq!(radio.sent.len(), 1);
        pipeline.on_confirm(DataConfirm { request_id: 0, status: ConfirmStatus::Success });

        pipeline.enqueue(task(TaskKind::SetLevel, dest));
        pipeline
            .dispatch_tick(&mut radio, min_interval, t0 + std::time::Duration::from_millis(10))
            .await;
        assert_eq!(radio.sent.len(), 1, "too soon since the last send to this group");

        pipeline
            .dispatch_tick(&mut radio, min_interval, t0 + std::time::Duration::from_millis(60))
            .await;
        assert_eq!(radio.sent.len(), 2);
    }

    #[tokio::test]
    async fn group_rate_limit_tick_sends_one_pending_group_add() {
        let mut pipeline = Pipeline::new();
        pipeline.enqueue(task(TaskKind::GroupAdd, Destination::Unicast { ext_addr: 1, endpoint: 1 }));

        let mut radio = MockRadio::new();
        pipeline.group_rate_limit_tick(&mut radio, 4, Instant::now()).await;

        assert_eq!(radio.sent.len(), 1);
        assert_eq!(pipeline.pending_tasks(), 0);
        assert_eq!(pipeline.running_tasks(), 1);
    }

    #[tokio::test]
    async fn group_rate_limit_tick_ignores_ordinary_group_task() {
        let mut pipeline = Pipeline::new();
        pipeline.enqueue(task(TaskKind::SetOnOff, Destination::Group(3)));

        let mut radio = MockRadio::new();
        pipeline.group_rate_limit_tick(&mut radio, 4, Instant::now()).await;

        assert!(radio.sent.is_empty(), "SetOnOff belongs to dispatch_tick, not this tick");
        assert_eq!(pipeline.pending_tasks(), 1);
    }

    #[tokio::test]
    async fn group_rate_limit_tick_backs_off_when_queue_is_deep() {
        let mut pipeline = Pipeline::new();
        for ep in 0..5u8 {
            pipeline.enqueue(task(
                TaskKind::ReadAttributes,
                Destination::Unicast { ext_addr: 1, endpoint: ep },
            ));
        }
        pipeline.enqueue(task(TaskKind::GroupRemove, Destination::Unicast { ext_addr: 2, endpoint: 1 }));

        let mut radio = MockRadio::new();
        pipeline.group_rate_limit_tick(&mut radio, 4, Instant::now()).await;

        assert!(radio.sent.is_empty(), "queue depth exceeds max_group_tasks");
    }

    #[test]
    fn noack_on_group_read_reschedules() {
        let mut pipeline = Pipeline::new();
        pipeline.running.push(InFlight {
            request_id: 5,
            destination: Destination::Group(4),
            enqueued_at: Instant::now(),
        });
        let rescheduled = pipeline.on_confirm(DataConfirm {
            request_id: 5,
            status: ConfirmStatus::NoAck,
        });
        assert!(rescheduled.is_some());
        assert_eq!(pipeline.running_tasks(), 0);
    }
}
