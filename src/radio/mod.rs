//! The radio driver boundary (spec §1 "the radio driver is external").
//! The core only ever sees APS-layer primitives through this trait,
//! generalized from the teacher's `z2m::Client` (an async object
//! wrapping a socket, decoding inbound frames into application
//! messages) to the ZCL/APS shape this spec targets.

pub mod mock;
pub mod zcl;

use serde::{Deserialize, Serialize};

use crate::error::ApiResult;

#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Group(u16),
    Unicast { ext_addr: u64, endpoint: u8 },
}

impl Destination {
    #[must_use]
    pub const fn is_group(self) -> bool {
        matches!(self, Self::Group(_))
    }
}

/// The subset of task semantics the Pipeline needs to know about to
/// apply the idempotent-replace coalescing rule (spec §4.3) and the
/// binding installer's cluster-selection rule (spec §4.5).
#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    ReadAttributes,
    WriteAttribute,
    SceneStore,
    SceneRemove,
    SceneAdd,
    SceneView,
    SceneRecall,
    GroupMembershipQuery,
    SceneMembershipQuery,
    SetOnOff,
    SetLevel,
    SetColor,
    GroupAdd,
    GroupRemove,
}

impl TaskKind {
    /// spec §4.3: these kinds are always appended, never coalesced.
    #[must_use]
    pub const fn is_always_appended(self) -> bool {
        matches!(
            self,
            Self::ReadAttributes
                | Self::WriteAttribute
                | Self::SceneStore
                | Self::SceneRemove
                | Self::SceneAdd
                | Self::SceneView
                | Self::GroupMembershipQuery
                | Self::SceneMembershipQuery
        )
    }

    #[must_use]
    pub const fn cluster_id(self) -> u16 {
        match self {
            Self::SetOnOff => 0x0006,
            Self::SetLevel => 0x0008,
            Self::SetColor => 0x0300,
            Self::GroupAdd | Self::GroupRemove | Self::GroupMembershipQuery => 0x0004,
            Self::SceneStore | Self::SceneRemove | Self::SceneAdd | Self::SceneView
            | Self::SceneRecall | Self::SceneMembershipQuery => 0x0005,
            Self::ReadAttributes | Self::WriteAttribute => 0x0000,
        }
    }

    /// spec §4.3 "group rate limit" tick's narrower scope: per-light
    /// group membership changes and scene store/remove/add, handled on
    /// the 250ms tick rather than the 100ms dispatch tick.
    #[must_use]
    pub const fn is_group_membership_or_scene_mutation(self) -> bool {
        matches!(
            self,
            Self::GroupAdd | Self::GroupRemove | Self::SceneStore | Self::SceneRemove | Self::SceneAdd
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioTask {
    pub kind: TaskKind,
    pub destination: Destination,
    pub profile_id: u16,
    pub cluster_id: u16,
    pub tx_options: u8,
    pub payload: Vec<u8>,
    pub fire_and_forget: bool,
}

impl RadioTask {
    #[must_use]
    pub fn new(kind: TaskKind, destination: Destination, profile_id: u16, payload: Vec<u8>) -> Self {
        Self {
            cluster_id: kind.cluster_id(),
            kind,
            destination,
            profile_id,
            tx_options: 0,
            payload,
            fire_and_forget: false,
        }
    }

    /// Two tasks coalesce (spec §4.3) iff destination, profile,
    /// cluster, tx_options and payload size all match.
    #[must_use]
    pub fn coalesces_with(&self, other: &Self) -> bool {
        self.destination == other.destination
            && self.profile_id == other.profile_id
            && self.cluster_id == other.cluster_id
            && self.tx_options == other.tx_options
            && self.payload.len() == other.payload.len()
    }
}

#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub enum ConfirmStatus {
    Success,
    NoAck,
    Other(u8),
}

#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub struct DataConfirm {
    pub request_id: u8,
    pub status: ConfirmStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataIndication {
    pub src_ext_addr: u64,
    pub src_endpoint: u8,
    pub profile_id: u16,
    pub cluster_id: u16,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEvent {
    pub ext_addr: u64,
    pub zombie: bool,
    pub active_endpoints: Vec<u8>,
}

#[derive(Copy, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreenPowerIndication {
    pub gpd_src_id: u32,
    pub device_id: u8,
    pub command_id: u8,
}

/// What the pipeline hands the radio driver to actually transmit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub request_id: u8,
    pub destination: Destination,
    pub profile_id: u16,
    pub cluster_id: u16,
    pub tx_options: u8,
    pub payload: Vec<u8>,
}

/// Everything that can arrive from the radio unprompted (spec §4.4 /
/// §4.7): attribute reports and requests, confirms for earlier sends,
/// node presence changes, and green-power button presses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    Indication(DataIndication),
    Confirm(DataConfirm),
    Node(NodeEvent),
    GreenPower(GreenPowerIndication),
}

/// Generic rather than boxed (`dyn`) so `send` can stay a plain
/// `async fn` in the trait (stable since Rust 1.75) without pulling in
/// an async-trait shim the teacher's dependency stack doesn't carry.
pub trait RadioDriver: Send {
    /// Whether the coordinator currently has network membership
    /// (spec §4.7: "Radio not in network").
    fn in_network(&self) -> bool;

    /// Submit a frame. Returns the assigned APS request id, which the
    /// driver later echoes back in a `DataConfirm`.
    fn send(&mut self, frame: OutboundFrame) -> impl std::future::Future<Output = ApiResult<u8>> + Send;

    /// Wait for the next unsolicited event. Returns `None` once the
    /// driver has shut down for good.
    fn poll_event(&mut self) -> impl std::future::Future<Output = Option<RadioEvent>> + Send;
}
