//! A deterministic in-memory radio, used by tests and as the
//! placeholder driver the binary starts with until a real ZCL/APS
//! transport is plugged in (spec §1: "the radio driver is external").

use std::collections::VecDeque;

use crate::error::ApiResult;
use crate::radio::{OutboundFrame, RadioDriver, RadioEvent};

#[derive(Debug, Default)]
pub struct MockRadio {
    pub in_network: bool,
    pub sent: Vec<OutboundFrame>,
    pub queued_events: VecDeque<RadioEvent>,
    next_request_id: u8,
}

impl MockRadio {
    #[must_use]
    pub fn new() -> Self {
        Self {
            in_network: true,
            sent: Vec::new(),
            queued_events: VecDeque::new(),
            next_request_id: 1,
        }
    }

    pub fn offline() -> Self {
        Self {
            in_network: false,
            ..Self::new()
        }
    }

    pub fn push_event(&mut self, event: RadioEvent) {
        self.queued_events.push_back(event);
    }
}

impl RadioDriver for MockRadio {
    fn in_network(&self) -> bool {
        self.in_network
    }

    async fn send(&mut self, frame: OutboundFrame) -> ApiResult<u8> {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1).max(1);
        let mut frame = frame;
        frame.request_id = id;
        self.sent.push(frame);
        Ok(id)
    }

    async fn poll_event(&mut self) -> Option<RadioEvent> {
        self.queued_events.pop_front()
    }
}
