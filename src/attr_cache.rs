//! Per-(ext_addr, cluster, attribute) last-known-value store (spec §4.1).
//! Lives for the process lifetime; never persisted.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttrKey {
    pub ext_addr: u64,
    pub cluster: u16,
    pub attribute: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    U8(u8),
    U16(u16),
    I16(i16),
    U32(u32),
    Bool(bool),
    Text(String),
}

#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub enum UpdateType {
    ByRead,
    ByReport,
    Invalid,
}

#[derive(Debug, Clone)]
pub struct CachedAttribute {
    pub value: AttrValue,
    pub update_type: UpdateType,
    pub timestamp_last_set: Instant,
    pub timestamp_last_read_request: Option<Instant>,
    pub timestamp_last_report: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct AttributeCache {
    entries: HashMap<AttrKey, CachedAttribute>,
}

impl AttributeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: AttrKey, value: AttrValue, update_type: UpdateType, now: Instant) {
        let entry = self.entries.entry(key).or_insert_with(|| CachedAttribute {
            value: value.clone(),
            update_type,
            timestamp_last_set: now,
            timestamp_last_read_request: None,
            timestamp_last_report: None,
        });
        entry.value = value;
        entry.update_type = update_type;
        entry.timestamp_last_set = now;
        if update_type == UpdateType::ByReport {
            entry.timestamp_last_report = Some(now);
        }
    }

    pub fn note_read_request(&mut self, key: AttrKey, now: Instant) {
        self.entries
            .entry(key)
            .or_insert_with(|| CachedAttribute {
                value: AttrValue::U8(0),
                update_type: UpdateType::Invalid,
                timestamp_last_set: now,
                timestamp_last_read_request: None,
                timestamp_last_report: None,
            })
            .timestamp_last_read_request = Some(now);
    }

    #[must_use]
    pub fn get(&self, key: &AttrKey) -> Option<&CachedAttribute> {
        self.entries.get(key)
    }

    /// spec §4.1: fresh iff `timestamp_last_set <= max_age` old.
    #[must_use]
    pub fn is_fresh(&self, key: &AttrKey, max_age: Duration, now: Instant) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| now.saturating_duration_since(e.timestamp_last_set) <= max_age)
    }

    /// A stale attribute triggers a forced read only if the last read
    /// request is older than half the freshness window, to prevent a
    /// read storm (spec §4.1).
    #[must_use]
    pub fn needs_forced_read(&self, key: &AttrKey, max_age: Duration, now: Instant) -> bool {
        if self.is_fresh(key, max_age, now) {
            return false;
        }
        let half = max_age / 2;
        match self.entries.get(key).and_then(|e| e.timestamp_last_read_request) {
            None => true,
            Some(last) => now.saturating_duration_since(last) > half,
        }
    }
}
