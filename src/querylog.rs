//! Bounded in-memory log of answered queries.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::transport::Protocol;

/// Events kept before the oldest are evicted.
pub const QUERY_LOG_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Outcome {
    /// A fake answer was returned.
    Cooked { record: String },
    /// The query was relayed upstream.
    Proxied { upstream: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryEvent {
    pub time: DateTime<Utc>,
    pub client: SocketAddr,
    pub protocol: Protocol,
    #[serde(rename = "type")]
    pub qtype: String,
    pub name: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Filter for [`QueryLog::query`]. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub qtype: Option<String>,
    pub name: Option<String>,
}

impl QueryFilter {
    fn matches(&self, event: &QueryEvent) -> bool {
        let type_ok = self
            .qtype
            .as_deref()
            .is_none_or(|qtype| event.qtype.eq_ignore_ascii_case(qtype));
        let name_ok = self
            .name
            .as_deref()
            .is_none_or(|name| event.name.to_lowercase().contains(&name.to_lowercase()));
        type_ok && name_ok
    }
}

#[derive(Debug)]
pub struct QueryLog {
    events: Mutex<VecDeque<QueryEvent>>,
    capacity: usize,
}

impl QueryLog {
    pub fn new() -> Self {
        Self::with_capacity(QUERY_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, event: QueryEvent) {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Matching events, oldest first.
    pub fn query(&self, filter: &QueryFilter) -> Vec<QueryEvent> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.iter().filter(|event| filter.matches(event)).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for QueryLog {
    fn default() -> Self {
        Self::new()
    }
}
