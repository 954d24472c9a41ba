//! In-memory event log of settled invocations.
//!
//! One bounded log per (network, contract) key, newest first. Inserting beyond
//! the capacity evicts the oldest record and returns it to the caller.
//! Nothing is persisted; the store lives as long as the process.

use std::collections::VecDeque;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::request::normalize_contract_id;

/// Records kept per (network, contract) key.
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 50;

/// Records returned by a read that names no limit.
pub const DEFAULT_READ_LIMIT: i64 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    pub id: String,
    /// Unix seconds.
    pub timestamp: i64,
}

/// Summary of one settled `increment` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub transaction_id: String,
    pub contract_id: String,
    pub network: String,
    pub increment_amount: String,
    pub total: String,
    /// `yyyy-MM-dd HH:mm:ss <zone>` in the caller's time zone.
    pub timestamp: String,
    pub meta: EventMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventLogKey {
    pub network: String,
    pub contract_id: String,
}

impl EventLogKey {
    pub fn new(network: &str, contract_id: &str) -> Self {
        Self {
            network: network.to_string(),
            contract_id: normalize_contract_id(contract_id),
        }
    }
}

pub struct EventStore {
    logs: DashMap<EventLogKey, VecDeque<EventRecord>>,
    capacity: usize,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_LOG_CAPACITY)
    }

    /// A zero capacity is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            logs: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Insert `event` at the front of its log and evict beyond capacity.
    ///
    /// Returns the evicted records, oldest last. The insert and the eviction
    /// happen under the same shard lock.
    pub fn record(&self, event: EventRecord) -> Vec<EventRecord> {
        let key = EventLogKey::new(&event.network, &event.contract_id);
        let mut log = self.logs.entry(key).or_default();
        log.push_front(event);

        let mut evicted = Vec::new();
        while log.len() > self.capacity {
            if let Some(old) = log.pop_back() {
                evicted.push(old);
            }
        }
        evicted
    }

    /// Up to `limit` newest records for the key (default 3).
    ///
    /// A limit of zero or below yields nothing, as does an unknown key.
    pub fn read(&self, network: &str, contract_id: &str, limit: Option<i64>) -> Vec<EventRecord> {
        self.read_after(network, contract_id, limit, None).0
    }

    /// Like [`read`](Self::read) but starting after the record whose
    /// transaction id is `after`.
    ///
    /// The flag reports whether more records follow the returned page. An
    /// `after` id that is no longer in the log yields an empty page.
    pub fn read_after(
        &self,
        network: &str,
        contract_id: &str,
        limit: Option<i64>,
        after: Option<&str>,
    ) -> (Vec<EventRecord>, bool) {
        let limit = limit.unwrap_or(DEFAULT_READ_LIMIT);
        if limit <= 0 {
            return (Vec::new(), false);
        }
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);

        let key = EventLogKey::new(network, contract_id);
        let Some(log) = self.logs.get(&key) else {
            return (Vec::new(), false);
        };

        let start = match after {
            None => 0,
            Some(tx_id) => match log.iter().position(|e| e.transaction_id == tx_id) {
                Some(pos) => pos + 1,
                None => return (Vec::new(), false),
            },
        };

        let page: Vec<EventRecord> = log.iter().skip(start).take(limit).cloned().collect();
        let more = start + page.len() < log.len();
        (page, more)
    }

    /// Total records across all keys.
    pub fn len(&self) -> usize {
        self.logs.iter().map(|log| log.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<EventLogKey> {
        self.logs.iter().map(|entry| entry.key().clone()).collect()
    }
}
