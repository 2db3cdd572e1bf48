//! Shared, runtime-mutable table of fake records.
//!
//! Readers take a point-in-time snapshot and never wait on writers. Writers
//! copy the table, change one entry and swap the new table in.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use rustc_hash::FxHashMap;

use crate::record::{RecordType, RecordValue};

/// Pattern to value, for a single record type.
pub type DomainMap = FxHashMap<String, RecordValue>;

/// Every record type's pattern table.
pub type Records = FxHashMap<RecordType, DomainMap>;

/// Sorted view used for display and the management API.
pub type RecordsView = BTreeMap<RecordType, BTreeMap<String, RecordValue>>;

pub struct RecordStore {
    records: ArcSwap<Records>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::from_records(Records::default())
    }

    /// Build a store from a seed table. Patterns are lower-cased.
    pub fn from_records(records: Records) -> Self {
        let records = records
            .into_iter()
            .map(|(rtype, domains)| {
                let domains = domains
                    .into_iter()
                    .map(|(domain, value)| (normalize(&domain), value))
                    .collect();
                (rtype, domains)
            })
            .collect();

        Self {
            records: ArcSwap::from_pointee(records),
        }
    }

    /// Current table. Later writes do not affect the returned snapshot.
    pub fn snapshot(&self) -> Arc<Records> {
        self.records.load_full()
    }

    /// Insert or replace one entry, returning the previous value.
    pub fn insert(&self, rtype: RecordType, domain: &str, value: RecordValue) -> Option<RecordValue> {
        let domain = normalize(domain);
        let previous = self.records.rcu(|current| {
            let mut next = Records::clone(current);
            next.entry(rtype)
                .or_default()
                .insert(domain.clone(), value.clone());
            next
        });

        previous.get(&rtype)?.get(&domain).cloned()
    }

    /// Delete one entry, returning it if it existed.
    pub fn remove(&self, rtype: RecordType, domain: &str) -> Option<RecordValue> {
        let domain = normalize(domain);
        let previous = self.records.rcu(|current| {
            let mut next = Records::clone(current);
            if let Some(domains) = next.get_mut(&rtype) {
                domains.remove(&domain);
            }
            next
        });

        previous.get(&rtype)?.get(&domain).cloned()
    }

    pub fn get(&self, rtype: RecordType, domain: &str) -> Option<RecordValue> {
        self.records
            .load()
            .get(&rtype)?
            .get(&normalize(domain))
            .cloned()
    }

    /// Total number of entries across all record types.
    pub fn len(&self) -> usize {
        self.records.load().values().map(|domains| domains.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn view(&self) -> RecordsView {
        self.records
            .load()
            .iter()
            .map(|(rtype, domains)| {
                let domains = domains
                    .iter()
                    .map(|(domain, value)| (domain.clone(), value.clone()))
                    .collect();
                (*rtype, domains)
            })
            .collect()
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(domain: &str) -> String {
    domain.trim().to_lowercase()
}
