//! Wildcard-aware lookup of fake records.
//!
//! A pattern is a dot-separated name where any label may be `*`. A pattern
//! only applies to query names with the same number of labels, except the
//! bare `*` pattern which matches every name as a last resort. When several
//! patterns apply, the one most similar to the query name wins.

mod similarity;

use std::cmp::Ordering;
use std::sync::Arc;

use crate::record::{RecordType, RecordValue};
use crate::store::{DomainMap, RecordStore};

pub use similarity::ratio;

/// Pattern that matches any name regardless of label count.
pub const GLOBAL_WILDCARD: &str = "*";

/// A fake value chosen for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub pattern: String,
    pub value: RecordValue,
}

/// Finds the configured fake value for a query, if any.
#[derive(Clone)]
pub struct DomainMatcher {
    store: Arc<RecordStore>,
}

impl DomainMatcher {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    /// Look up the winning pattern for `qname` among `rtype` records.
    ///
    /// A winning `false` entry is reported as no match so the query is
    /// resolved for real.
    pub fn lookup(&self, qname: &str, rtype: RecordType) -> Option<Match> {
        let records = self.store.snapshot();
        let (pattern, value) = best_match(records.get(&rtype)?, qname)?;

        match value {
            RecordValue::Disabled => None,
            value => Some(Match {
                pattern: pattern.to_string(),
                value: value.clone(),
            }),
        }
    }

    /// Every record type with a fake value for `qname`, in type order.
    pub fn lookup_all(&self, qname: &str) -> Vec<(RecordType, Match)> {
        RecordType::ALL
            .into_iter()
            .filter_map(|rtype| self.lookup(qname, rtype).map(|found| (rtype, found)))
            .collect()
    }
}

/// Ranking key for an applicable pattern. Greater is better.
struct Candidate<'a> {
    pattern: &'a str,
    specific: bool,
    similarity: f64,
    wildcards: usize,
}

impl Candidate<'_> {
    fn rank(&self, other: &Self) -> Ordering {
        self.specific
            .cmp(&other.specific)
            .then(self.similarity.total_cmp(&other.similarity))
            .then(other.wildcards.cmp(&self.wildcards))
            .then(other.pattern.cmp(self.pattern))
    }
}

/// Pick the best pattern in `domains` for `qname`, `false` entries included.
pub fn best_match<'a>(domains: &'a DomainMap, qname: &str) -> Option<(&'a str, &'a RecordValue)> {
    let qname = qname.strip_suffix('.').unwrap_or(qname).to_lowercase();
    let labels: Vec<&str> = qname.split('.').collect();

    domains
        .iter()
        .filter(|(pattern, _)| pattern_applies(pattern, &labels))
        .map(|(pattern, value)| {
            let candidate = Candidate {
                pattern,
                specific: pattern != GLOBAL_WILDCARD,
                similarity: ratio(pattern, &qname),
                wildcards: pattern.split('.').filter(|label| *label == "*").count(),
            };
            (candidate, value)
        })
        .max_by(|(a, _), (b, _)| a.rank(b))
        .map(|(candidate, value)| (candidate.pattern, value))
}

fn pattern_applies(pattern: &str, labels: &[&str]) -> bool {
    if pattern == GLOBAL_WILDCARD {
        return true;
    }

    let pattern_labels: Vec<&str> = pattern.split('.').collect();
    pattern_labels.len() == labels.len()
        && pattern_labels
            .iter()
            .zip(labels)
            .all(|(p, q)| *p == "*" || p == q)
}
