//! DNS query resolution logic.
//!
//! Handles the core query processing pipeline:
//! 1. Parse the packet (malformed or non-query packets are dropped)
//! 2. Look up a fake value for the name and type
//! 3. Either cook an authoritative answer or relay the query upstream
//!
//! Transports handle the actual I/O, the resolver handles decisions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use clap::ValueEnum;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dns::{DnsQuery, DnsRecord, DnsResponse};
use crate::error::SynthesisError;
use crate::matcher::{DomainMatcher, Match};
use crate::querylog::{Outcome, QueryEvent, QueryLog};
use crate::record::{QTYPE_ANY, RecordType, qtype_name};
use crate::stats::Stats;
use crate::store::RecordStore;
use crate::synth::RecordSynthesizer;
use crate::transport::Protocol;
use crate::upstream::ProxyClient;

/// What to do when a matched value cannot be turned into a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Relay the query upstream as if nothing matched.
    #[default]
    Proxy,
    /// Send nothing back.
    NoAnswer,
}

/// Action to take for a DNS query.
#[derive(Debug)]
pub enum QueryAction {
    /// Send this fabricated response.
    Cooked {
        response: Vec<u8>,
        query: DnsQuery,
        records: Vec<String>,
    },
    /// Relay the query upstream and pass the reply through.
    Forward { query: DnsQuery },
    /// Send nothing.
    Drop,
}

/// Resolver handles DNS query processing decisions.
///
/// Contains all shared logic between transports: matching, synthesis, the
/// failure policy and upstream relaying. Transports call [`Resolver::handle`]
/// with raw packets.
pub struct Resolver {
    matcher: DomainMatcher,
    synthesizer: RecordSynthesizer,
    proxy: ProxyClient,
    policy: FailurePolicy,
    stats: Arc<Stats>,
    query_log: Arc<QueryLog>,
}

impl Resolver {
    pub fn new(store: Arc<RecordStore>, proxy: ProxyClient) -> Self {
        Self {
            matcher: DomainMatcher::new(store),
            synthesizer: RecordSynthesizer::new(),
            proxy,
            policy: FailurePolicy::default(),
            stats: Arc::new(Stats::new()),
            query_log: Arc::new(QueryLog::new()),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_stats(mut self, stats: Arc<Stats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_query_log(mut self, query_log: Arc<QueryLog>) -> Self {
        self.query_log = query_log;
        self
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    pub fn query_log(&self) -> &Arc<QueryLog> {
        &self.query_log
    }

    /// Process one raw query end to end and return the bytes to send back,
    /// if any. TCP framing is the caller's concern.
    pub async fn handle(&self, packet: &[u8], client: SocketAddr, protocol: Protocol) -> Option<Vec<u8>> {
        let start = Instant::now();

        match self.process_query(packet).await {
            QueryAction::Cooked {
                response,
                query,
                records,
            } => {
                let qtype = qtype_name(query.qtype);
                for record in &records {
                    info!(%client, proto = %protocol, %qtype, qname = %query.name, %record, "cooking response");
                }
                self.query_log.push(QueryEvent {
                    time: Utc::now(),
                    client,
                    protocol,
                    qtype,
                    name: query.name,
                    outcome: Outcome::Cooked {
                        record: records.join(", "),
                    },
                });
                self.stats.record_cooked(start.elapsed());
                Some(response)
            }
            QueryAction::Forward { query } => {
                let qtype = qtype_name(query.qtype);
                let upstream = match self.proxy.pick() {
                    Ok(upstream) => upstream,
                    Err(e) => {
                        warn!(%client, qname = %query.name, error = %e, "cannot proxy query");
                        self.stats.record_proxy_failure(start.elapsed());
                        return None;
                    }
                };
                info!(%client, proto = %protocol, %qtype, qname = %query.name, %upstream, "proxying response");

                match self.proxy.relay_to(packet, upstream).await {
                    Ok(reply) => {
                        self.query_log.push(QueryEvent {
                            time: Utc::now(),
                            client,
                            protocol,
                            qtype,
                            name: query.name,
                            outcome: Outcome::Proxied {
                                upstream: upstream.to_string(),
                            },
                        });
                        self.stats.record_proxied(start.elapsed());
                        Some(reply)
                    }
                    Err(e) => {
                        warn!(%client, qname = %query.name, %upstream, error = %e, "proxy request failed");
                        self.stats.record_proxy_failure(start.elapsed());
                        None
                    }
                }
            }
            QueryAction::Drop => {
                self.stats.record_dropped(start.elapsed());
                None
            }
        }
    }

    /// Decide what to do with a raw query without performing any network I/O.
    pub async fn process_query(&self, packet: &[u8]) -> QueryAction {
        let query = match DnsQuery::parse(packet) {
            Ok(query) => query,
            Err(e) => {
                debug!(len = packet.len(), error = %e, "dropping unparseable packet");
                return QueryAction::Drop;
            }
        };

        if query.qtype == QTYPE_ANY {
            return self.resolve_any(query).await;
        }

        let Some(rtype) = RecordType::from_code(query.qtype) else {
            return QueryAction::Forward { query };
        };
        let Some(found) = self.matcher.lookup(&query.name, rtype) else {
            return QueryAction::Forward { query };
        };

        match self.synthesize(&query.name, rtype, &found).await {
            Ok(record) => cooked(query, record.into_iter().map(|r| (r, found.value.to_string())).collect()),
            Err(e) => {
                warn!(qname = %query.name, qtype = %rtype, pattern = %found.pattern, error = %e, "cannot synthesize record");
                self.on_failure(query)
            }
        }
    }

    /// One answer per record type with a fake value for the name.
    async fn resolve_any(&self, query: DnsQuery) -> QueryAction {
        let matches = self.matcher.lookup_all(&query.name);
        if matches.is_empty() {
            return QueryAction::Forward { query };
        }

        let results = join_all(
            matches
                .iter()
                .map(|(rtype, found)| self.synthesize(&query.name, *rtype, found)),
        )
        .await;

        let mut answers = Vec::new();
        let mut failed = false;
        for ((rtype, found), result) in matches.iter().zip(results) {
            match result {
                Ok(Some(record)) => answers.push((record, format!("{rtype} {}", found.value))),
                Ok(None) => {}
                Err(e) => {
                    warn!(qname = %query.name, qtype = %rtype, pattern = %found.pattern, error = %e, "cannot synthesize record");
                    failed = true;
                }
            }
        }

        if failed && answers.is_empty() {
            return self.on_failure(query);
        }
        cooked(query, answers)
    }

    async fn synthesize(
        &self,
        qname: &str,
        rtype: RecordType,
        found: &Match,
    ) -> Result<Option<DnsRecord>, SynthesisError> {
        self.synthesizer.synthesize(qname, rtype, &found.value).await
    }

    fn on_failure(&self, query: DnsQuery) -> QueryAction {
        match self.policy {
            FailurePolicy::Proxy => QueryAction::Forward { query },
            FailurePolicy::NoAnswer => QueryAction::Drop,
        }
    }
}

fn cooked(query: DnsQuery, answers: Vec<(DnsRecord, String)>) -> QueryAction {
    let (answers, records): (Vec<DnsRecord>, Vec<String>) = answers.into_iter().unzip();
    let response = DnsResponse::new(&query, answers).to_bytes();
    let records = if records.is_empty() {
        vec!["<empty>".to_string()]
    } else {
        records
    };

    QueryAction::Cooked {
        response,
        query,
        records,
    }
}
