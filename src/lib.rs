//! dnschef - a DNS proxy that fakes selected answers.
//!
//! Queries matching a configured pattern get a fabricated authoritative
//! answer; everything else is relayed to a real nameserver. The library is
//! exposed for benchmarking and testing.

pub mod api;
pub mod config;
pub mod dns;
pub mod error;
pub mod matcher;
pub mod querylog;
pub mod record;
pub mod resolver;
pub mod server;
pub mod stats;
pub mod store;
pub mod synth;
pub mod transport;
pub mod upstream;
