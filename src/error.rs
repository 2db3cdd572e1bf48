//! Error types for each stage of the query pipeline.

use std::io;

use thiserror::Error;

use crate::record::RecordType;

/// Inbound wire data that could not be parsed as a DNS query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("message too short ({0} bytes)")]
    TooShort(usize),

    #[error("message carries no question")]
    NoQuestion,

    #[error("label runs past end of message")]
    TruncatedLabel,

    #[error("compressed names are not valid in a question")]
    CompressedQuestion,

    #[error("question name exceeds 255 bytes")]
    NameTooLong,

    #[error("message is a response, not a query")]
    NotAQuery,
}

/// A configured value that cannot be turned into record data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("{rtype} value needs {expected} fields, got {got}")]
    FieldCount {
        rtype: RecordType,
        expected: usize,
        got: usize,
    },

    #[error("invalid number for {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    #[error("invalid domain name: {0:?}")]
    InvalidName(String),

    #[error("invalid base64 in {0}")]
    InvalidBase64(&'static str),

    #[error("invalid timestamp: {0:?} (expected YYYYMMDDHHMMSS)")]
    InvalidTimestamp(String),

    #[error("unknown record type: {0:?}")]
    UnknownType(String),

    #[error("invalid service parameter: {0:?}")]
    InvalidSvcParam(String),

    #[error("{0} records cannot be staged from a file")]
    StagingUnsupported(RecordType),

    #[error("record data too long ({0} bytes)")]
    TooLong(usize),
}

/// Failure while relaying a query to an upstream nameserver.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("no upstream nameservers configured")]
    NoUpstream,

    #[error("upstream {0} did not answer in time")]
    Timeout(String),

    #[error("upstream closed the connection before replying")]
    Closed,

    #[error("upstream I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Startup configuration problems. These abort the process.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid upstream {0:?} (expected host[#port[#udp|tcp]])")]
    InvalidUpstream(String),

    #[error("invalid value for {domain}: {reason}")]
    InvalidValue { domain: String, reason: String },

    #[error("fake domains given without --fakeip or --fakeipv6")]
    MissingFakeAddress,
}
