//! Record types and the values that can be configured for them.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Query type code for `ANY` (also written `*`).
pub const QTYPE_ANY: u16 = 255;

/// Record types the synthesizer knows how to encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    A,
    Ns,
    Cname,
    Soa,
    Ptr,
    Mx,
    Txt,
    Aaaa,
    Srv,
    Naptr,
    Dname,
    Rrsig,
    Dnskey,
    Svcb,
    Https,
    Caa,
}

impl RecordType {
    pub const ALL: [RecordType; 16] = [
        RecordType::A,
        RecordType::Ns,
        RecordType::Cname,
        RecordType::Soa,
        RecordType::Ptr,
        RecordType::Mx,
        RecordType::Txt,
        RecordType::Aaaa,
        RecordType::Srv,
        RecordType::Naptr,
        RecordType::Dname,
        RecordType::Rrsig,
        RecordType::Dnskey,
        RecordType::Svcb,
        RecordType::Https,
        RecordType::Caa,
    ];

    /// Wire type code.
    pub fn code(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Ns => 2,
            RecordType::Cname => 5,
            RecordType::Soa => 6,
            RecordType::Ptr => 12,
            RecordType::Mx => 15,
            RecordType::Txt => 16,
            RecordType::Aaaa => 28,
            RecordType::Srv => 33,
            RecordType::Naptr => 35,
            RecordType::Dname => 39,
            RecordType::Rrsig => 46,
            RecordType::Dnskey => 48,
            RecordType::Svcb => 64,
            RecordType::Https => 65,
            RecordType::Caa => 257,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|rtype| rtype.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Ns => "NS",
            RecordType::Cname => "CNAME",
            RecordType::Soa => "SOA",
            RecordType::Ptr => "PTR",
            RecordType::Mx => "MX",
            RecordType::Txt => "TXT",
            RecordType::Aaaa => "AAAA",
            RecordType::Srv => "SRV",
            RecordType::Naptr => "NAPTR",
            RecordType::Dname => "DNAME",
            RecordType::Rrsig => "RRSIG",
            RecordType::Dnskey => "DNSKEY",
            RecordType::Svcb => "SVCB",
            RecordType::Https => "HTTPS",
            RecordType::Caa => "CAA",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|rtype| rtype.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unsupported record type {s:?}"))
    }
}

impl Serialize for RecordType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RecordType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Human-readable name for any query type code, for logging.
pub fn qtype_name(code: u16) -> String {
    match RecordType::from_code(code) {
        Some(rtype) => rtype.as_str().to_string(),
        None if code == QTYPE_ANY => "ANY".to_string(),
        None => format!("TYPE{code}"),
    }
}

/// Describes a file served a chunk at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileStaging {
    pub file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
    /// TXT only. `{prefix}` and `{chunk}` are substituted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
    /// TXT only. One entry is picked at random per response.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_prefix_pool: Vec<String>,
}

/// A configured answer for one (type, pattern) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawValue", into = "RawValue")]
pub enum RecordValue {
    Literal(String),
    /// `false`: resolve this name for real even if a broader pattern fakes it.
    Disabled,
    Staged(FileStaging),
}

impl RecordValue {
    pub fn literal(value: impl Into<String>) -> Self {
        RecordValue::Literal(value.into())
    }
}

impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordValue::Literal(value) => f.write_str(value),
            RecordValue::Disabled => f.write_str("false"),
            RecordValue::Staged(staging) => write!(f, "file:{}", staging.file.display()),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Flag(bool),
    Text(String),
    Staged(FileStaging),
}

impl TryFrom<RawValue> for RecordValue {
    type Error = String;

    fn try_from(raw: RawValue) -> Result<Self, Self::Error> {
        match raw {
            RawValue::Flag(false) => Ok(RecordValue::Disabled),
            RawValue::Flag(true) => Err("only `false` is meaningful as a boolean value".into()),
            RawValue::Text(text) => Ok(RecordValue::Literal(text)),
            RawValue::Staged(staging) => Ok(RecordValue::Staged(staging)),
        }
    }
}

impl From<RecordValue> for RawValue {
    fn from(value: RecordValue) -> Self {
        match value {
            RecordValue::Literal(text) => RawValue::Text(text),
            RecordValue::Disabled => RawValue::Flag(false),
            RecordValue::Staged(staging) => RawValue::Staged(staging),
        }
    }
}
