//! Turning configured values into answer records.

pub mod rdata;
pub mod staging;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::seq::IndexedRandom;
use tracing::debug;

use crate::dns::{CLASS_IN, DnsRecord};
use crate::error::SynthesisError;
use crate::record::{FileStaging, RecordType, RecordValue};

pub use rdata::encode;

/// TTL on every fabricated record. Zero keeps resolvers from caching fakes
/// and staged chunks.
pub const FAKE_RECORD_TTL: u32 = 0;

const IPV4_CHUNK: usize = 4;
const IPV6_CHUNK: usize = 16;

/// Builds answer records from matched values.
#[derive(Debug, Clone)]
pub struct RecordSynthesizer {
    ttl: u32,
}

impl RecordSynthesizer {
    pub fn new() -> Self {
        Self::with_ttl(FAKE_RECORD_TTL)
    }

    pub fn with_ttl(ttl: u32) -> Self {
        Self { ttl }
    }

    /// Build the answer for `qname`/`rtype` from `value`.
    ///
    /// `Ok(None)` means the answer section is intentionally empty, which is
    /// how a staged file signals end-of-stream.
    pub async fn synthesize(
        &self,
        qname: &str,
        rtype: RecordType,
        value: &RecordValue,
    ) -> Result<Option<DnsRecord>, SynthesisError> {
        let rdata = match value {
            RecordValue::Literal(literal) => Some(encode(rtype, literal)?),
            RecordValue::Staged(staging) => self.staged(qname, rtype, staging).await?,
            RecordValue::Disabled => None,
        };

        Ok(rdata.map(|rdata| DnsRecord {
            rtype: rtype.code(),
            class: CLASS_IN,
            ttl: self.ttl,
            rdata,
        }))
    }

    async fn staged(
        &self,
        qname: &str,
        rtype: RecordType,
        staging: &FileStaging,
    ) -> Result<Option<Vec<u8>>, SynthesisError> {
        match rtype {
            RecordType::A => Ok(address_chunk(qname, staging, IPV4_CHUNK, "A").await),
            RecordType::Aaaa => Ok(address_chunk(qname, staging, IPV6_CHUNK, "AAAA").await),
            RecordType::Txt => txt_chunk(qname, staging).await,
            other => Err(SynthesisError::StagingUnsupported(other)),
        }
    }
}

impl Default for RecordSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

/// One chunk packed into an address, zero-padded on the right.
async fn address_chunk(
    qname: &str,
    staging: &FileStaging,
    width: usize,
    rtype: &str,
) -> Option<Vec<u8>> {
    let chunk_size = staging::clamp_chunk_size(staging.chunk_size, width, rtype);
    let mut chunk = staging::stage(&staging.file, qname, chunk_size).await;
    if chunk.is_empty() {
        return None;
    }

    chunk.resize(width, 0);
    Some(chunk)
}

/// One base64 chunk rendered into the response format.
async fn txt_chunk(qname: &str, staging: &FileStaging) -> Result<Option<Vec<u8>>, SynthesisError> {
    let format = staging
        .response_format
        .as_deref()
        .unwrap_or(staging::DEFAULT_RESPONSE_FORMAT);
    let prefix = staging
        .response_prefix_pool
        .choose(&mut rand::rng())
        .map(String::as_str)
        .unwrap_or_default();

    let capacity = staging::txt_chunk_size(format, prefix);
    if capacity == 0 {
        return Err(SynthesisError::TooLong(staging::render(format, prefix, "").len()));
    }
    let chunk_size = match staging.chunk_size {
        Some(size) if size > 0 => size.min(capacity),
        _ => capacity,
    };

    let chunk = staging::stage(&staging.file, qname, chunk_size).await;
    if chunk.is_empty() {
        return Ok(None);
    }

    let payload = staging::render(format, prefix, &STANDARD.encode(&chunk));
    debug!(len = payload.len(), prefix, "rendered staged TXT payload");

    let mut rdata = Vec::with_capacity(payload.len() + 1);
    rdata::character_string(&mut rdata, payload.as_bytes())?;
    Ok(Some(rdata))
}
