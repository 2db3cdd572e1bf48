//! Serving a file one fixed-size chunk per query.
//!
//! The chunk index comes from the digits in the first label of the query
//! name, so `lala7dayum.wat.org` asks for chunk 7. A chunk past the end of
//! the file is empty, which tells the client the transfer is complete.

use std::io::{self, SeekFrom};
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

/// Total size cap of a TXT payload built from a response format.
pub const MAX_TXT_PAYLOAD: usize = 255;

pub const DEFAULT_RESPONSE_FORMAT: &str = "{prefix}{chunk}";

/// Chunk index encoded in the first label of `qname`.
///
/// Every ASCII digit in the label is concatenated; no digits means chunk 0
/// and an index too large for `u64` saturates (and so reads as past EOF).
pub fn chunk_index(qname: &str) -> u64 {
    let first_label = qname.split('.').next().unwrap_or_default();
    let digits: String = first_label.chars().filter(char::is_ascii_digit).collect();

    if digits.is_empty() {
        return 0;
    }
    digits.parse().unwrap_or(u64::MAX)
}

/// Read chunk `index` of `path` on the blocking pool.
pub async fn read_chunk(path: &Path, index: u64, chunk_size: usize) -> io::Result<Vec<u8>> {
    let offset = index
        .checked_mul(chunk_size as u64)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "chunk offset overflows"))?;

    let mut file = File::open(path).await?;
    let len = file.metadata().await?.len();
    if offset >= len {
        return Ok(Vec::new());
    }

    file.seek(SeekFrom::Start(offset)).await?;
    let mut chunk = Vec::with_capacity(chunk_size);
    file.take(chunk_size as u64).read_to_end(&mut chunk).await?;
    Ok(chunk)
}

/// Like [`read_chunk`], but an unreadable file is logged and treated as
/// empty so the client sees end-of-stream.
pub async fn stage(path: &Path, qname: &str, chunk_size: usize) -> Vec<u8> {
    let index = chunk_index(qname);

    match read_chunk(path, index, chunk_size).await {
        Ok(chunk) => {
            debug!(file = %path.display(), index, len = chunk.len(), "staged chunk");
            chunk
        }
        Err(e) => {
            warn!(file = %path.display(), index, error = %e, "failed to read staged file");
            Vec::new()
        }
    }
}

/// Resolve a configured chunk size against what one record can hold.
///
/// Unset (or zero) means `capacity`; anything larger is clamped with a
/// warning.
pub fn clamp_chunk_size(configured: Option<usize>, capacity: usize, rtype: &str) -> usize {
    match configured {
        None | Some(0) => capacity,
        Some(size) if size > capacity => {
            warn!(
                rtype,
                configured = size,
                max = capacity,
                "chunk size too large for record, clamping"
            );
            capacity
        }
        Some(size) => size,
    }
}

/// Substitute `{prefix}` and `{chunk}` into a TXT response format.
pub fn render(format: &str, prefix: &str, chunk: &str) -> String {
    format
        .split("{chunk}")
        .map(|piece| piece.replace("{prefix}", prefix))
        .collect::<Vec<_>>()
        .join(chunk)
}

/// Raw bytes per TXT response such that every copy of the base64 chunk
/// still fits.
pub fn txt_chunk_size(format: &str, prefix: &str) -> usize {
    let overhead = render(format, prefix, "").len();
    let copies = format.matches("{chunk}").count().max(1);
    let space_left = MAX_TXT_PAYLOAD.saturating_sub(overhead) / copies;
    space_left / 4 * 3
}
