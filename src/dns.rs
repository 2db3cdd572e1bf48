//! DNS message parsing and construction.

use crate::error::{SynthesisError, WireError};

pub const HEADER_LEN: usize = 12;

/// Largest encoded domain name, root label included.
const MAX_NAME_LEN: usize = 255;
const MAX_LABEL_LEN: usize = 63;

const FLAG_QR: u16 = 0x8000;
const FLAG_AA: u16 = 0x0400;
const FLAG_TC: u16 = 0x0200;
const FLAG_RA: u16 = 0x0080;

pub const CLASS_IN: u16 = 1;

/// Pointer to the question name, which always starts right after the header.
const QUESTION_NAME_POINTER: [u8; 2] = [0xC0, HEADER_LEN as u8];

/// A parsed DNS query. Only the first question is considered.
#[derive(Debug, Clone)]
pub struct DnsQuery {
    pub id: u16,
    pub flags: u16,
    /// Query name as sent (case preserved), without the trailing dot.
    pub name: String,
    pub qtype: u16,
    pub qclass: u16,
    /// Raw bytes of the first question, echoed back in responses.
    question: Vec<u8>,
}

impl DnsQuery {
    /// Parse a DNS query from raw bytes (no TCP length prefix).
    pub fn parse(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < HEADER_LEN {
            return Err(WireError::TooShort(data.len()));
        }

        let id = u16::from_be_bytes([data[0], data[1]]);
        let flags = u16::from_be_bytes([data[2], data[3]]);
        let qdcount = u16::from_be_bytes([data[4], data[5]]);

        if flags & FLAG_QR != 0 {
            return Err(WireError::NotAQuery);
        }
        if qdcount == 0 {
            return Err(WireError::NoQuestion);
        }

        let mut pos = HEADER_LEN;
        let mut labels = Vec::new();
        let mut name_len = 1;

        loop {
            let Some(&label_len) = data.get(pos) else {
                return Err(WireError::TruncatedLabel);
            };
            pos += 1;

            if label_len == 0 {
                break;
            }
            if label_len & 0xC0 != 0 {
                return Err(WireError::CompressedQuestion);
            }

            let label_len = label_len as usize;
            name_len += label_len + 1;
            if name_len > MAX_NAME_LEN {
                return Err(WireError::NameTooLong);
            }

            let label = data
                .get(pos..pos + label_len)
                .ok_or(WireError::TruncatedLabel)?;
            labels.push(String::from_utf8_lossy(label));
            pos += label_len;
        }

        let Some(fixed) = data.get(pos..pos + 4) else {
            return Err(WireError::TooShort(data.len()));
        };
        let qtype = u16::from_be_bytes([fixed[0], fixed[1]]);
        let qclass = u16::from_be_bytes([fixed[2], fixed[3]]);

        Ok(Self {
            id,
            flags,
            name: labels.join("."),
            qtype,
            qclass,
            question: data[HEADER_LEN..pos + 4].to_vec(),
        })
    }
}

/// A resource record answering the query's own name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub rtype: u16,
    pub class: u16,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

/// An authoritative answer to a single query.
#[derive(Debug, Clone)]
pub struct DnsResponse<'q> {
    query: &'q DnsQuery,
    answers: Vec<DnsRecord>,
}

impl<'q> DnsResponse<'q> {
    pub fn new(query: &'q DnsQuery, answers: Vec<DnsRecord>) -> Self {
        Self { query, answers }
    }

    /// Header flags: the query's flags with QR, AA and RA set and TC cleared.
    pub fn flags(&self) -> u16 {
        (self.query.flags | FLAG_QR | FLAG_AA | FLAG_RA) & !FLAG_TC
    }

    /// Encode the response to wire format bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(512);

        // Header
        data.extend_from_slice(&self.query.id.to_be_bytes());
        data.extend_from_slice(&self.flags().to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
        data.extend_from_slice(&(self.answers.len() as u16).to_be_bytes());
        data.extend_from_slice(&[0x00, 0x00]); // NSCOUNT
        data.extend_from_slice(&[0x00, 0x00]); // ARCOUNT

        data.extend_from_slice(&self.query.question);

        for answer in &self.answers {
            data.extend_from_slice(&QUESTION_NAME_POINTER);
            data.extend_from_slice(&answer.rtype.to_be_bytes());
            data.extend_from_slice(&answer.class.to_be_bytes());
            data.extend_from_slice(&answer.ttl.to_be_bytes());
            data.extend_from_slice(&(answer.rdata.len() as u16).to_be_bytes());
            data.extend_from_slice(&answer.rdata);
        }

        data
    }
}

/// Append `name` as uncompressed labels. One trailing dot is accepted.
pub fn encode_name(buf: &mut Vec<u8>, name: &str) -> Result<(), SynthesisError> {
    let name = name.strip_suffix('.').unwrap_or(name);
    if name.is_empty() {
        buf.push(0);
        return Ok(());
    }

    let start = buf.len();
    for label in name.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            buf.truncate(start);
            return Err(SynthesisError::InvalidName(name.to_string()));
        }
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }
    buf.push(0);

    if buf.len() - start > MAX_NAME_LEN {
        buf.truncate(start);
        return Err(SynthesisError::InvalidName(name.to_string()));
    }

    Ok(())
}

/// Prefix a message with its 2-byte big-endian length for DNS over TCP.
pub fn tcp_frame(message: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(message.len() + 2);
    framed.extend_from_slice(&(message.len() as u16).to_be_bytes());
    framed.extend_from_slice(message);
    framed
}
