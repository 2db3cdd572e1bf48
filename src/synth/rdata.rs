//! RDATA encoders for literal (zone-file style) values.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::NaiveDateTime;

use crate::dns::encode_name;
use crate::error::SynthesisError;
use crate::record::RecordType;

/// Longest single `<character-string>`.
pub const MAX_CHARACTER_STRING: usize = 255;

const DEFAULT_MX_PREFERENCE: u16 = 10;
const RRSIG_TIME_FORMAT: &str = "%Y%m%d%H%M%S";

/// Encode a literal value as RDATA for `rtype`.
pub fn encode(rtype: RecordType, value: &str) -> Result<Vec<u8>, SynthesisError> {
    let value = value.trim();
    let rdata = match rtype {
        RecordType::A => ipv4(value)?.octets().to_vec(),
        RecordType::Aaaa => ipv6(value)?.octets().to_vec(),
        RecordType::Cname | RecordType::Ns | RecordType::Ptr | RecordType::Dname => name(value)?,
        RecordType::Mx => mx(value)?,
        RecordType::Txt => txt(value.as_bytes())?,
        RecordType::Soa => soa(value)?,
        RecordType::Srv => srv(value)?,
        RecordType::Naptr => naptr(value)?,
        RecordType::Dnskey => dnskey(value)?,
        RecordType::Rrsig => rrsig(value)?,
        RecordType::Https | RecordType::Svcb => svcb(rtype, value)?,
        RecordType::Caa => caa(value)?,
    };

    if rdata.len() > u16::MAX as usize {
        return Err(SynthesisError::TooLong(rdata.len()));
    }

    Ok(rdata)
}

pub fn ipv4(value: &str) -> Result<Ipv4Addr, SynthesisError> {
    value
        .parse()
        .map_err(|_| SynthesisError::InvalidAddress(value.to_string()))
}

pub fn ipv6(value: &str) -> Result<Ipv6Addr, SynthesisError> {
    value
        .parse()
        .map_err(|_| SynthesisError::InvalidAddress(value.to_string()))
}

/// TXT RDATA: the payload split into 255-byte character-strings.
pub fn txt(payload: &[u8]) -> Result<Vec<u8>, SynthesisError> {
    let mut rdata = Vec::with_capacity(payload.len() + payload.len() / MAX_CHARACTER_STRING + 1);
    if payload.is_empty() {
        rdata.push(0);
        return Ok(rdata);
    }
    for segment in payload.chunks(MAX_CHARACTER_STRING) {
        character_string(&mut rdata, segment)?;
    }
    Ok(rdata)
}

fn name(value: &str) -> Result<Vec<u8>, SynthesisError> {
    let mut rdata = Vec::with_capacity(value.len() + 2);
    encode_name(&mut rdata, value)?;
    Ok(rdata)
}

fn mx(value: &str) -> Result<Vec<u8>, SynthesisError> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    let (preference, exchange) = match parts.as_slice() {
        [exchange] => (DEFAULT_MX_PREFERENCE, *exchange),
        [preference, exchange] => (number("preference", preference)?, *exchange),
        _ => {
            return Err(SynthesisError::FieldCount {
                rtype: RecordType::Mx,
                expected: 2,
                got: parts.len(),
            });
        }
    };

    let mut rdata = preference.to_be_bytes().to_vec();
    encode_name(&mut rdata, exchange)?;
    Ok(rdata)
}

fn soa(value: &str) -> Result<Vec<u8>, SynthesisError> {
    let [mname, rname, serial, refresh, retry, expire, minimum] = fields(RecordType::Soa, value)?;

    let mut rdata = Vec::with_capacity(64);
    encode_name(&mut rdata, mname)?;
    encode_name(&mut rdata, rname)?;
    for (field, text) in [
        ("serial", serial),
        ("refresh", refresh),
        ("retry", retry),
        ("expire", expire),
        ("minimum", minimum),
    ] {
        rdata.extend_from_slice(&number::<u32>(field, text)?.to_be_bytes());
    }
    Ok(rdata)
}

fn srv(value: &str) -> Result<Vec<u8>, SynthesisError> {
    let [priority, weight, port, target] = fields(RecordType::Srv, value)?;

    let mut rdata = Vec::with_capacity(32);
    rdata.extend_from_slice(&number::<u16>("priority", priority)?.to_be_bytes());
    rdata.extend_from_slice(&number::<u16>("weight", weight)?.to_be_bytes());
    rdata.extend_from_slice(&number::<u16>("port", port)?.to_be_bytes());
    encode_name(&mut rdata, target)?;
    Ok(rdata)
}

fn naptr(value: &str) -> Result<Vec<u8>, SynthesisError> {
    let [order, preference, flags, service, regexp, replacement] =
        fields(RecordType::Naptr, value)?;

    let mut rdata = Vec::with_capacity(64);
    rdata.extend_from_slice(&number::<u16>("order", order)?.to_be_bytes());
    rdata.extend_from_slice(&number::<u16>("preference", preference)?.to_be_bytes());
    character_string(&mut rdata, unquote(flags).as_bytes())?;
    character_string(&mut rdata, unquote(service).as_bytes())?;
    character_string(&mut rdata, unquote(regexp).as_bytes())?;
    encode_name(&mut rdata, replacement)?;
    Ok(rdata)
}

fn dnskey(value: &str) -> Result<Vec<u8>, SynthesisError> {
    let (head, key) = leading_fields::<3>(RecordType::Dnskey, value)?;
    let [flags, protocol, algorithm] = head;

    let mut rdata = Vec::with_capacity(4 + key.len());
    rdata.extend_from_slice(&number::<u16>("flags", flags)?.to_be_bytes());
    rdata.push(number("protocol", protocol)?);
    rdata.push(number("algorithm", algorithm)?);
    rdata.extend_from_slice(&base64(&key, "public key")?);
    Ok(rdata)
}

fn rrsig(value: &str) -> Result<Vec<u8>, SynthesisError> {
    let (head, signature) = leading_fields::<8>(RecordType::Rrsig, value)?;
    let [covered, algorithm, labels, original_ttl, expiration, inception, key_tag, signer] = head;

    let covered = RecordType::from_str(covered)
        .map_err(|_| SynthesisError::UnknownType(covered.to_string()))?;

    let mut rdata = Vec::with_capacity(64 + signature.len());
    rdata.extend_from_slice(&covered.code().to_be_bytes());
    rdata.push(number("algorithm", algorithm)?);
    rdata.push(number("labels", labels)?);
    rdata.extend_from_slice(&number::<u32>("original ttl", original_ttl)?.to_be_bytes());
    rdata.extend_from_slice(&signature_time(expiration)?.to_be_bytes());
    rdata.extend_from_slice(&signature_time(inception)?.to_be_bytes());
    rdata.extend_from_slice(&number::<u16>("key tag", key_tag)?.to_be_bytes());
    encode_name(&mut rdata, signer)?;
    rdata.extend_from_slice(&base64(&signature, "signature")?);
    Ok(rdata)
}

/// `YYYYMMDDHHMMSS` in UTC, or plain seconds since the epoch.
fn signature_time(value: &str) -> Result<u32, SynthesisError> {
    let invalid = || SynthesisError::InvalidTimestamp(value.to_string());

    if value.len() == 14 {
        let timestamp = NaiveDateTime::parse_from_str(value, RRSIG_TIME_FORMAT)
            .map_err(|_| invalid())?
            .and_utc()
            .timestamp();
        return u32::try_from(timestamp).map_err(|_| invalid());
    }

    value.parse().map_err(|_| invalid())
}

fn caa(value: &str) -> Result<Vec<u8>, SynthesisError> {
    let (head, tag_value) = leading_fields::<1>(RecordType::Caa, value)?;
    let [flags] = head;
    let Some((tag, tag_value)) = tag_value.split_once(' ') else {
        return Err(SynthesisError::FieldCount {
            rtype: RecordType::Caa,
            expected: 3,
            got: 2,
        });
    };
    if tag.is_empty() || tag.len() > MAX_CHARACTER_STRING || !tag.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(SynthesisError::InvalidName(tag.to_string()));
    }

    let tag_value = unquote(tag_value.trim());
    let mut rdata = Vec::with_capacity(2 + tag.len() + tag_value.len());
    rdata.push(number("flags", flags)?);
    rdata.push(tag.len() as u8);
    rdata.extend_from_slice(tag.as_bytes());
    rdata.extend_from_slice(tag_value.as_bytes());
    Ok(rdata)
}

/// SvcParamKey numbers (RFC 9460 section 14.3.2).
fn svc_param_key(key: &str) -> Result<u16, SynthesisError> {
    let code = match key {
        "mandatory" => 0,
        "alpn" => 1,
        "no-default-alpn" => 2,
        "port" => 3,
        "ipv4hint" => 4,
        "ech" => 5,
        "ipv6hint" => 6,
        other => other
            .strip_prefix("key")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| SynthesisError::InvalidSvcParam(other.to_string()))?,
    };
    Ok(code)
}

/// `priority target [key[=value]...]`.
fn svcb(rtype: RecordType, value: &str) -> Result<Vec<u8>, SynthesisError> {
    let mut tokens = value.split_whitespace();
    let (Some(priority), Some(target)) = (tokens.next(), tokens.next()) else {
        return Err(SynthesisError::FieldCount {
            rtype,
            expected: 2,
            got: value.split_whitespace().count(),
        });
    };

    let mut params: Vec<(u16, Vec<u8>)> = Vec::new();
    for token in tokens {
        let (key, raw) = token.split_once('=').unwrap_or((token, ""));
        let code = svc_param_key(key)?;
        if params.iter().any(|(existing, _)| *existing == code) {
            return Err(SynthesisError::InvalidSvcParam(token.to_string()));
        }
        params.push((code, svc_param_value(code, unquote(raw), token)?));
    }
    params.sort_by_key(|(code, _)| *code);

    let mut rdata = Vec::with_capacity(64);
    rdata.extend_from_slice(&number::<u16>("priority", priority)?.to_be_bytes());
    encode_name(&mut rdata, target)?;
    for (code, param) in params {
        if param.len() > u16::MAX as usize {
            return Err(SynthesisError::TooLong(param.len()));
        }
        rdata.extend_from_slice(&code.to_be_bytes());
        rdata.extend_from_slice(&(param.len() as u16).to_be_bytes());
        rdata.extend_from_slice(&param);
    }
    Ok(rdata)
}

fn svc_param_value(code: u16, raw: &str, token: &str) -> Result<Vec<u8>, SynthesisError> {
    let invalid = || SynthesisError::InvalidSvcParam(token.to_string());
    let list = || raw.split(',').filter(|item| !item.is_empty());

    let mut value = Vec::new();
    match code {
        0 => {
            let mut keys = list().map(svc_param_key).collect::<Result<Vec<_>, _>>()?;
            keys.sort_unstable();
            for key in keys {
                value.extend_from_slice(&key.to_be_bytes());
            }
        }
        1 => {
            for protocol in list() {
                character_string(&mut value, protocol.as_bytes()).map_err(|_| invalid())?;
            }
        }
        2 => {
            if !raw.is_empty() {
                return Err(invalid());
            }
        }
        3 => value.extend_from_slice(&raw.parse::<u16>().map_err(|_| invalid())?.to_be_bytes()),
        4 => {
            for addr in list() {
                value.extend_from_slice(&ipv4(addr).map_err(|_| invalid())?.octets());
            }
        }
        5 => value = STANDARD.decode(raw).map_err(|_| invalid())?,
        6 => {
            for addr in list() {
                value.extend_from_slice(&ipv6(addr).map_err(|_| invalid())?.octets());
            }
        }
        _ => value.extend_from_slice(raw.as_bytes()),
    }

    if matches!(code, 0 | 1 | 4 | 6) && value.is_empty() {
        return Err(invalid());
    }
    Ok(value)
}

/// Append one length-prefixed `<character-string>`.
pub fn character_string(buf: &mut Vec<u8>, data: &[u8]) -> Result<(), SynthesisError> {
    if data.len() > MAX_CHARACTER_STRING {
        return Err(SynthesisError::TooLong(data.len()));
    }
    buf.push(data.len() as u8);
    buf.extend_from_slice(data);
    Ok(())
}

/// Exactly `N` whitespace-separated fields.
fn fields<const N: usize>(rtype: RecordType, value: &str) -> Result<[&str; N], SynthesisError> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    let got = parts.len();
    <[&str; N]>::try_from(parts).map_err(|_| SynthesisError::FieldCount {
        rtype,
        expected: N,
        got,
    })
}

/// `N` leading fields plus a non-empty remainder, whose internal whitespace is
/// dropped (base64 blobs are often split across several tokens).
fn leading_fields<const N: usize>(
    rtype: RecordType,
    value: &str,
) -> Result<([&str; N], String), SynthesisError> {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() <= N {
        return Err(SynthesisError::FieldCount {
            rtype,
            expected: N + 1,
            got: parts.len(),
        });
    }

    let rest = if rtype == RecordType::Caa {
        parts[N..].join(" ")
    } else {
        parts[N..].concat()
    };
    let head = <[&str; N]>::try_from(&parts[..N]).map_err(|_| SynthesisError::FieldCount {
        rtype,
        expected: N + 1,
        got: parts.len(),
    })?;
    Ok((head, rest))
}

fn number<T: FromStr>(field: &'static str, value: &str) -> Result<T, SynthesisError> {
    value.parse().map_err(|_| SynthesisError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn base64(value: &str, what: &'static str) -> Result<Vec<u8>, SynthesisError> {
    STANDARD
        .decode(value)
        .map_err(|_| SynthesisError::InvalidBase64(what))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(value)
}
