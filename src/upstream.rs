//! Relaying unmatched queries to real nameservers.

use std::fmt;
use std::future::Future;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use rand::seq::IndexedRandom;
use tokio::net::{TcpStream, UdpSocket, lookup_host};
use tracing::debug;

use crate::error::{ConfigError, ProxyError};
use crate::transport::{MAX_DNS_PACKET_SIZE, Protocol, read_frame, write_frame};

pub const DEFAULT_PORT: u16 = 53;

/// One nameserver in the upstream pool, written `host[#port[#udp|tcp]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
}

impl Upstream {
    pub fn udp(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            protocol: Protocol::Udp,
        }
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            protocol: Protocol::Tcp,
        }
    }

    async fn resolve(&self) -> Result<SocketAddr, ProxyError> {
        let host = self.host.trim_start_matches('[').trim_end_matches(']');
        lookup_host((host, self.port))
            .await?
            .next()
            .ok_or_else(|| ProxyError::Io(std::io::Error::other(format!("cannot resolve {}", self.host))))
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}#{}", self.host, self.port, self.protocol.as_str().to_lowercase())
    }
}

impl FromStr for Upstream {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidUpstream(s.to_string());
        let mut parts = s.trim().split('#');

        let host = parts.next().filter(|host| !host.is_empty()).ok_or_else(invalid)?;
        let port = match parts.next() {
            Some(port) => port.parse().map_err(|_| invalid())?,
            None => DEFAULT_PORT,
        };
        let protocol = match parts.next() {
            Some(proto) if proto.eq_ignore_ascii_case("udp") => Protocol::Udp,
            Some(proto) if proto.eq_ignore_ascii_case("tcp") => Protocol::Tcp,
            Some(_) => return Err(invalid()),
            None => Protocol::Udp,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            port,
            protocol,
        })
    }
}

/// Parse a comma-separated upstream list.
pub fn parse_pool(list: &str) -> Result<Vec<Upstream>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::parse)
        .collect()
}

/// Forwards raw queries to a randomly chosen upstream.
///
/// Every relay opens a fresh socket or connection; nothing is pooled.
#[derive(Debug, Clone)]
pub struct ProxyClient {
    upstreams: Vec<Upstream>,
    timeout: Option<Duration>,
}

impl ProxyClient {
    pub fn new(upstreams: Vec<Upstream>) -> Self {
        Self {
            upstreams,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn upstreams(&self) -> &[Upstream] {
        &self.upstreams
    }

    /// Uniformly random pool member.
    pub fn pick(&self) -> Result<&Upstream, ProxyError> {
        self.upstreams
            .choose(&mut rand::rng())
            .ok_or(ProxyError::NoUpstream)
    }

    /// Relay `query` to a random upstream and return its raw reply.
    pub async fn relay(&self, query: &[u8]) -> Result<Vec<u8>, ProxyError> {
        let upstream = self.pick()?;
        self.relay_to(query, upstream).await
    }

    /// Relay `query` to `upstream` and return its raw reply.
    pub async fn relay_to(&self, query: &[u8], upstream: &Upstream) -> Result<Vec<u8>, ProxyError> {
        let exchange = async {
            match upstream.protocol {
                Protocol::Udp => relay_udp(query, upstream).await,
                Protocol::Tcp => relay_tcp(query, upstream).await,
            }
        };

        match self.timeout {
            Some(limit) => with_timeout(limit, upstream, exchange).await,
            None => exchange.await,
        }
    }
}

async fn with_timeout<F>(limit: Duration, upstream: &Upstream, exchange: F) -> Result<Vec<u8>, ProxyError>
where
    F: Future<Output = Result<Vec<u8>, ProxyError>>,
{
    tokio::time::timeout(limit, exchange)
        .await
        .map_err(|_| ProxyError::Timeout(upstream.to_string()))?
}

async fn relay_udp(query: &[u8], upstream: &Upstream) -> Result<Vec<u8>, ProxyError> {
    let server = upstream.resolve().await?;
    let local: SocketAddr = match server {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };

    let socket = UdpSocket::bind(local).await?;
    socket.connect(server).await?;
    socket.send(query).await?;

    let mut buf = vec![0u8; MAX_DNS_PACKET_SIZE];
    let len = socket.recv(&mut buf).await?;
    buf.truncate(len);

    debug!(upstream = %server, len, "UDP reply received");
    Ok(buf)
}

async fn relay_tcp(query: &[u8], upstream: &Upstream) -> Result<Vec<u8>, ProxyError> {
    let server = upstream.resolve().await?;
    let mut stream = TcpStream::connect(server).await?;
    stream.set_nodelay(true)?;

    write_frame(&mut stream, query).await?;
    let reply = read_frame(&mut stream).await?.ok_or(ProxyError::Closed)?;

    debug!(upstream = %server, len = reply.len(), "TCP reply received");
    Ok(reply)
}
