//! DNS server orchestration.
//!
//! Binds transports, wires them to a shared resolver and runs the server.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::api::{self, ApiState};
use crate::querylog::QueryLog;
use crate::resolver::{FailurePolicy, Resolver};
use crate::stats::Stats;
use crate::store::RecordStore;
use crate::transport::{tcp::TcpTransport, udp::UdpTransport};
use crate::upstream::{ProxyClient, Upstream};

const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for the DNS server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Local address to listen on.
    pub interface: IpAddr,
    pub port: u16,
    /// Also listen for DNS over TCP on the same address.
    pub tcp: bool,
    /// Pool that unmatched queries are relayed to.
    pub upstreams: Vec<Upstream>,
    /// Give up on an upstream after this long. `None` waits indefinitely.
    pub proxy_timeout: Option<Duration>,
    pub failure_policy: FailurePolicy,
    /// Management API address, if enabled.
    pub api: Option<SocketAddr>,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.interface, self.port)
    }
}

/// A server with every socket bound but nothing accepted yet.
pub struct Server {
    udp: UdpTransport,
    tcp: Option<TcpTransport>,
    api: Option<TcpListener>,
    resolver: Rc<Resolver>,
    store: Arc<RecordStore>,
}

impl Server {
    /// Bind every listener. Any failure here is fatal to startup.
    pub async fn bind(config: &ServerConfig, store: Arc<RecordStore>) -> io::Result<Self> {
        let bind_addr = config.bind_addr();

        let udp = UdpTransport::bind(bind_addr).await?;
        let tcp = if config.tcp {
            // Share UDP's port, even when it was picked by the OS.
            let port = udp.local_addr()?.port();
            Some(TcpTransport::bind(SocketAddr::new(config.interface, port)).await?)
        } else {
            None
        };
        let api = match config.api {
            Some(addr) => Some(TcpListener::bind(addr).await?),
            None => None,
        };

        let proxy = ProxyClient::new(config.upstreams.clone()).with_timeout(config.proxy_timeout);
        let resolver = Resolver::new(store.clone(), proxy).with_policy(config.failure_policy);

        Ok(Self {
            udp,
            tcp,
            api,
            resolver: Rc::new(resolver),
            store,
        })
    }

    pub fn udp_addr(&self) -> io::Result<SocketAddr> {
        self.udp.local_addr()
    }

    pub fn tcp_addr(&self) -> Option<io::Result<SocketAddr>> {
        self.tcp.as_ref().map(TcpTransport::local_addr)
    }

    pub fn api_addr(&self) -> Option<io::Result<SocketAddr>> {
        self.api.as_ref().map(TcpListener::local_addr)
    }

    pub fn stats(&self) -> Arc<Stats> {
        self.resolver.stats().clone()
    }

    pub fn query_log(&self) -> Arc<QueryLog> {
        self.resolver.query_log().clone()
    }

    /// Spawn every listener onto the current `LocalSet` and return.
    pub fn start(self) {
        if let Some(listener) = self.api {
            let state = ApiState {
                store: self.store,
                stats: self.resolver.stats().clone(),
                query_log: self.resolver.query_log().clone(),
            };
            tokio::task::spawn_local(async move {
                if let Err(e) = api::serve(listener, state).await {
                    error!(error = %e, "management API stopped");
                }
            });
        }

        if let Some(tcp) = self.tcp {
            tcp.start(self.resolver.clone());
        }
        self.udp.start(self.resolver);
    }
}

/// Run the DNS server with the given configuration.
///
/// Starts the listeners and logs traffic counters every minute. Runs
/// indefinitely; only binding can fail.
pub async fn run(config: ServerConfig, store: Arc<RecordStore>) -> io::Result<()> {
    let server = Server::bind(&config, store.clone()).await?;
    let stats = server.stats();

    let upstreams: Vec<String> = config.upstreams.iter().map(ToString::to_string).collect();
    info!(
        interface = %config.interface,
        port = server.udp_addr()?.port(),
        tcp = config.tcp,
        nameservers = %upstreams.join(", "),
        records = store.len(),
        "DNSChef is active"
    );

    server.start();

    let mut interval = tokio::time::interval(STATS_INTERVAL);
    interval.tick().await; // Skip first immediate tick
    loop {
        interval.tick().await;
        let snapshot = stats.snapshot_and_reset();
        info!(
            requests = snapshot.requests,
            cooked = snapshot.cooked,
            proxied = snapshot.proxied,
            dropped = snapshot.dropped,
            proxy_failures = snapshot.proxy_failures,
            avg_response_ms = format_args!("{:.2}", snapshot.avg_response_ms),
            "stats"
        );
    }
}
