use std::fs::OpenOptions;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use dnschef::config::{self, DomainScope, FakeValues};
use dnschef::error::ConfigError;
use dnschef::resolver::FailurePolicy;
use dnschef::server::{self, ServerConfig};
use dnschef::store::{RecordStore, Records};
use dnschef::upstream;

const DEFAULT_NAMESERVER: &str = "8.8.8.8";
const DEFAULT_NAMESERVER_V6: &str = "2001:4860:4860::8888";

#[derive(Parser)]
#[command(name = "dnschef")]
#[command(about = "DNS proxy that fakes selected answers", long_about = None)]
struct Args {
    /// IPv4 address for faked A answers
    #[arg(long, value_name = "192.0.2.1", help_heading = "Fake DNS records")]
    fakeip: Option<Ipv4Addr>,

    /// IPv6 address for faked AAAA answers
    #[arg(long, value_name = "2001:db8::1", help_heading = "Fake DNS records")]
    fakeipv6: Option<Ipv6Addr>,

    /// Mail exchanger for faked MX answers
    #[arg(long, value_name = "mail.fake.com", help_heading = "Fake DNS records")]
    fakemail: Option<String>,

    /// Target for faked CNAME answers
    #[arg(long, value_name = "www.fake.com", help_heading = "Fake DNS records")]
    fakealias: Option<String>,

    /// Name server for faked NS answers
    #[arg(long, value_name = "ns.fake.com", help_heading = "Fake DNS records")]
    fakens: Option<String>,

    /// TOML file of fake records; its entries win over the flags above
    #[arg(long, value_name = "FILE", help_heading = "Fake DNS records")]
    file: Option<PathBuf>,

    /// Only fake these comma-separated domains
    #[arg(long, value_name = "thesprawl.org,google.com", conflicts_with = "truedomains")]
    fakedomains: Option<String>,

    /// Fake every domain except these comma-separated ones
    #[arg(long, value_name = "thesprawl.org,google.com")]
    truedomains: Option<String>,

    /// Comma-separated upstream pool, each host[#port[#udp|tcp]]
    #[arg(long, value_name = "8.8.8.8#53 or 4.2.2.1#53#tcp")]
    nameservers: Option<String>,

    /// Listen address [default: 127.0.0.1, or ::1 with --ipv6]
    #[arg(short, long)]
    interface: Option<IpAddr>,

    /// Also listen for DNS over TCP
    #[arg(short, long)]
    tcp: bool,

    /// Use IPv6 defaults for the listener and upstream
    #[arg(short = '6', long)]
    ipv6: bool,

    /// Local port to listen on
    #[arg(short, long, default_value = "53")]
    port: u16,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, value_name = "FILE")]
    logfile: Option<PathBuf>,

    /// Serve the management API on this address
    #[arg(long, value_name = "127.0.0.1:8080")]
    api: Option<SocketAddr>,

    /// Give up on an upstream after this many seconds
    #[arg(long, value_name = "SECONDS")]
    proxy_timeout: Option<u64>,

    /// What to do when a matched value cannot be encoded
    #[arg(long, value_enum, default_value_t = FailurePolicy::Proxy)]
    on_synthesis_failure: FailurePolicy,
}

impl Args {
    fn fake_values(&self) -> FakeValues {
        FakeValues {
            ip: self.fakeip,
            ipv6: self.fakeipv6,
            mail: self.fakemail.clone(),
            alias: self.fakealias.clone(),
            ns: self.fakens.clone(),
        }
    }

    fn domain_scope(&self) -> DomainScope {
        match (&self.fakedomains, &self.truedomains) {
            (Some(list), _) => DomainScope::Only(config::parse_domain_list(list)),
            (None, Some(list)) => DomainScope::Except(config::parse_domain_list(list)),
            (None, None) => DomainScope::All,
        }
    }

    fn records(&self) -> Result<Records, ConfigError> {
        let mut records = config::expand_fakes(&self.fake_values(), &self.domain_scope())?;
        if let Some(path) = &self.file {
            debug!(path = %path.display(), "parsing config file");
            config::merge(&mut records, config::load_file(path)?);
        }

        if records.is_empty() {
            info!("running in full proxy mode as no fake records were given");
        }
        Ok(records)
    }

    fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        let interface = self.interface.unwrap_or(if self.ipv6 {
            IpAddr::V6(Ipv6Addr::LOCALHOST)
        } else {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        });
        let nameservers = match &self.nameservers {
            Some(list) => list.as_str(),
            None if self.ipv6 => DEFAULT_NAMESERVER_V6,
            None => DEFAULT_NAMESERVER,
        };

        Ok(ServerConfig {
            interface,
            port: self.port,
            tcp: self.tcp,
            upstreams: upstream::parse_pool(nameservers)?,
            proxy_timeout: self.proxy_timeout.map(Duration::from_secs),
            failure_policy: self.on_synthesis_failure,
            api: self.api,
        })
    }
}

fn init_logging(verbose: bool, logfile: Option<&Path>) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match logfile {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.logfile.as_deref())?;
    debug!("running in verbose mode");

    let store = Arc::new(RecordStore::from_records(args.records()?));
    let config = args.server_config()?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let local = tokio::task::LocalSet::new();
    local
        .block_on(&rt, server::run(config, store))
        .context("failed to start DNS listener")
}
