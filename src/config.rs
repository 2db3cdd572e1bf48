//! Building the initial record table from flags and a TOML file.
//!
//! A config file has one table per record type:
//!
//! ```toml
//! [A]
//! "*.thesprawl.org" = "192.0.2.1"
//! "www.thesprawl.org" = false
//! "*.wat.org" = { file = "payload.bin", chunk_size = 4 }
//! ```

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::matcher::GLOBAL_WILDCARD;
use crate::record::{RecordType, RecordValue};
use crate::store::Records;
use crate::synth;

/// Fake values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct FakeValues {
    pub ip: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub mail: Option<String>,
    pub alias: Option<String>,
    pub ns: Option<String>,
}

impl FakeValues {
    fn entries(&self) -> Vec<(RecordType, String)> {
        [
            (RecordType::A, self.ip.map(|ip| ip.to_string())),
            (RecordType::Aaaa, self.ipv6.map(|ip| ip.to_string())),
            (RecordType::Mx, self.mail.clone()),
            (RecordType::Cname, self.alias.clone()),
            (RecordType::Ns, self.ns.clone()),
        ]
        .into_iter()
        .filter_map(|(rtype, value)| value.map(|value| (rtype, value)))
        .collect()
    }

    fn has_address(&self) -> bool {
        self.ip.is_some() || self.ipv6.is_some()
    }
}

/// Which names the command-line fakes apply to.
#[derive(Debug, Clone, Default)]
pub enum DomainScope {
    /// Every name.
    #[default]
    All,
    /// Only these names; everything else is proxied.
    Only(Vec<String>),
    /// Every name except these.
    Except(Vec<String>),
}

impl DomainScope {
    fn is_restricted(&self) -> bool {
        !matches!(self, DomainScope::All)
    }
}

/// Split a comma-separated domain list, lower-casing each entry.
pub fn parse_domain_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|domain| domain.trim().to_lowercase())
        .filter(|domain| !domain.is_empty())
        .collect()
}

/// Expand command-line fakes into record entries.
pub fn expand_fakes(fakes: &FakeValues, scope: &DomainScope) -> Result<Records, ConfigError> {
    if scope.is_restricted() && !fakes.has_address() {
        return Err(ConfigError::MissingFakeAddress);
    }

    let mut records = Records::default();
    for (rtype, value) in fakes.entries() {
        let domains = records.entry(rtype).or_default();
        match scope {
            DomainScope::All => {
                info!(%rtype, record = %value, "cooking all replies");
                domains.insert(GLOBAL_WILDCARD.to_string(), RecordValue::literal(&value));
            }
            DomainScope::Only(names) => {
                for name in names {
                    info!(%rtype, record = %value, domain = %name, "cooking replies matching domain");
                    domains.insert(name.to_lowercase(), RecordValue::literal(&value));
                }
            }
            DomainScope::Except(names) => {
                for name in names {
                    info!(%rtype, record = %value, domain = %name, "cooking replies not matching domain");
                    domains.insert(name.to_lowercase(), RecordValue::Disabled);
                }
                domains.insert(GLOBAL_WILDCARD.to_string(), RecordValue::literal(&value));
            }
        }
    }

    Ok(records)
}

/// Read and parse a record file.
pub fn load_file(path: &Path) -> Result<Records, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_records(&contents)
}

/// Parse record tables from TOML text.
///
/// Tables that do not name a supported record type are skipped with a
/// warning. Literal values that would not encode are kept but reported.
pub fn parse_records(contents: &str) -> Result<Records, ConfigError> {
    let tables: BTreeMap<String, toml::Value> = toml::from_str(contents)?;

    let mut records = Records::default();
    for (section, table) in tables {
        let Ok(rtype) = section.parse::<RecordType>() else {
            warn!(section = %section, "record type is not supported, ignoring section");
            continue;
        };
        let entries = BTreeMap::<String, RecordValue>::deserialize(table)?;

        let domains = records.entry(rtype).or_default();
        for (domain, value) in entries {
            let domain = domain.trim().to_lowercase();
            if let RecordValue::Literal(literal) = &value {
                if let Err(e) = synth::encode(rtype, literal) {
                    warn!(%rtype, %domain, record = %literal, error = %e, "value will not synthesize");
                }
            }
            info!(%rtype, %domain, record = %value, "cooking replies");
            domains.insert(domain, value);
        }
    }

    Ok(records)
}

/// Layer `overrides` on top of `base`, entry by entry.
pub fn merge(base: &mut Records, overrides: Records) {
    for (rtype, domains) in overrides {
        base.entry(rtype).or_default().extend(domains);
    }
}
