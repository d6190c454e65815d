//! RadioDNS name resolution.
//!
//! A station's derived hostname is first mapped to its canonical name with a
//! CNAME query, then each application is located with an SRV query under
//! that canonical name. Failures are routine (most stations publish few
//! applications) and only ever show up as an absent or empty result.

use std::io;

use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::Resolver;
use log::{debug, info, warn};

use radiovis_protocol::{ResolutionFailure, ServiceEndpoint};

/// One SRV answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    pub target: String,
    pub port: u16,
    pub priority: u16,
    pub weight: u16,
}

/// Raw DNS access.
pub trait DnsBackend: Send + Sync {
    /// CNAME targets for `host`.
    fn lookup_cname(&self, host: &str) -> Result<Vec<String>, ResolutionFailure>;

    /// SRV records for `query`.
    fn lookup_srv(&self, query: &str) -> Result<Vec<SrvRecord>, ResolutionFailure>;
}

/// [`DnsBackend`] using the system resolver configuration.
pub struct HickoryBackend {
    resolver: Resolver,
}

impl HickoryBackend {
    /// Read `/etc/resolv.conf` (or the platform equivalent).
    pub fn from_system_conf() -> io::Result<Self> {
        Ok(Self {
            resolver: Resolver::from_system_conf()?,
        })
    }
}

impl DnsBackend for HickoryBackend {
    fn lookup_cname(&self, host: &str) -> Result<Vec<String>, ResolutionFailure> {
        let lookup = self
            .resolver
            .lookup(host, RecordType::CNAME)
            .map_err(classify)?;

        Ok(lookup
            .iter()
            .filter_map(|rdata| match rdata {
                RData::CNAME(cname) => Some(cname.0.to_utf8()),
                _ => None,
            })
            .collect())
    }

    fn lookup_srv(&self, query: &str) -> Result<Vec<SrvRecord>, ResolutionFailure> {
        let lookup = self.resolver.srv_lookup(query).map_err(classify)?;

        Ok(lookup
            .iter()
            .map(|srv| SrvRecord {
                target: srv.target().to_utf8(),
                port: srv.port(),
                priority: srv.priority(),
                weight: srv.weight(),
            })
            .collect())
    }
}

fn classify(err: ResolveError) -> ResolutionFailure {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. }
            if *response_code == ResponseCode::NXDomain =>
        {
            ResolutionFailure::NxDomain
        }
        ResolveErrorKind::NoRecordsFound { .. } => ResolutionFailure::NoAnswer,
        _ => ResolutionFailure::Other(err.to_string()),
    }
}

/// Names that denote this machine and are never looked up.
#[derive(Debug, Clone, Default)]
pub struct LocalAliases {
    names: Vec<String>,
}

impl LocalAliases {
    /// Loopback names plus the local IP, short hostname and FQDN.
    pub fn detect() -> Self {
        let mut names = vec!["localhost".to_string(), "127.0.0.1".to_string()];

        match dns_lookup::get_hostname() {
            Ok(hostname) => {
                if let Ok(addrs) = dns_lookup::lookup_host(&hostname) {
                    if let Some(ip) = addrs.iter().find(|ip| ip.is_ipv4()) {
                        names.push(ip.to_string());
                        if let Ok(fqdn) = dns_lookup::lookup_addr(ip) {
                            names.push(fqdn);
                        }
                    }
                }
                names.push(hostname);
            }
            Err(e) => debug!("Could not read local hostname: {}", e),
        }

        let aliases = Self::from_names(names);
        debug!("Local aliases: {:?}", aliases.names);
        aliases
    }

    /// Exactly these names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        Self { names }
    }

    pub fn contains(&self, host: &str) -> bool {
        self.names.iter().any(|name| name == host)
    }
}

/// Resolves hostnames to canonical names and service endpoints.
pub struct NameResolver<B = HickoryBackend> {
    backend: B,
    local: LocalAliases,
}

impl NameResolver<HickoryBackend> {
    /// Resolver over the system DNS configuration.
    pub fn system() -> io::Result<Self> {
        Ok(Self::with_backend(
            HickoryBackend::from_system_conf()?,
            LocalAliases::detect(),
        ))
    }
}

impl<B: DnsBackend> NameResolver<B> {
    pub fn with_backend(backend: B, local: LocalAliases) -> Self {
        Self { backend, local }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Canonical name of `host`, or `None` when it has none.
    ///
    /// Local aliases are returned unchanged without a query. Exactly one
    /// CNAME record is required; any other count is treated as absent.
    pub fn get_canonical_name(&self, host: &str) -> Option<String> {
        if self.local.contains(host) {
            debug!("{} is local", host);
            return Some(host.to_string());
        }

        match self.backend.lookup_cname(host) {
            Ok(names) if names.len() == 1 => {
                let name = strip_root(&names[0]).to_string();
                info!("CNAME {} -> {}", host, name);
                Some(name)
            }
            Ok(names) => {
                debug!("{} has {} CNAME records", host, names.len());
                None
            }
            Err(ResolutionFailure::NoAnswer) | Err(ResolutionFailure::NxDomain) => {
                debug!("No CNAME for {}", host);
                None
            }
            Err(e) => {
                warn!("CNAME lookup for {} failed: {}", host, e);
                None
            }
        }
    }

    /// Endpoints of service `prefix` under `canonical_name`, in answer order.
    pub fn get_services(
        &self,
        prefix: &str,
        canonical_name: &str,
        display_name: &str,
    ) -> Vec<ServiceEndpoint> {
        let query = format!("{}.{}", prefix, canonical_name);

        match self.backend.lookup_srv(&query) {
            Ok(records) => records
                .into_iter()
                .map(|record| ServiceEndpoint {
                    name: display_name.to_string(),
                    query: query.clone(),
                    target: strip_root(&record.target).to_string(),
                    port: record.port,
                    priority: record.priority,
                    weight: record.weight,
                })
                .collect(),
            Err(ResolutionFailure::NoAnswer) | Err(ResolutionFailure::NxDomain) => {
                debug!("No {} service at {}", display_name, query);
                Vec::new()
            }
            Err(e) => {
                warn!("SRV lookup for {} failed: {}", query, e);
                Vec::new()
            }
        }
    }
}

/// Drop the trailing root label.
fn strip_root(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Canned answers; counts every query.
    #[derive(Default)]
    pub struct MockBackend {
        pub cname: HashMap<String, Result<Vec<String>, ResolutionFailure>>,
        pub srv: HashMap<String, Result<Vec<SrvRecord>, ResolutionFailure>>,
        pub queries: AtomicUsize,
    }

    impl MockBackend {
        pub fn queries(&self) -> usize {
            self.queries.load(Ordering::SeqCst)
        }
    }

    impl DnsBackend for MockBackend {
        fn lookup_cname(&self, host: &str) -> Result<Vec<String>, ResolutionFailure> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.cname
                .get(host)
                .cloned()
                .unwrap_or(Err(ResolutionFailure::NxDomain))
        }

        fn lookup_srv(&self, query: &str) -> Result<Vec<SrvRecord>, ResolutionFailure> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.srv
                .get(query)
                .cloned()
                .unwrap_or(Err(ResolutionFailure::NxDomain))
        }
    }

    pub fn srv(target: &str, port: u16, priority: u16, weight: u16) -> SrvRecord {
        SrvRecord {
            target: target.to_string(),
            port,
            priority,
            weight,
        }
    }
}
