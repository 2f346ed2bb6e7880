//! DNS resolver configuration

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// Default interval between resends of an unanswered request.
pub const DEFAULT_RESEND_INTERVAL: Duration = Duration::from_millis(500);

/// Default number of times an unanswered request is resent to one server
/// before that server is given up on.
pub const DEFAULT_MAX_RESENDS: u32 = 60;

/// Default cap on the number of addresses kept from one answer.
pub const DEFAULT_MAX_ADDRESSES: usize = 10;

/// When the platform resolver is consulted instead of, or after, the
/// configured name servers.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ExternalPolicy {
    /// Only the configured name servers are used.
    #[default]
    None,
    /// The platform resolver answers every request; no packets are sent.
    PreferExternalFirst,
    /// The platform resolver gets one final attempt once every configured
    /// name server has timed out.
    PreferExternalLast,
}

/// Configuration shared by every resolution started on one manager.
#[derive(Clone, Debug)]
pub struct DnsConfig {
    /// Ranked list of name servers; index 0 is tried first
    pub name_servers: Vec<SocketAddr>,
    /// List of search domains, tried in order for unqualified names
    pub search: Vec<String>,

    /// Duration between resends of an unanswered request
    pub resend_interval: Duration,
    /// Number of resends to one server before it is given up on
    pub max_resends: u32,
    /// Maximum number of addresses kept from one answer
    pub max_addresses: usize,

    /// Use of the platform resolver
    pub external: ExternalPolicy,
}

impl DnsConfig {
    /// Returns a `DnsConfig` using the given set of name servers,
    /// with all other settings at their default values.
    pub fn with_name_servers(name_servers: Vec<SocketAddr>) -> DnsConfig {
        DnsConfig {
            name_servers,
            ..DnsConfig::default()
        }
    }

    /// Replaces the search list with the entries of a suffix search string.
    pub fn with_search_string(mut self, search: &str) -> DnsConfig {
        self.search = parse_search_list(search);
        self
    }
}

impl Default for DnsConfig {
    fn default() -> DnsConfig {
        DnsConfig {
            name_servers: Vec::new(),
            search: Vec::new(),

            resend_interval: DEFAULT_RESEND_INTERVAL,
            max_resends: DEFAULT_MAX_RESENDS,
            max_addresses: DEFAULT_MAX_ADDRESSES,

            external: ExternalPolicy::None,
        }
    }
}

/// Source of the system's resolver settings.
pub trait ConfigProvider {
    /// Produces the current configuration.
    fn load(&self) -> io::Result<DnsConfig>;
}

/// A provider that always hands out the same configuration.
#[derive(Clone, Debug)]
pub struct StaticConfig(pub DnsConfig);

impl ConfigProvider for StaticConfig {
    fn load(&self) -> io::Result<DnsConfig> {
        Ok(self.0.clone())
    }
}

/// Splits a suffix search string into its entries.
///
/// Entries may be separated by whitespace, commas or semicolons. Leading
/// and trailing dots are removed from each entry and empty entries are
/// dropped.
pub fn parse_search_list(search: &str) -> Vec<String> {
    search
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .map(|s| s.trim_matches('.'))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_owned())
        .collect()
}

/// Returns the system's default configuration.
#[cfg(unix)]
pub fn default_config() -> io::Result<DnsConfig> {
    crate::resolv_conf::load()
}

/// Returns the system's default configuration.
#[cfg(not(unix))]
pub fn default_config() -> io::Result<DnsConfig> {
    Err(io::Error::new(
        io::ErrorKind::Other,
        "no system resolver configuration on this platform",
    ))
}
