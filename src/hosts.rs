//! Implements parsing the system hosts file to produce a host table, and an
//! external resolver answering from that table.

use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use crate::external::ExternalResolver;
use crate::resolver::ResolveError;

/// Represents a host table, consisting of addresses mapped to names.
#[derive(Clone, Debug, Default)]
pub struct HostTable {
    /// Contained hosts
    pub hosts: Vec<Host>,
}

impl HostTable {
    /// Returns the IPv4 addresses of every host matching the given name,
    /// in file order. Matching ignores ASCII case and a trailing dot.
    pub fn find_ipv4(&self, name: &str) -> Vec<Ipv4Addr> {
        let name = name.trim_end_matches('.');

        self.hosts
            .iter()
            .filter(|h| h.is_named(name))
            .filter_map(|h| match h.address {
                IpAddr::V4(ip) => Some(ip),
                IpAddr::V6(_) => None,
            })
            .collect()
    }

    /// Returns the first host matching the given name.
    ///
    /// If no match is found, `None` is returned.
    pub fn find_host_by_name(&self, name: &str) -> Option<&Host> {
        let name = name.trim_end_matches('.');
        self.hosts.iter().find(|h| h.is_named(name))
    }
}

/// Represents a single host within a host table.
#[derive(Clone, Debug)]
pub struct Host {
    /// Host address
    pub address: IpAddr,
    /// Canonical host name
    pub name: String,
    /// Host aliases
    pub aliases: Vec<String>,
}

impl Host {
    fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

/// Returns the absolute path to the system hosts file.
pub fn host_file() -> PathBuf {
    host_file_impl()
}

#[cfg(unix)]
fn host_file_impl() -> PathBuf {
    PathBuf::from("/etc/hosts")
}

#[cfg(windows)]
fn host_file_impl() -> PathBuf {
    use std::env::var_os;

    match var_os("SystemRoot") {
        Some(root) => PathBuf::from(root).join("System32/drivers/etc/hosts"),
        None => PathBuf::from("C:/Windows/System32/drivers/etc/hosts"),
    }
}

/// Loads a host table from the given filename.
///
/// If an error is encountered in opening the file or reading its contents
/// or if the file is malformed, the error is returned.
pub fn load_hosts(path: &Path) -> io::Result<HostTable> {
    parse_host_table(&fs::read_to_string(path)?)
}

/// Attempts to parse a host table in the hosts file format.
pub fn parse_host_table(data: &str) -> io::Result<HostTable> {
    let mut hosts = Vec::new();

    for line in data.lines() {
        let line = match line.find('#') {
            Some(pos) => &line[..pos],
            None => line,
        };

        let mut words = line.split_whitespace();

        let addr_str = match words.next() {
            Some(w) => w,
            None => continue,
        };

        let address = addr_str.parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid address: {}", addr_str),
            )
        })?;

        let name = words
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing names"))?;

        hosts.push(Host {
            address,
            name: name.to_owned(),
            aliases: words.map(|s| s.to_owned()).collect(),
        });
    }

    Ok(HostTable { hosts })
}

/// External resolver answering from a host table.
///
/// Lookups never block, which makes this the natural choice for the
/// external-first policy.
#[derive(Clone, Debug, Default)]
pub struct HostsFileResolver {
    table: HostTable,
}

impl HostsFileResolver {
    /// Wraps an already loaded table.
    pub fn new(table: HostTable) -> HostsFileResolver {
        HostsFileResolver { table }
    }

    /// Loads the system hosts file.
    pub fn system() -> io::Result<HostsFileResolver> {
        load_hosts(&host_file()).map(HostsFileResolver::new)
    }
}

impl ExternalResolver for HostsFileResolver {
    fn lookup(&mut self, hostname: &str) -> Result<Vec<Ipv4Addr>, ResolveError> {
        let found = self.table.find_ipv4(hostname);
        if found.is_empty() {
            Err(ResolveError::NotFound)
        } else {
            Ok(found)
        }
    }
}

#[cfg(test)]
mod test {
    use super::{parse_host_table, HostsFileResolver};
    use crate::external::ExternalResolver;
    use crate::resolver::ResolveError;
    use std::net::{IpAddr, Ipv4Addr};

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    const HOSTS: &str = "\
# Comment line
127.0.0.1       localhost
::1             ip6-localhost localhost

192.168.10.1    foo foo.bar foo.local # Mid-line comment
192.168.10.2    FOO.bar
";

    #[test]
    fn test_hosts() {
        let hosts = parse_host_table(HOSTS).unwrap();

        assert_eq!(hosts.find_ipv4("localhost"), [Ipv4Addr::LOCALHOST]);
        assert!(hosts.find_ipv4("ip6-localhost").is_empty());
        assert_eq!(
            hosts.find_ipv4("foo.bar."),
            [Ipv4Addr::new(192, 168, 10, 1), Ipv4Addr::new(192, 168, 10, 2)]
        );
        assert!(hosts.find_ipv4("missing").is_empty());

        let host = hosts.find_host_by_name("foo.local").unwrap();

        assert_eq!(host.address, ip("192.168.10.1"));
        assert_eq!(host.name, "foo");
        assert_eq!(host.aliases, ["foo.bar", "foo.local"]);
    }

    #[test]
    fn test_malformed() {
        assert!(parse_host_table("not-an-ip foo\n").is_err());
        assert!(parse_host_table("10.0.0.1\n").is_err());
    }

    #[test]
    fn test_resolver() {
        let mut r = HostsFileResolver::new(parse_host_table(HOSTS).unwrap());

        assert_eq!(r.lookup("LOCALHOST"), Ok(vec![Ipv4Addr::LOCALHOST]));
        assert_eq!(r.lookup("printer"), Err(ResolveError::NotFound));
    }
}
