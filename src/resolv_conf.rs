//! Partial Unix `resolv.conf(5)` parser

use std::cmp::min;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::config::{ConfigProvider, DnsConfig};
use crate::hostname::get_hostname;

/// port for DNS communication
const DNS_PORT: u16 = 53;

/// Maximum number of name servers loaded from `resolv.conf`
pub const MAX_NAME_SERVERS: usize = 3;

/// Maximum allowed value of `"options timeout:n"`, in seconds
pub const MAX_TIMEOUT: u64 = 30;

/// Path to system `resolv.conf`
pub const RESOLV_CONF_PATH: &str = "/etc/resolv.conf";

/// Reads the system `resolv.conf` on every `load`.
#[derive(Copy, Clone, Debug, Default)]
pub struct ResolvConf;

impl ConfigProvider for ResolvConf {
    fn load(&self) -> io::Result<DnsConfig> {
        load()
    }
}

/// Examines system `resolv.conf` and returns a configuration loosely based
/// on its contents. If the file cannot be read or lacks required directives,
/// an error is returned.
pub fn load() -> io::Result<DnsConfig> {
    let mut cfg = parse(BufReader::new(File::open(RESOLV_CONF_PATH)?))?;

    if cfg.search.is_empty() {
        let host = get_hostname()?;

        if let Some(pos) = host.find('.') {
            cfg.search = vec![host[pos + 1..].to_owned()];
        }
    }

    Ok(cfg)
}

/// Parses `resolv.conf` contents.
///
/// `options timeout:n` sets the time spent on one server before failing
/// over to the next; it is converted to a number of resend intervals.
pub fn parse<R: BufRead>(r: R) -> io::Result<DnsConfig> {
    let mut cfg = DnsConfig::default();

    for line in r.lines() {
        let line = line?;

        if line.is_empty() || line.starts_with(|c: char| c == '#' || c == ';') {
            continue;
        }

        let mut words = line.split_whitespace();

        let name = match words.next() {
            Some(name) => name,
            None => continue,
        };

        match name {
            "nameserver" => {
                if let Some(ip) = words.next() {
                    if cfg.name_servers.len() < MAX_NAME_SERVERS {
                        match ip.parse::<IpAddr>() {
                            Ok(ip) => cfg.name_servers.push(SocketAddr::new(ip, DNS_PORT)),
                            Err(_) => debug!("ignoring nameserver {:?}", ip),
                        }
                    }
                }
            }
            "domain" => {
                if let Some(domain) = words.next() {
                    cfg.search = vec![domain.trim_end_matches('.').to_owned()];
                }
            }
            "search" => {
                cfg.search = words
                    .map(|s| s.trim_end_matches('.'))
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_owned())
                    .collect();
            }
            "options" => {
                for opt in words {
                    let (opt, value) = match opt.find(':') {
                        Some(pos) => (&opt[..pos], &opt[pos + 1..]),
                        None => (opt, ""),
                    };

                    if opt == "timeout" {
                        if let Ok(n) = value.parse::<u64>() {
                            let budget = Duration::from_secs(min(n.max(1), MAX_TIMEOUT));
                            cfg.max_resends = resends_within(budget, cfg.resend_interval);
                        }
                    }
                }
            }
            _ => (),
        }
    }

    if cfg.name_servers.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            "no nameserver directives in resolv.conf",
        ));
    }

    Ok(cfg)
}

fn resends_within(budget: Duration, interval: Duration) -> u32 {
    let interval = interval.as_millis().max(1);
    let n = (budget.as_millis() + interval - 1) / interval;
    n.clamp(1, u32::MAX as u128) as u32
}
