//! Platform resolvers consulted in place of, or after, the configured name
//! servers.

use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};

use crate::resolver::ResolveError;

/// A resolver provided by the host platform.
///
/// `lookup` runs to completion before returning. The manager calls it from
/// inside `Resolver::resolve` (external-first) or from inside a timer
/// callback (external-last), so an implementation that blocks stalls the
/// event loop for that long.
pub trait ExternalResolver {
    /// Resolves `hostname` to its IPv4 addresses.
    fn lookup(&mut self, hostname: &str) -> Result<Vec<Ipv4Addr>, ResolveError>;
}

/// Uses the platform's own name lookup (`getaddrinfo` on Unix).
///
/// This call blocks.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemLookup;

impl ExternalResolver for SystemLookup {
    fn lookup(&mut self, hostname: &str) -> Result<Vec<Ipv4Addr>, ResolveError> {
        let addrs = (hostname, 0).to_socket_addrs().map_err(|e| {
            debug!("system lookup of {:?} failed: {}", hostname, e);
            ResolveError::NotFound
        })?;

        let v4 = addrs
            .filter_map(|a| match a.ip() {
                IpAddr::V4(ip) => Some(ip),
                IpAddr::V6(_) => None,
            })
            .collect::<Vec<_>>();

        if v4.is_empty() {
            Err(ResolveError::NotFound)
        } else {
            Ok(v4)
        }
    }
}
