//! Seams to the event loop: datagram transport and timers.
//!
//! The manager never owns a socket or a clock directly. It binds and sends
//! through a `Transport` and arms one-shot timers through a `TimerService`;
//! whoever drives the event loop feeds received datagrams and expired timers
//! back through `SharedManager::data_ready` and `SharedManager::timer_fired`.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

/// Identifies a socket bound through a `Transport`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SocketHandle(pub usize);

/// Identifies the resend timer of one name server, by server index.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TimerToken(pub usize);

/// Sends DNS datagrams.
pub trait Transport {
    /// Binds a new socket to the given local address.
    fn bind(&mut self, local: SocketAddr) -> io::Result<SocketHandle>;

    /// Sends `data` to `dest` from the socket `handle`.
    fn send(&mut self, handle: SocketHandle, data: &[u8], dest: SocketAddr) -> io::Result<()>;

    /// Closes a socket. Datagrams still queued for it are discarded.
    fn close(&mut self, handle: SocketHandle);
}

/// Arms one-shot timers.
pub trait TimerService {
    /// Starts or restarts the timer `token` to fire once after `after`.
    fn start(&mut self, token: TimerToken, after: Duration) -> io::Result<()>;

    /// Stops the timer `token`. Stopping a timer that is not running is a
    /// no-op.
    fn stop(&mut self, token: TimerToken);
}

/// Returns the unspecified local address of the same family as `server`.
pub fn local_address_for(server: &SocketAddr) -> SocketAddr {
    match server {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    }
}

/// Compares two `SocketAddr`s, checking for IPv4-in-IPv6 addresses
pub fn addresses_match(a: &SocketAddr, b: &SocketAddr) -> bool {
    match (*a, *b) {
        // Simple comparisons; (V4 == V4) or (V6 == V6)
        (SocketAddr::V4(ref a), SocketAddr::V4(ref b)) => a == b,
        (SocketAddr::V6(ref a), SocketAddr::V6(ref b)) => a == b,
        // Not-so-simple comparison; V4 == maybe-V6-wrapped-V4
        (SocketAddr::V6(ref a), SocketAddr::V4(ref b)) => match a.ip().to_ipv4_mapped() {
            Some(ref a4) => a4 == b.ip() && a.port() == b.port(),
            None => false,
        },
        (SocketAddr::V4(..), SocketAddr::V6(..)) => addresses_match(b, a),
    }
}
