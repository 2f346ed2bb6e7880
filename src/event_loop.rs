//! Default event loop, driving a manager with non-blocking UDP sockets.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::rc::Rc;
use std::time::{Duration, Instant};

use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Registry, Token};
use slab::Slab;

use crate::config::{default_config, DnsConfig};
use crate::message::MESSAGE_LIMIT;
use crate::resolver::{ResolveError, Resolver, ResolverId, ResolverListener, SharedManager};
use crate::socket::{SocketHandle, TimerService, TimerToken, Transport};

/// Sockets and deadlines shared between the loop and the manager's
/// transport and timer service.
struct LoopIo {
    registry: Registry,
    sockets: Slab<UdpSocket>,
    timers: HashMap<TimerToken, Instant>,
}

/// Polls the sockets of one manager and fires its resend timers.
pub struct EventLoop {
    poll: Poll,
    events: Events,
    io: Rc<RefCell<LoopIo>>,
}

impl EventLoop {
    /// Creates an event loop.
    pub fn new() -> io::Result<EventLoop> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;

        Ok(EventLoop {
            poll,
            events: Events::with_capacity(64),
            io: Rc::new(RefCell::new(LoopIo {
                registry,
                sockets: Slab::new(),
                timers: HashMap::new(),
            })),
        })
    }

    /// Creates a manager whose sockets and timers belong to this loop.
    pub fn manager(&self, config: DnsConfig) -> SharedManager {
        SharedManager::new(
            config,
            LoopTransport(self.io.clone()),
            LoopTimers(self.io.clone()),
        )
    }

    /// Returns whether no timer is armed, meaning nothing is in flight.
    pub fn is_idle(&self) -> bool {
        self.io.borrow().timers.is_empty()
    }

    /// Waits for socket readiness or the next timer deadline, at most
    /// `max_wait`, and feeds what happened to `manager`.
    pub fn run_once(&mut self, manager: &SharedManager, max_wait: Option<Duration>) -> io::Result<()> {
        let now = Instant::now();
        let next = self.io.borrow().timers.values().min().copied();
        let mut timeout = next.map(|at| at.saturating_duration_since(now));

        if let Some(max) = max_wait {
            timeout = Some(timeout.map_or(max, |t| t.min(max)));
        }

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => (),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e),
        }

        let mut received = Vec::new();
        {
            let io = self.io.borrow();

            for event in self.events.iter() {
                let Token(key) = event.token();
                let sock = match io.sockets.get(key) {
                    Some(sock) => sock,
                    None => continue,
                };

                loop {
                    let mut buf = [0; MESSAGE_LIMIT];
                    match sock.recv_from(&mut buf) {
                        Ok((n, src)) => received.push((SocketHandle(key), buf[..n].to_vec(), src)),
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(e) => {
                            debug!("receive on socket {} failed: {}", key, e);
                            break;
                        }
                    }
                }
            }
        }

        for (handle, data, src) in received {
            manager.data_ready(handle, &data, src);
        }

        for token in self.take_expired(Instant::now()) {
            manager.timer_fired(token);
        }

        Ok(())
    }

    /// Runs until `done` returns `true` or `deadline` passes. Returns the
    /// final value of `done`.
    pub fn run_until<F>(
        &mut self,
        manager: &SharedManager,
        deadline: Option<Instant>,
        mut done: F,
    ) -> io::Result<bool>
    where
        F: FnMut() -> bool,
    {
        while !done() {
            let max_wait = match deadline {
                Some(at) => {
                    let now = Instant::now();
                    if now >= at {
                        return Ok(false);
                    }
                    Some(at - now)
                }
                None => None,
            };
            self.run_once(manager, max_wait)?;
        }
        Ok(true)
    }

    fn take_expired(&mut self, now: Instant) -> Vec<TimerToken> {
        let mut io = self.io.borrow_mut();
        let mut expired = io
            .timers
            .iter()
            .filter(|&(_, &at)| at <= now)
            .map(|(&token, _)| token)
            .collect::<Vec<_>>();
        expired.sort();

        for token in &expired {
            io.timers.remove(token);
        }
        expired
    }
}

struct LoopTransport(Rc<RefCell<LoopIo>>);

impl Transport for LoopTransport {
    fn bind(&mut self, local: SocketAddr) -> io::Result<SocketHandle> {
        let mut io = self.0.borrow_mut();
        let mut sock = UdpSocket::bind(local)?;

        let key = io.sockets.vacant_key();
        io.registry.register(&mut sock, Token(key), Interest::READABLE)?;
        io.sockets.insert(sock);

        debug!("bound socket {} to {}", key, local);
        Ok(SocketHandle(key))
    }

    fn send(&mut self, handle: SocketHandle, data: &[u8], dest: SocketAddr) -> io::Result<()> {
        let io = self.0.borrow();
        let sock = io
            .sockets
            .get(handle.0)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket closed"))?;

        let n = sock.send_to(data, dest)?;
        if n != data.len() {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "short send"));
        }
        Ok(())
    }

    fn close(&mut self, handle: SocketHandle) {
        let mut io = self.0.borrow_mut();
        if let Some(mut sock) = io.sockets.try_remove(handle.0) {
            if let Err(e) = io.registry.deregister(&mut sock) {
                debug!("deregister of socket {} failed: {}", handle.0, e);
            }
        }
    }
}

struct LoopTimers(Rc<RefCell<LoopIo>>);

impl TimerService for LoopTimers {
    fn start(&mut self, token: TimerToken, after: Duration) -> io::Result<()> {
        self.0.borrow_mut().timers.insert(token, Instant::now() + after);
        Ok(())
    }

    fn stop(&mut self, token: TimerToken) {
        self.0.borrow_mut().timers.remove(&token);
    }
}

#[derive(Default)]
struct Collect(RefCell<Option<Result<Vec<Ipv4Addr>, ResolveError>>>);

impl ResolverListener for Collect {
    fn on_resolved(&self, _id: ResolverId, addresses: &[Ipv4Addr]) {
        *self.0.borrow_mut() = Some(Ok(addresses.to_vec()));
    }

    fn on_resolver_error(&self, _id: ResolverId, error: ResolveError) {
        *self.0.borrow_mut() = Some(Err(error));
    }
}

/// Resolves a hostname to its IPv4 addresses using the system
/// configuration, blocking until the result is known.
///
/// # Example
///
/// ```no_run
/// use resolve_stub::resolve_host;
/// # use std::io;
///
/// # fn _foo() -> io::Result<()> {
/// for addr in resolve_host("rust-lang.org")? {
///     println!("found address: {}", addr);
/// }
/// # Ok(())
/// # }
/// ```
pub fn resolve_host(host: &str) -> io::Result<Vec<Ipv4Addr>> {
    resolve_host_with(default_config()?, host)
}

/// Resolves a hostname using the given configuration, blocking until the
/// result is known.
pub fn resolve_host_with(config: DnsConfig, host: &str) -> io::Result<Vec<Ipv4Addr>> {
    let mut event_loop = EventLoop::new()?;
    let manager = event_loop.manager(config);
    let result = Rc::new(Collect::default());
    let resolver = Resolver::new(&manager, result.clone());

    resolver.resolve(host)?;
    event_loop.run_until(&manager, None, || result.0.borrow().is_some())?;

    let r = result.0.borrow_mut().take();
    match r {
        Some(r) => r.map_err(io::Error::from),
        None => Err(ResolveError::NotFound.into()),
    }
}

#[cfg(test)]
mod test {
    use std::net::{SocketAddr, UdpSocket};
    use std::time::{Duration, Instant};

    use super::{EventLoop, LoopTimers, LoopTransport};
    use crate::socket::{TimerService, TimerToken, Transport};

    #[test]
    fn test_timers_expire_in_order() {
        let mut ev = EventLoop::new().unwrap();
        let mut timers = LoopTimers(ev.io.clone());

        timers.start(TimerToken(1), Duration::from_millis(0)).unwrap();
        timers.start(TimerToken(0), Duration::from_millis(0)).unwrap();
        timers.start(TimerToken(2), Duration::from_secs(60)).unwrap();
        assert!(!ev.is_idle());

        let expired = ev.take_expired(Instant::now() + Duration::from_millis(1));
        assert_eq!(expired, [TimerToken(0), TimerToken(1)]);

        timers.stop(TimerToken(2));
        assert!(ev.is_idle());
    }

    #[test]
    fn test_transport_round_trip() {
        let ev = EventLoop::new().unwrap();
        let mut transport = LoopTransport(ev.io.clone());

        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let peer_addr = peer.local_addr().unwrap();

        let handle = transport.bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        transport.send(handle, b"ping", peer_addr).unwrap();

        let mut buf = [0; 16];
        let (n, _) = peer.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");

        transport.close(handle);
        assert!(transport.send(handle, b"ping", peer_addr).is_err());
    }
}
