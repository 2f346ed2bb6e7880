//! High-level resolver operations

use std::cell::RefCell;
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::rc::Rc;

use thiserror::Error;

use crate::config::DnsConfig;
use crate::external::ExternalResolver;
use crate::manager::{Notification, ResolverManager};
use crate::socket::{SocketHandle, TimerService, TimerToken, Transport};

/// Represents a failure to resolve a hostname.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum ResolveError {
    /// The name does not exist, had no addresses, or could not be queried
    #[error("name not found")]
    NotFound,
    /// No configured name server answered in time
    #[error("name servers did not respond")]
    TimedOut,
    /// A socket, timer or transaction id could not be obtained
    #[error("resources exhausted")]
    ResourceExhausted,
}

impl From<ResolveError> for io::Error {
    fn from(err: ResolveError) -> io::Error {
        let kind = match err {
            ResolveError::NotFound => io::ErrorKind::NotFound,
            ResolveError::TimedOut => io::ErrorKind::TimedOut,
            ResolveError::ResourceExhausted => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

/// Identifies a `Resolver` registered with a manager.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResolverId(pub usize);

impl fmt::Display for ResolverId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "resolver #{}", self.0)
    }
}

/// Receives the result of each resolution.
///
/// Exactly one of the two methods is called for every `Resolver::resolve`
/// that returned `Ok`, unless the resolver is dropped or asked to resolve
/// another name first.
pub trait ResolverListener {
    /// Called with the addresses found, at least one and at most the
    /// configured maximum.
    fn on_resolved(&self, id: ResolverId, addresses: &[Ipv4Addr]);

    /// Called when resolution failed.
    fn on_resolver_error(&self, id: ResolverId, error: ResolveError);
}

/// Shared handle to a `ResolverManager`.
///
/// Entry points taking `&self` borrow the manager only for the duration of
/// the state change; listeners are called after the borrow ends, so a
/// listener may start a new resolution or drop its resolver.
#[derive(Clone)]
pub struct SharedManager(Rc<RefCell<ResolverManager>>);

impl SharedManager {
    /// Creates a manager over the given transport and timer service.
    pub fn new<T, S>(config: DnsConfig, transport: T, timers: S) -> SharedManager
    where
        T: Transport + 'static,
        S: TimerService + 'static,
    {
        SharedManager(Rc::new(RefCell::new(ResolverManager::new(
            config,
            Box::new(transport),
            Box::new(timers),
        ))))
    }

    /// Sets the platform resolver used by the configured `ExternalPolicy`.
    pub fn set_external_resolver<E: ExternalResolver + 'static>(&self, external: E) {
        self.0.borrow_mut().set_external_resolver(Box::new(external));
    }

    /// Feeds a datagram received on `handle` from `src`.
    pub fn data_ready(&self, handle: SocketHandle, data: &[u8], src: SocketAddr) {
        let notes = self.0.borrow_mut().data_ready(handle, data, src);
        self.dispatch(notes);
    }

    /// Feeds the expiry of a resend timer.
    pub fn timer_fired(&self, token: TimerToken) {
        let notes = self.0.borrow_mut().timer_fired(token);
        self.dispatch(notes);
    }

    /// Replaces the configuration, restarting queries in flight.
    pub fn reconfigure(&self, config: DnsConfig) {
        let notes = self.0.borrow_mut().reconfigure(config);
        self.dispatch(notes);
    }

    /// Returns the server index new queries start at.
    pub fn preferred_server(&self) -> usize {
        self.0.borrow().preferred_server()
    }

    /// Returns the number of queries in flight.
    pub fn live_queries(&self) -> usize {
        self.0.borrow().live_queries()
    }

    /// Returns a copy of the active configuration.
    pub fn config(&self) -> DnsConfig {
        self.0.borrow().config().clone()
    }

    /// Delivers `notes` in order. Each is checked against the manager just
    /// before delivery, since an earlier listener may have dropped or
    /// restarted the resolver it is for.
    fn dispatch(&self, notes: Vec<Notification>) {
        for note in notes {
            if !self.0.borrow().is_current(&note) {
                debug!("discarding stale result for {}", note.resolver());
                continue;
            }
            debug!("reporting {:?} to {}", note.result(), note.resolver());
            note.deliver();
        }
    }
}

/// Resolves hostnames to IPv4 addresses on behalf of one listener.
///
/// At most one resolution is in flight per `Resolver`; starting another
/// abandons the previous one without a callback. Dropping the resolver
/// cancels whatever is in flight.
pub struct Resolver {
    manager: SharedManager,
    id: ResolverId,
}

impl Resolver {
    /// Creates a resolver reporting to `listener`.
    pub fn new(manager: &SharedManager, listener: Rc<dyn ResolverListener>) -> Resolver {
        let id = manager.0.borrow_mut().register(listener);
        Resolver {
            manager: manager.clone(),
            id,
        }
    }

    /// Returns the identifier passed to the listener.
    pub fn id(&self) -> ResolverId {
        self.id
    }

    /// Starts resolving `hostname`.
    ///
    /// On `Err` nothing else is reported for this call. On `Ok` the listener
    /// is called exactly once: later, from the event loop, for queries sent
    /// to name servers; or before this method returns when the
    /// external-first policy answers directly.
    pub fn resolve(&self, hostname: &str) -> Result<(), ResolveError> {
        let notes = self.manager.0.borrow_mut().resolve(self.id, hostname)?;
        self.manager.dispatch(notes);
        Ok(())
    }

    /// Abandons the resolution in flight, if any, without a callback.
    pub fn cancel(&self) {
        self.manager.0.borrow_mut().cancel(self.id);
    }

    /// Returns the number of addresses found by the last successful
    /// resolution.
    pub fn address_count(&self) -> usize {
        self.manager.0.borrow().addresses(self.id).len()
    }

    /// Returns the address at `index`, if there is one.
    pub fn address(&self, index: usize) -> Option<Ipv4Addr> {
        self.manager.0.borrow().addresses(self.id).get(index).copied()
    }

    /// Returns all addresses found by the last successful resolution.
    pub fn addresses(&self) -> Vec<Ipv4Addr> {
        self.manager.0.borrow().addresses(self.id).to_vec()
    }

    /// Returns the hostname last passed to `resolve`.
    pub fn hostname(&self) -> String {
        self.manager
            .0
            .borrow()
            .hostname(self.id)
            .unwrap_or_default()
            .to_owned()
    }

    /// Returns the index of the name server that answered the last
    /// resolution, or `None` if it was answered externally or has not
    /// completed.
    pub fn dns_server_index(&self) -> Option<usize> {
        self.manager.0.borrow().server_index(self.id)
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Resolver").field("id", &self.id).finish()
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        // A listener dropped while the manager is borrowed could re-enter it.
        let listener = match self.manager.0.try_borrow_mut() {
            Ok(mut mgr) => mgr.unregister(self.id),
            Err(_) => {
                warn!("{} dropped while its manager is busy", self.id);
                None
            }
        };
        drop(listener);
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::mem;
    use std::net::{Ipv4Addr, SocketAddr};
    use std::rc::Rc;

    use super::{ResolveError, Resolver, ResolverId, ResolverListener, SharedManager};
    use crate::config::{DnsConfig, ExternalPolicy};
    use crate::hosts::{parse_host_table, HostsFileResolver};
    use crate::message::RCode;
    use crate::socket::fake::{response, FakeNet, Recorder};
    use crate::socket::TimerToken;

    fn config() -> DnsConfig {
        DnsConfig::with_name_servers(vec![SocketAddr::from(([192, 0, 2, 1], 53))])
    }

    fn reply(net: &FakeNet, manager: &SharedManager, index: usize, addrs: &[Ipv4Addr]) {
        let (handle, data, dest) = net.sent()[index].clone();
        manager.data_ready(handle, &response(&data, RCode::NoError, addrs), dest);
    }

    #[test]
    fn test_resolve_and_read_back() {
        let net = FakeNet::default();
        let manager = SharedManager::new(config(), net.clone(), net.clone());
        let rec = Rc::new(Recorder::default());
        let r = Resolver::new(&manager, rec.clone());

        r.resolve("opera.com").unwrap();
        assert_eq!(r.address_count(), 0);
        assert_eq!(r.dns_server_index(), None);

        let addrs = [Ipv4Addr::new(1, 2, 3, 4), Ipv4Addr::new(1, 2, 3, 5)];
        reply(&net, &manager, 0, &addrs);

        assert_eq!(rec.events(), [(r.id(), Ok(addrs.to_vec()))]);
        assert_eq!(r.address_count(), 2);
        assert_eq!(r.address(1), Some(addrs[1]));
        assert_eq!(r.address(2), None);
        assert_eq!(r.hostname(), "opera.com");
        assert_eq!(r.dns_server_index(), Some(0));
    }

    #[test]
    fn test_drop_cancels() {
        let net = FakeNet::default();
        let manager = SharedManager::new(config(), net.clone(), net.clone());
        let rec = Rc::new(Recorder::default());

        let r = Resolver::new(&manager, rec.clone());
        r.resolve("opera.com").unwrap();
        assert_eq!(manager.live_queries(), 1);
        drop(r);

        assert_eq!(manager.live_queries(), 0);
        reply(&net, &manager, 0, &[Ipv4Addr::new(1, 2, 3, 4)]);
        assert!(rec.events().is_empty());
        assert_eq!(Rc::strong_count(&rec), 1);
    }

    #[test]
    fn test_sync_error_has_no_callback() {
        let net = FakeNet::default();
        let manager = SharedManager::new(DnsConfig::default(), net.clone(), net);
        let rec = Rc::new(Recorder::default());
        let r = Resolver::new(&manager, rec.clone());

        assert_eq!(r.resolve("opera.com"), Err(ResolveError::NotFound));
        assert!(rec.events().is_empty());
    }

    #[test]
    fn test_external_first_is_synchronous() {
        let net = FakeNet::default();
        let manager = SharedManager::new(
            DnsConfig {
                external: ExternalPolicy::PreferExternalFirst,
                ..config()
            },
            net.clone(),
            net.clone(),
        );
        manager.set_external_resolver(HostsFileResolver::new(
            parse_host_table("10.1.1.1 intranet\n").unwrap(),
        ));

        let rec = Rc::new(Recorder::default());
        let r = Resolver::new(&manager, rec.clone());

        r.resolve("intranet").unwrap();
        assert_eq!(rec.events(), [(r.id(), Ok(vec![Ipv4Addr::new(10, 1, 1, 1)]))]);
        assert_eq!(r.dns_server_index(), None);
        assert!(net.sent().is_empty());
    }

    /// Starts the next lookup from inside the callback.
    struct Chain {
        resolver: RefCell<Option<Resolver>>,
        done: RefCell<Vec<Ipv4Addr>>,
    }

    impl ResolverListener for Chain {
        fn on_resolved(&self, _id: ResolverId, addresses: &[Ipv4Addr]) {
            self.done.borrow_mut().extend_from_slice(addresses);
            if let Some(ref r) = *self.resolver.borrow() {
                if r.hostname() == "first.example" {
                    r.resolve("second.example").unwrap();
                }
            }
        }

        fn on_resolver_error(&self, _id: ResolverId, error: ResolveError) {
            panic!("unexpected error: {}", error);
        }
    }

    #[test]
    fn test_resolve_from_callback() {
        let net = FakeNet::default();
        let manager = SharedManager::new(config(), net.clone(), net.clone());
        let chain = Rc::new(Chain {
            resolver: RefCell::new(None),
            done: RefCell::new(Vec::new()),
        });

        let r = Resolver::new(&manager, chain.clone());
        r.resolve("first.example").unwrap();
        *chain.resolver.borrow_mut() = Some(r);

        reply(&net, &manager, 0, &[Ipv4Addr::new(1, 1, 1, 1)]);
        assert_eq!(net.sent().len(), 2);

        reply(&net, &manager, 1, &[Ipv4Addr::new(2, 2, 2, 2)]);
        assert_eq!(
            *chain.done.borrow(),
            [Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(2, 2, 2, 2)]
        );

        // Break the listener/resolver cycle.
        chain.resolver.borrow_mut().take();
    }

    /// Reacts to the first error by dropping or restarting every resolver
    /// it holds, including the one being reported.
    struct Sweep {
        restart: bool,
        errors: RefCell<Vec<ResolverId>>,
        resolvers: RefCell<Vec<Resolver>>,
    }

    impl ResolverListener for Sweep {
        fn on_resolved(&self, id: ResolverId, _addresses: &[Ipv4Addr]) {
            panic!("unexpected result for {}", id);
        }

        fn on_resolver_error(&self, id: ResolverId, error: ResolveError) {
            assert_eq!(error, ResolveError::TimedOut);
            self.errors.borrow_mut().push(id);
            if self.restart {
                for r in self.resolvers.borrow().iter() {
                    r.resolve("again.example").unwrap();
                }
            } else {
                let gone = mem::take(&mut *self.resolvers.borrow_mut());
                drop(gone);
            }
        }
    }

    /// Two resolvers on one server whose requests both give up on the next
    /// timer pass, so their errors arrive in the same batch.
    fn expiring_pair(restart: bool) -> (FakeNet, SharedManager, Rc<Sweep>) {
        let net = FakeNet::default();
        let manager = SharedManager::new(
            DnsConfig {
                max_resends: 0,
                ..config()
            },
            net.clone(),
            net.clone(),
        );
        let sweep = Rc::new(Sweep {
            restart,
            errors: RefCell::new(Vec::new()),
            resolvers: RefCell::new(Vec::new()),
        });

        for host in ["a.example", "b.example"] {
            let r = Resolver::new(&manager, sweep.clone());
            r.resolve(host).unwrap();
            sweep.resolvers.borrow_mut().push(r);
        }
        assert_eq!(manager.live_queries(), 2);

        (net, manager, sweep)
    }

    #[test]
    fn test_dropped_in_batch_not_reported() {
        let (_net, manager, sweep) = expiring_pair(false);

        manager.timer_fired(TimerToken(0));

        assert_eq!(sweep.errors.borrow().len(), 1);
        assert!(sweep.resolvers.borrow().is_empty());
        assert_eq!(manager.live_queries(), 0);
        assert_eq!(Rc::strong_count(&sweep), 1);
    }

    #[test]
    fn test_restarted_in_batch_not_reported() {
        let (net, manager, sweep) = expiring_pair(true);

        manager.timer_fired(TimerToken(0));

        assert_eq!(sweep.errors.borrow().len(), 1);
        assert_eq!(manager.live_queries(), 2);
        assert_eq!(net.sent().len(), 4);

        sweep.resolvers.borrow_mut().clear();
    }

    #[test]
    fn test_ids_not_reused() {
        let net = FakeNet::default();
        let manager = SharedManager::new(config(), net.clone(), net);
        let rec = Rc::new(Recorder::default());

        let first = Resolver::new(&manager, rec.clone()).id();
        let second = Resolver::new(&manager, rec).id();
        assert_ne!(first, second);
    }
}
