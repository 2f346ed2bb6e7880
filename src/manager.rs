//! Server selection, resends and failover for every live query.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::rc::Rc;

use rand::random;
use slab::Slab;

use crate::config::{DnsConfig, ExternalPolicy};
use crate::external::ExternalResolver;
use crate::message::{decode_response, Qr, NAME_LIMIT};
use crate::query::{Outcome, Query, QueryKey, ResendAction, SubQuery};
use crate::resolver::{ResolveError, ResolverId, ResolverListener};
use crate::socket::{
    addresses_match, local_address_for, SocketHandle, TimerService, TimerToken, Transport,
};

/// Number of distinct transaction ids.
const ID_SPACE: usize = 1 << 16;

/// A result waiting to be handed to a listener.
///
/// Manager operations return these instead of calling listeners directly,
/// so that delivery can happen once the manager is no longer borrowed.
pub struct Notification {
    listener: Rc<dyn ResolverListener>,
    resolver: ResolverId,
    generation: u64,
    result: Result<Vec<Ipv4Addr>, ResolveError>,
}

impl Notification {
    /// Returns the resolver the notification is for.
    pub fn resolver(&self) -> ResolverId {
        self.resolver
    }

    /// Returns the result being reported.
    pub fn result(&self) -> &Result<Vec<Ipv4Addr>, ResolveError> {
        &self.result
    }

    /// Calls the listener.
    pub fn deliver(self) {
        match self.result {
            Ok(ref addrs) => self.listener.on_resolved(self.resolver, addrs),
            Err(e) => self.listener.on_resolver_error(self.resolver, e),
        }
    }
}

struct ResolverEntry {
    listener: Rc<dyn ResolverListener>,
    /// Bumped whenever the query in flight is dropped or replaced
    generation: u64,
    hostname: String,
    addresses: Vec<Ipv4Addr>,
    server_index: Option<usize>,
    query: Option<QueryKey>,
}

#[derive(Clone, Debug, Default)]
struct ServerState {
    socket: Option<SocketHandle>,
    timer_running: bool,
}

/// Owns every in-flight query and the per-server sockets and timers they
/// use.
///
/// The manager is driven from a single event loop: `data_ready` for each
/// received datagram and `timer_fired` for each expired resend timer. Most
/// callers use it through `SharedManager` and `Resolver`.
pub struct ResolverManager {
    config: DnsConfig,
    transport: Box<dyn Transport>,
    timers: Box<dyn TimerService>,
    external: Option<Box<dyn ExternalResolver>>,

    servers: Vec<ServerState>,
    queries: Slab<Query>,
    /// Live transaction ids and the sub-query each belongs to
    transactions: HashMap<u16, (QueryKey, usize)>,
    /// Registered resolvers; ids are never reused
    resolvers: HashMap<ResolverId, ResolverEntry>,
    next_resolver: usize,

    next_id: u16,
    /// Server index new queries start at; moves only on failover success
    /// and on reconfiguration
    preferred: usize,
}

impl ResolverManager {
    /// Creates a manager sending through `transport` and arming resend
    /// timers through `timers`.
    pub fn new(
        config: DnsConfig,
        transport: Box<dyn Transport>,
        timers: Box<dyn TimerService>,
    ) -> ResolverManager {
        ResolverManager {
            servers: vec![ServerState::default(); config.name_servers.len()],
            config,
            transport,
            timers,
            external: None,
            queries: Slab::new(),
            transactions: HashMap::new(),
            resolvers: HashMap::new(),
            next_resolver: 0,
            next_id: random(),
            preferred: 0,
        }
    }

    /// Sets the platform resolver consulted according to the configured
    /// `ExternalPolicy`.
    pub fn set_external_resolver(&mut self, external: Box<dyn ExternalResolver>) {
        self.external = Some(external);
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &DnsConfig {
        &self.config
    }

    /// Returns the server index new queries start at.
    pub fn preferred_server(&self) -> usize {
        self.preferred
    }

    /// Returns the number of queries in flight.
    pub fn live_queries(&self) -> usize {
        self.queries.len()
    }

    /// Returns the number of transaction ids in use.
    pub fn live_transactions(&self) -> usize {
        self.transactions.len()
    }

    /// Registers a resolver reporting to `listener`.
    pub fn register(&mut self, listener: Rc<dyn ResolverListener>) -> ResolverId {
        let id = ResolverId(self.next_resolver);
        self.next_resolver += 1;

        self.resolvers.insert(
            id,
            ResolverEntry {
                listener,
                generation: 0,
                hostname: String::new(),
                addresses: Vec::new(),
                server_index: None,
                query: None,
            },
        );
        id
    }

    /// Returns whether `note` still describes the current request of a
    /// registered resolver.
    ///
    /// A listener called earlier in the same batch may have dropped the
    /// resolver or started another request on it; the note must then be
    /// discarded.
    pub fn is_current(&self, note: &Notification) -> bool {
        self.resolvers
            .get(&note.resolver)
            .map_or(false, |e| e.generation == note.generation)
    }

    /// Removes a resolver and everything referencing it.
    ///
    /// The returned listener should be dropped by the caller once the
    /// manager is no longer borrowed.
    pub fn unregister(&mut self, id: ResolverId) -> Option<Rc<dyn ResolverListener>> {
        self.cancel(id);
        self.resolvers.remove(&id).map(|e| e.listener)
    }

    /// Drops the query in flight for `id`, if any. No notification is
    /// produced for it.
    pub fn cancel(&mut self, id: ResolverId) {
        let key = match self.resolvers.get_mut(&id) {
            Some(entry) => {
                entry.generation = entry.generation.wrapping_add(1);
                entry.query.take()
            }
            None => return,
        };
        if let Some(key) = key {
            debug!("cancelling query for resolver {:?}", id);
            self.remove_query(key);
        }
    }

    /// Returns the addresses of the last successful resolution of `id`.
    pub fn addresses(&self, id: ResolverId) -> &[Ipv4Addr] {
        self.resolvers
            .get(&id)
            .map(|e| &e.addresses[..])
            .unwrap_or(&[])
    }

    /// Returns the hostname last requested through `id`.
    pub fn hostname(&self, id: ResolverId) -> Option<&str> {
        self.resolvers.get(&id).map(|e| &e.hostname[..])
    }

    /// Returns the server index that answered the last resolution of `id`.
    pub fn server_index(&self, id: ResolverId) -> Option<usize> {
        self.resolvers.get(&id).and_then(|e| e.server_index)
    }

    /// Starts resolving `hostname` for `id`.
    ///
    /// On the wire-protocol path the result is always reported later, from
    /// `data_ready` or `timer_fired`, and the returned list is empty. Under
    /// `ExternalPolicy::PreferExternalFirst` the result is known at once and
    /// returned here for immediate delivery.
    ///
    /// An `Err` is the only report for this call; no notification follows.
    pub fn resolve(
        &mut self,
        id: ResolverId,
        hostname: &str,
    ) -> Result<Vec<Notification>, ResolveError> {
        self.cancel(id);

        let entry = self.resolvers.get_mut(&id).ok_or(ResolveError::NotFound)?;
        entry.hostname = hostname.to_owned();
        entry.addresses.clear();
        entry.server_index = None;

        if hostname.is_empty() || hostname.len() > NAME_LIMIT {
            debug!("rejecting hostname of length {}", hostname.len());
            return Err(ResolveError::NotFound);
        }

        if self.config.external == ExternalPolicy::PreferExternalFirst {
            if let Some(ref mut external) = self.external {
                info!("resolving {:?} through the external resolver", hostname);
                let result = external.lookup(hostname);
                return Ok(self.complete_external(id, result).into_iter().collect());
            }
            debug!("external-first policy without an external resolver");
        }

        if self.config.name_servers.is_empty() {
            debug!("no name servers configured; cannot resolve {:?}", hostname);
            return Err(ResolveError::NotFound);
        }

        let server = self.preferred;
        let key = self.start_query(id, hostname, server, server)?;
        if let Some(entry) = self.resolvers.get_mut(&id) {
            entry.query = Some(key);
        }
        Ok(Vec::new())
    }

    /// Handles a datagram received on `handle` from `src`.
    ///
    /// Anything that does not decode, or does not answer a pending
    /// sub-query sent from that socket to that peer, is dropped.
    pub fn data_ready(
        &mut self,
        handle: SocketHandle,
        data: &[u8],
        src: SocketAddr,
    ) -> Vec<Notification> {
        let msg = match decode_response(data) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("dropping {} byte datagram from {}: {}", data.len(), src, e);
                return Vec::new();
            }
        };

        if msg.header.qr != Qr::Response {
            debug!("dropping non-response from {}", src);
            return Vec::new();
        }

        let (key, pos) = match self.transactions.get(&msg.header.id) {
            Some(&v) => v,
            None => {
                debug!("dropping response with unknown id {:#06x} from {}", msg.header.id, src);
                return Vec::new();
            }
        };

        let max_addresses = self.config.max_addresses;
        let server = self.queries[key].server;

        if self.servers[server].socket != Some(handle)
            || !addresses_match(&src, &self.config.name_servers[server])
        {
            debug!("dropping response {:#06x} from unexpected peer {}", msg.header.id, src);
            return Vec::new();
        }

        let sub = &mut self.queries[key].subqueries[pos];

        if let Some(q) = msg.question.first() {
            if !q.names(&sub.name) {
                debug!("dropping response {:#06x} for {:?}, expected {:?}", sub.id, q.name, sub.name);
                return Vec::new();
            }
        }

        let addrs = msg.addresses().take(max_addresses).collect::<Vec<_>>();
        debug!(
            "response {:#06x} for {:?} from server {}: {}, {} address(es)",
            sub.id,
            sub.name,
            server,
            msg.header.rcode.description(),
            addrs.len()
        );

        if !sub.resolve(addrs) {
            debug!("ignoring duplicate response {:#06x}", sub.id);
            return Vec::new();
        }

        self.evaluate(key)
    }

    /// Handles expiry of the resend timer of one server.
    pub fn timer_fired(&mut self, token: TimerToken) -> Vec<Notification> {
        let server = token.0;
        match self.servers.get_mut(server) {
            Some(state) => state.timer_running = false,
            None => return Vec::new(),
        }

        let max_resends = self.config.max_resends;
        let mut resend = Vec::new();
        let mut abandoned = Vec::new();

        for (key, query) in self.queries.iter_mut().filter(|(_, q)| q.server == server) {
            let mut any_abandoned = false;

            for sub in &mut query.subqueries {
                match sub.on_resend_timer(max_resends) {
                    ResendAction::Resend => resend.push(sub.request.clone()),
                    ResendAction::Abandon => {
                        debug!("abandoning {:?} on server {}", sub.name, server);
                        any_abandoned = true;
                    }
                    ResendAction::Idle => (),
                }
            }

            if any_abandoned {
                abandoned.push(key);
            }
        }

        if let Some(socket) = self.servers[server].socket {
            let dest = self.config.name_servers[server];
            for request in &resend {
                if let Err(e) = self.transport.send(socket, request, dest) {
                    warn!("resend to {} failed: {}", dest, e);
                }
            }
        }

        let mut notes = Vec::new();
        for key in abandoned {
            if self.queries.contains(key) {
                notes.extend(self.evaluate(key));
            }
        }

        self.sync_timer(server);
        notes
    }

    /// Replaces the configuration.
    ///
    /// The preferred server index goes back to 0, sockets and timers are
    /// released, and every query in flight starts over against the first
    /// server of the new list.
    pub fn reconfigure(&mut self, config: DnsConfig) -> Vec<Notification> {
        let live = self
            .queries
            .iter()
            .map(|(key, q)| (key, q.resolver))
            .collect::<Vec<_>>();

        for &(key, resolver) in &live {
            self.remove_query(key);
            if let Some(entry) = self.resolvers.get_mut(&resolver) {
                entry.query = None;
            }
        }

        for (index, state) in self.servers.iter().enumerate() {
            if let Some(socket) = state.socket {
                self.transport.close(socket);
            }
            if state.timer_running {
                self.timers.stop(TimerToken(index));
            }
        }

        info!("reconfigured with {} name server(s)", config.name_servers.len());
        self.servers = vec![ServerState::default(); config.name_servers.len()];
        self.config = config;
        self.preferred = 0;

        let mut notes = Vec::new();

        for (_, resolver) in live {
            let hostname = match self.resolvers.get(&resolver) {
                Some(entry) => entry.hostname.clone(),
                None => continue,
            };

            let started = if self.servers.is_empty() {
                Err(ResolveError::NotFound)
            } else {
                self.start_query(resolver, &hostname, 0, 0)
            };

            match started {
                Ok(key) => {
                    if let Some(entry) = self.resolvers.get_mut(&resolver) {
                        entry.query = Some(key);
                    }
                }
                Err(e) => notes.extend(self.notify(resolver, Err(e))),
            }
        }

        notes
    }

    /// Builds a query for `hostname` against `server` and sends every
    /// candidate in one burst. `start` is the server the resolution began
    /// on, before any failover.
    fn start_query(
        &mut self,
        resolver: ResolverId,
        hostname: &str,
        server: usize,
        start: usize,
    ) -> Result<QueryKey, ResolveError> {
        let socket = self.socket_for(server)?;

        let next_id = &mut self.next_id;
        let transactions = &self.transactions;
        let mut query = Query::build(resolver, server, hostname, &self.config.search, |pending| {
            allocate_id(next_id, transactions, pending)
        })?;
        query.start = start;

        if !self.servers[server].timer_running {
            if let Err(e) = self
                .timers
                .start(TimerToken(server), self.config.resend_interval)
            {
                warn!("cannot start resend timer for server {}: {}", server, e);
                return Err(ResolveError::ResourceExhausted);
            }
            self.servers[server].timer_running = true;
        }

        let dest = self.config.name_servers[server];
        info!(
            "resolving {:?} via server {} ({}), {} candidate(s)",
            hostname,
            server,
            dest,
            query.subqueries.len()
        );

        for sub in &query.subqueries {
            if let Err(e) = self.transport.send(socket, &sub.request, dest) {
                warn!("send of {:?} to {} failed: {}", sub.name, dest, e);
            }
        }

        let key = self.queries.insert(query);
        for (pos, id) in self.queries[key].ids().enumerate() {
            self.transactions.insert(id, (key, pos));
        }

        Ok(key)
    }

    /// Returns the socket for `server`, binding it on first use.
    fn socket_for(&mut self, server: usize) -> Result<SocketHandle, ResolveError> {
        if let Some(socket) = self.servers[server].socket {
            return Ok(socket);
        }

        let local = local_address_for(&self.config.name_servers[server]);
        match self.transport.bind(local) {
            Ok(socket) => {
                self.servers[server].socket = Some(socket);
                Ok(socket)
            }
            Err(e) => {
                warn!("cannot bind {} for server {}: {}", local, server, e);
                Err(ResolveError::ResourceExhausted)
            }
        }
    }

    /// Reports the query if its outcome is settled.
    fn evaluate(&mut self, key: QueryKey) -> Vec<Notification> {
        let outcome = self.queries[key].outcome();

        match outcome {
            Outcome::Pending => Vec::new(),
            Outcome::Found(pos) => {
                let query = self.finish_query(key);
                self.mark_answered(&query);
                let addrs = query.addresses(pos).to_vec();
                if let Some(entry) = self.resolvers.get_mut(&query.resolver) {
                    entry.server_index = Some(query.server);
                }
                self.notify(query.resolver, Ok(addrs)).into_iter().collect()
            }
            Outcome::NotFound => {
                let query = self.finish_query(key);
                self.mark_answered(&query);
                if let Some(entry) = self.resolvers.get_mut(&query.resolver) {
                    entry.server_index = Some(query.server);
                }
                self.notify(query.resolver, Err(ResolveError::NotFound))
                    .into_iter()
                    .collect()
            }
            Outcome::TimedOut => self.fail_over(key),
        }
    }

    /// Moves a timed-out query to the next server, or reports it once no
    /// server is left.
    fn fail_over(&mut self, key: QueryKey) -> Vec<Notification> {
        let query = self.finish_query(key);
        let resolver = query.resolver;

        let hostname = match self.resolvers.get(&resolver) {
            Some(entry) => entry.hostname.clone(),
            None => return Vec::new(),
        };

        for server in query.server + 1..self.servers.len() {
            info!(
                "server {} timed out for {:?}; failing over to server {}",
                query.server, hostname, server
            );
            match self.start_query(resolver, &hostname, server, query.start) {
                Ok(key) => {
                    if let Some(entry) = self.resolvers.get_mut(&resolver) {
                        entry.query = Some(key);
                    }
                    return Vec::new();
                }
                Err(e) => warn!("server {} unusable for {:?}: {}", server, hostname, e),
            }
        }

        let result = match (self.config.external, self.external.as_mut()) {
            (ExternalPolicy::PreferExternalLast, Some(external)) => {
                info!("all name servers timed out for {:?}; asking the external resolver", hostname);
                external.lookup(&hostname)
            }
            _ => {
                info!("all name servers timed out for {:?}", hostname);
                Err(ResolveError::TimedOut)
            }
        };

        self.complete_external(resolver, result)
            .into_iter()
            .collect()
    }

    /// Records a result that did not come from a name server.
    fn complete_external(
        &mut self,
        resolver: ResolverId,
        result: Result<Vec<Ipv4Addr>, ResolveError>,
    ) -> Option<Notification> {
        let result = result.map(|mut addrs| {
            addrs.truncate(self.config.max_addresses);
            addrs
        });
        if let Some(entry) = self.resolvers.get_mut(&resolver) {
            entry.server_index = None;
        }
        self.notify(resolver, result)
    }

    /// Stores the result on the resolver and prepares its notification.
    fn notify(
        &mut self,
        resolver: ResolverId,
        result: Result<Vec<Ipv4Addr>, ResolveError>,
    ) -> Option<Notification> {
        let entry = self.resolvers.get_mut(&resolver)?;
        entry.query = None;

        match result {
            Ok(ref addrs) => entry.addresses = addrs.clone(),
            Err(_) => entry.addresses.clear(),
        }

        Some(Notification {
            listener: entry.listener.clone(),
            resolver,
            generation: entry.generation,
            result,
        })
    }

    /// A query produced a terminal answer. If it got there by failing over,
    /// the answering server becomes preferred; preference never moves back
    /// towards the front of the list outside `reconfigure`.
    fn mark_answered(&mut self, query: &Query) {
        if query.server > query.start && query.server > self.preferred {
            info!(
                "server {} is now preferred over server {}",
                query.server, self.preferred
            );
            self.preferred = query.server;
        }
    }

    /// Removes a query that has reached a terminal result.
    fn finish_query(&mut self, key: QueryKey) -> Query {
        let query = self.remove_query(key);
        if let Some(entry) = self.resolvers.get_mut(&query.resolver) {
            entry.query = None;
        }
        query
    }

    /// Removes a query and its transaction ids, stopping its server's timer
    /// if nothing else needs it.
    fn remove_query(&mut self, key: QueryKey) -> Query {
        let query = self.queries.remove(key);
        for id in query.ids() {
            self.transactions.remove(&id);
        }
        self.sync_timer(query.server);
        query
    }

    /// Runs the resend timer of `server` exactly when a query there has a
    /// pending sub-query.
    fn sync_timer(&mut self, server: usize) {
        let needed = self
            .queries
            .iter()
            .any(|(_, q)| q.server == server && q.has_pending());

        let state = match self.servers.get_mut(server) {
            Some(state) => state,
            None => return,
        };

        if needed && !state.timer_running {
            match self
                .timers
                .start(TimerToken(server), self.config.resend_interval)
            {
                Ok(()) => state.timer_running = true,
                Err(e) => warn!("cannot restart resend timer for server {}: {}", server, e),
            }
        } else if !needed && state.timer_running {
            self.timers.stop(TimerToken(server));
            state.timer_running = false;
        }
    }
}

/// Returns the next transaction id not used by a live sub-query or by one
/// of `pending`.
fn allocate_id(
    next_id: &mut u16,
    transactions: &HashMap<u16, (QueryKey, usize)>,
    pending: &[SubQuery],
) -> Result<u16, ResolveError> {
    if transactions.len() + pending.len() >= ID_SPACE {
        warn!("all transaction ids in use");
        return Err(ResolveError::ResourceExhausted);
    }

    loop {
        let id = *next_id;
        *next_id = next_id.wrapping_add(1);

        if !transactions.contains_key(&id) && !pending.iter().any(|s| s.id == id) {
            return Ok(id);
        }
    }
}
