//! Per-hostname query state.
//!
//! A `Query` holds one `SubQuery` per candidate name, in search order. Each
//! sub-query moves from `Pending` to either `Resolved` or `Abandoned`
//! exactly once; the query reports a result only when that result can no
//! longer be overtaken by an earlier candidate.

use std::net::Ipv4Addr;

use bytes::Bytes;

use crate::message::{encode_query, EncodeError};
use crate::record::{Class, RecordType};
use crate::resolver::{ResolveError, ResolverId};

/// Index of a live query in the manager's arena.
pub type QueryKey = usize;

/// State of a single request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SubQueryState {
    /// Sent, awaiting a reply or a timeout
    Pending,
    /// A response arrived; it may carry no addresses
    Resolved(Vec<Ipv4Addr>),
    /// The resend budget ran out
    Abandoned,
}

/// What a resend timer pass did to a sub-query.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResendAction {
    /// Not pending; nothing to do
    Idle,
    /// Still pending; the request should go out again
    Resend,
    /// The budget is spent and the sub-query was abandoned
    Abandon,
}

/// One request for one candidate name.
#[derive(Clone, Debug)]
pub struct SubQuery {
    /// Transaction id carried by `request`
    pub id: u16,
    /// Fully-qualified candidate name
    pub name: String,
    /// Encoded request, re-sent unchanged on every resend
    pub request: Bytes,
    /// Number of resend timer passes seen while pending
    pub resend_count: u32,
    /// Current state
    pub state: SubQueryState,
}

impl SubQuery {
    /// Encodes an `A`/`IN` request for `name` under transaction id `id`.
    pub fn new(id: u16, name: String) -> Result<SubQuery, EncodeError> {
        let request = encode_query(id, &name, RecordType::A, Class::Internet)?;

        Ok(SubQuery {
            id,
            name,
            request,
            resend_count: 0,
            state: SubQueryState::Pending,
        })
    }

    /// Returns whether the sub-query still awaits a reply.
    pub fn is_pending(&self) -> bool {
        self.state == SubQueryState::Pending
    }

    /// Records a response. Returns `false`, leaving the state untouched, if
    /// the sub-query was already terminal.
    pub fn resolve(&mut self, addresses: Vec<Ipv4Addr>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.state = SubQueryState::Resolved(addresses);
        true
    }

    /// Accounts for one resend timer pass.
    ///
    /// The request goes out again on each of the first `max_resends`
    /// passes; the pass after that abandons it.
    pub fn on_resend_timer(&mut self, max_resends: u32) -> ResendAction {
        if !self.is_pending() {
            return ResendAction::Idle;
        }

        if self.resend_count >= max_resends {
            self.state = SubQueryState::Abandoned;
            return ResendAction::Abandon;
        }

        self.resend_count += 1;
        ResendAction::Resend
    }
}

/// Result of scanning a query's sub-queries in candidate order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// An earlier candidate may still succeed
    Pending,
    /// The sub-query at this position holds the answer
    Found(usize),
    /// Every candidate was answered without addresses
    NotFound,
    /// Every candidate is terminal, none has addresses and at least one
    /// timed out on this server
    TimedOut,
}

/// All sub-queries started for one hostname against one server.
#[derive(Clone, Debug)]
pub struct Query {
    /// Resolver that receives the result
    pub resolver: ResolverId,
    /// Index of the name server the sub-queries were sent to
    pub server: usize,
    /// Index of the server the resolution began on; differs from `server`
    /// after failover
    pub start: usize,
    /// Sub-queries in candidate priority order
    pub subqueries: Vec<SubQuery>,
}

impl Query {
    /// Builds a query with one sub-query per candidate name of `hostname`,
    /// taking transaction ids from `next_id`.
    ///
    /// `next_id` is handed the sub-queries built so far, whose ids are not
    /// yet registered anywhere else. Candidates that cannot be encoded are
    /// skipped; if none remain the build fails with `NotFound`.
    pub fn build<F>(
        resolver: ResolverId,
        server: usize,
        hostname: &str,
        search: &[String],
        mut next_id: F,
    ) -> Result<Query, ResolveError>
    where
        F: FnMut(&[SubQuery]) -> Result<u16, ResolveError>,
    {
        let mut subqueries = Vec::new();

        for name in candidate_names(hostname, search) {
            let id = next_id(&subqueries)?;
            match SubQuery::new(id, name) {
                Ok(sub) => subqueries.push(sub),
                Err(e) => warn!("skipping candidate for {:?}: {}", hostname, e),
            }
        }

        if subqueries.is_empty() {
            return Err(ResolveError::NotFound);
        }

        Ok(Query {
            resolver,
            server,
            start: server,
            subqueries,
        })
    }

    /// Returns whether any sub-query still awaits a reply.
    pub fn has_pending(&self) -> bool {
        self.subqueries.iter().any(|s| s.is_pending())
    }

    /// Returns the transaction ids of all sub-queries.
    pub fn ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.subqueries.iter().map(|s| s.id)
    }

    /// Decides whether the query can report, and what.
    pub fn outcome(&self) -> Outcome {
        let mut timed_out = false;

        for (pos, sub) in self.subqueries.iter().enumerate() {
            match sub.state {
                SubQueryState::Pending => return Outcome::Pending,
                SubQueryState::Resolved(ref addrs) if !addrs.is_empty() => {
                    return Outcome::Found(pos)
                }
                SubQueryState::Resolved(_) => (),
                SubQueryState::Abandoned => timed_out = true,
            }
        }

        if timed_out {
            Outcome::TimedOut
        } else {
            Outcome::NotFound
        }
    }

    /// Returns the addresses held by the sub-query at `pos`.
    pub fn addresses(&self, pos: usize) -> &[Ipv4Addr] {
        match self.subqueries.get(pos).map(|s| &s.state) {
            Some(SubQueryState::Resolved(addrs)) => addrs,
            _ => &[],
        }
    }
}

/// Returns the names to query for `hostname`, highest priority first.
///
/// A name containing a dot is used as given. Otherwise each non-empty
/// search suffix is appended in turn, and the bare name is tried last.
pub fn candidate_names(hostname: &str, search: &[String]) -> Vec<String> {
    if hostname.contains('.') {
        return vec![hostname.to_owned()];
    }

    let mut v = search
        .iter()
        .map(|s| s.trim_matches('.'))
        .filter(|s| !s.is_empty())
        .map(|s| format!("{}.{}", hostname, s))
        .collect::<Vec<_>>();
    v.push(hostname.to_owned());
    v
}
