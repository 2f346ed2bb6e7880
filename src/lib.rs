//! Asynchronous stub resolver for IPv4 host addresses.
//!
//! Queries go to a ranked list of name servers over UDP. Unqualified names
//! are expanded with the configured search suffixes and every candidate is
//! sent at once; unanswered requests are resent on a per-server timer, and
//! a server that stays silent is failed over to the next one in the list.

#![deny(missing_docs)]

#[macro_use]
extern crate log;

pub use crate::config::{default_config, ConfigProvider, DnsConfig, ExternalPolicy, StaticConfig};
pub use crate::event_loop::{resolve_host, resolve_host_with, EventLoop};
pub use crate::external::{ExternalResolver, SystemLookup};
pub use crate::hosts::HostsFileResolver;
pub use crate::idna::to_ascii;
pub use crate::manager::{Notification, ResolverManager};
pub use crate::message::{DecodeError, EncodeError, Question, Response, MESSAGE_LIMIT};
pub use crate::record::{Class, Record, RecordType};
pub use crate::resolver::{ResolveError, Resolver, ResolverId, ResolverListener, SharedManager};
pub use crate::socket::{SocketHandle, TimerService, TimerToken, Transport};

pub mod config;
pub mod event_loop;
pub mod external;
pub mod hostname;
pub mod hosts;
pub mod idna;
pub mod manager;
pub mod message;
pub mod query;
pub mod record;
#[cfg(unix)]
pub mod resolv_conf;
pub mod resolver;
pub mod socket;
