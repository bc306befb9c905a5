//! The asynchronous DNS channel interface.
//!
//! The engine does not speak DNS itself. Host lookups go through an
//! implementation of [`DnsChannel`], typically pumped by the embedder's
//! event loop. The channel answers each query by invoking the supplied
//! continuation exactly once, on the thread that pumps it. Dropping a
//! channel with queued continuations is the cancellation mechanism: the
//! continuations, and the requests they own, are dropped without firing.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::hints::Family;
use crate::status::Status;

/// Continuation for one host query.
///
/// Receives the query status, the number of timeouts the transport observed
/// while retrying, and the reply body when the status is
/// [`Status::Success`].
pub type HostCallback = Box<dyn FnOnce(Status, u32, Option<&HostEnt>)>;

/// An asynchronous host lookup transport.
///
/// `family` is the family being queried, [`Family::Inet`] or
/// [`Family::Inet6`]. Implementations are allowed to answer an `Inet6`
/// query with an `Inet` reply when they fall back; the engine keys its
/// bookkeeping on the family the reply actually carries. A success reply
/// must carry `Some(HostEnt)` with at least one address.
pub trait DnsChannel {
    /// Issues one host-by-name query and eventually invokes `callback`.
    fn resolve_host(&self, name: &str, family: Family, callback: HostCallback);
}

/// Reply body of a successful host query, shaped like `hostent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEnt {
    /// Official name of the host, when the transport knows it.
    pub name: Option<String>,
    /// The resolved addresses.
    pub addrs: HostAddrs,
}

impl HostEnt {
    /// An IPv4 reply.
    #[must_use]
    pub fn v4(name: Option<&str>, addrs: Vec<Ipv4Addr>) -> Self {
        Self {
            name: name.map(str::to_owned),
            addrs: HostAddrs::V4(addrs),
        }
    }

    /// An IPv6 reply.
    #[must_use]
    pub fn v6(name: Option<&str>, addrs: Vec<Ipv6Addr>) -> Self {
        Self {
            name: name.map(str::to_owned),
            addrs: HostAddrs::V6(addrs),
        }
    }

    /// Family of the address list.
    #[must_use]
    pub const fn family(&self) -> Family {
        match self.addrs {
            HostAddrs::V4(_) => Family::Inet,
            HostAddrs::V6(_) => Family::Inet6,
        }
    }

    /// Number of addresses in the reply.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.addrs {
            HostAddrs::V4(addrs) => addrs.len(),
            HostAddrs::V6(addrs) => addrs.len(),
        }
    }

    /// Returns true when the reply carries no addresses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Family-tagged address list of a host reply.
///
/// Every address in a reply shares one family, which is how `hostent`
/// behaves on the wire side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAddrs {
    /// IPv4 addresses.
    V4(Vec<Ipv4Addr>),
    /// IPv6 addresses.
    V6(Vec<Ipv6Addr>),
}
