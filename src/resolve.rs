//! The resolution engine.
//!
//! A request is a heap-owned context driven by `next_state`, a dispatcher
//! over a bitmask of outstanding work. Every step either re-enters the
//! dispatcher or terminates the request through the completion callback,
//! which fires exactly once. Asynchronous steps move the context into the
//! channel continuation and get it back when the reply arrives; there is no
//! other control path.
//!
//! Step priority encodes one contract: all host work finishes before any
//! service work, so the service steps can stamp a port into every record
//! that will ever exist.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::addrinfo::{chain_prepend, chain_try_for_each_mut, AddrInfo};
use crate::channel::{DnsChannel, HostAddrs, HostCallback, HostEnt};
use crate::hints::{AiFlags, Family, Hints, Protocol, SockType};
use crate::netdb::{NetDatabase, StaticNetDb};
use crate::status::Status;

/// Completion callback for [`getaddrinfo`].
///
/// Invoked exactly once per request. On [`Status::Success`] the third
/// argument is the head of the result chain and ownership transfers to the
/// callee; on any other status it is `None` and the engine has already
/// released the partial chain.
pub type AddrInfoCallback = Box<dyn FnOnce(Status, u32, Option<Box<AddrInfo>>)>;

// Outstanding-work bits. Each bit transitions to clear at most once per
// request.
const SERV: u8 = 1 << 0;
const NUMERIC_SERV: u8 = 1 << 1;
const HOST_INET: u8 = 1 << 2;
const NUMERIC_HOST_INET: u8 = 1 << 3;
const NUMERIC_HOST_INET6: u8 = 1 << 4;
const CANONICAL: u8 = 1 << 5;
const HOST_INET6: u8 = 1 << 6;
const ANY_HOST: u8 = HOST_INET | HOST_INET6 | NUMERIC_HOST_INET | NUMERIC_HOST_INET6;

/// Pending-work bitmask of one request. Empty means terminal success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StateMask(u8);

impl StateMask {
    const fn any(self, bits: u8) -> bool {
        self.0 & bits != 0
    }

    const fn has(self, bits: u8) -> bool {
        self.0 & bits == bits
    }

    fn set(&mut self, bits: u8) {
        self.0 |= bits;
    }

    fn clear(&mut self, bits: u8) {
        self.0 &= !bits;
    }

    const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// One in-flight request.
///
/// Owns every resource of the resolution: the node and service copies, the
/// hints, the partial result chain and the completion callback. The channel
/// handle is deliberately weak: while a query is in flight the channel owns
/// the continuation (and through it this context), so an owning handle back
/// at the channel would form a cycle and defeat drop-based cancellation.
/// The context moves by value through the state machine and into channel
/// continuations; it is destroyed exactly once, by [`Gaicb::finish`] or by
/// the channel dropping it.
struct Gaicb {
    channel: Weak<dyn DnsChannel>,
    db: Rc<dyn NetDatabase>,
    node: Option<String>,
    service: Option<String>,
    hints: Hints,
    result: Option<Box<AddrInfo>>,
    callback: AddrInfoCallback,
    state: StateMask,
    timeouts: u32,
}

impl Gaicb {
    fn prepend(&mut self, node: Box<AddrInfo>) {
        chain_prepend(&mut self.result, node);
    }

    /// Terminates the request: fires the callback, then releases everything
    /// the request still owns. On failure the partial chain dies here and
    /// the callback sees `None`.
    fn finish(self: Box<Self>, status: Status) {
        let this = *self;
        debug!(status = %status, timeouts = this.timeouts, "request finished");
        let result = if status.is_success() { this.result } else { None };
        (this.callback)(status, this.timeouts, result);
    }
}

/// Starts an asynchronous `getaddrinfo` request against the builtin
/// services database.
///
/// `node` is the host to resolve, `service` the port or service name; at
/// least one must be present. Absent `hints` behave like
/// [`Hints::default`]. The completion callback fires exactly once, possibly
/// before this function returns when no DNS work is needed.
///
/// Validation failures complete synchronously: a missing channel yields
/// [`Status::BadQuery`], missing node and service [`Status::NoName`],
/// [`AiFlags::CANONNAME`] without a node or [`AiFlags::ALL`] without
/// [`AiFlags::V4MAPPED`] yield [`Status::BadFlags`].
pub fn getaddrinfo(
    channel: Option<Rc<dyn DnsChannel>>,
    node: Option<&str>,
    service: Option<&str>,
    hints: Option<&Hints>,
    callback: AddrInfoCallback,
) {
    getaddrinfo_with_db(
        channel,
        node,
        service,
        hints,
        Rc::new(StaticNetDb::builtin()),
        callback,
    );
}

/// Like [`getaddrinfo`], resolving symbolic services against a
/// caller-supplied database.
pub fn getaddrinfo_with_db(
    channel: Option<Rc<dyn DnsChannel>>,
    node: Option<&str>,
    service: Option<&str>,
    hints: Option<&Hints>,
    db: Rc<dyn NetDatabase>,
    callback: AddrInfoCallback,
) {
    let default_hints;
    let hints = match hints {
        Some(hints) => hints,
        None => {
            default_hints = Hints::default();
            &default_hints
        }
    };

    let Some(channel) = channel else {
        callback(Status::BadQuery, 0, None);
        return;
    };

    if node.is_none() && service.is_none() {
        // At least one must be set.
        callback(Status::NoName, 0, None);
        return;
    }

    if hints.flags.contains(AiFlags::CANONNAME) && node.is_none() {
        // Cannot determine a canonical name without a name.
        callback(Status::BadFlags, 0, None);
        return;
    }

    if hints.flags.contains(AiFlags::ALL) && !hints.flags.contains(AiFlags::V4MAPPED) {
        callback(Status::BadFlags, 0, None);
        return;
    }

    let cb = Box::new(Gaicb {
        channel: Rc::downgrade(&channel),
        db,
        node: node.map(str::to_owned),
        service: service.map(str::to_owned),
        hints: hints.clone(),
        result: None,
        callback,
        state: initial_state(hints, node.is_some(), service.is_some()),
        timeouts: 0,
    });

    next_state(cb);
}

/// Derives the set of steps a request has to run.
fn initial_state(hints: &Hints, have_node: bool, have_service: bool) -> StateMask {
    let inet = matches!(hints.family, Family::Unspec | Family::Inet)
        || (hints.family == Family::Inet6 && hints.flags.contains(AiFlags::V4MAPPED));
    let inet6 = matches!(hints.family, Family::Unspec | Family::Inet6);

    let mut state = StateMask(0);
    if have_service {
        state.set(SERV | NUMERIC_SERV);
    }
    if have_node && inet {
        state.set(HOST_INET);
    }
    if have_node && inet6 {
        state.set(HOST_INET6);
    }
    // The numeric steps also materialise the passive or loopback default
    // when the node is absent, so they do not depend on node presence.
    if inet {
        state.set(NUMERIC_HOST_INET);
    }
    if inet6 {
        state.set(NUMERIC_HOST_INET6);
    }
    if hints.flags.contains(AiFlags::CANONNAME) {
        state.set(CANONICAL);
    }
    state
}

/// Evaluates the request state and performs the next step.
///
/// Fixed priority: numeric host parsing, then DNS host lookups, then the
/// canonical name, then the service. The bit for a step is cleared before
/// the step runs, so each step runs at most once. An empty mask completes
/// the request; an undispatchable mask fails it.
fn next_state(mut cb: Box<Gaicb>) {
    trace!(state = %format_args!("{:#04x}", cb.state.0), "next_state");

    if cb.state.has(NUMERIC_HOST_INET6) {
        cb.state.clear(NUMERIC_HOST_INET6);
        try_pton_inet6(cb);
        return;
    }

    if cb.state.has(NUMERIC_HOST_INET) {
        cb.state.clear(NUMERIC_HOST_INET);
        try_pton_inet(cb);
        return;
    }

    if cb.state.any(ANY_HOST) && cb.hints.flags.contains(AiFlags::NUMERICHOST) {
        // DNS is forbidden and the literal parse produced nothing.
        cb.finish(Status::NoName);
        return;
    }

    if cb.state.has(HOST_INET6) {
        cb.state.clear(HOST_INET6);
        resolve_host_inet6(cb);
        return;
    }

    if cb.state.has(HOST_INET) {
        cb.state.clear(HOST_INET);
        resolve_host_inet(cb);
        return;
    }

    if cb.state.has(CANONICAL) {
        cb.state.clear(CANONICAL);
        find_canonical(cb);
        return;
    }

    if cb.state.has(NUMERIC_SERV) {
        cb.state.clear(NUMERIC_SERV);
        try_serv_strtol(cb);
        return;
    }

    if cb.state.has(SERV) && cb.hints.flags.contains(AiFlags::NUMERICSERV) {
        // The services database is forbidden and the port was not numeric.
        cb.finish(Status::NoName);
        return;
    }

    if cb.state.has(SERV) {
        cb.state.clear(SERV);
        resolve_serv(cb);
        return;
    }

    if cb.state.is_empty() {
        cb.finish(Status::Success);
        return;
    }

    // No transition is defined for this bit combination.
    cb.finish(Status::FormErr);
}

/// Resolves the node as an IPv4 literal, without DNS.
///
/// An absent node materialises the wildcard or loopback default. A parse
/// failure is not an error: the host bits stay as they are and DNS gets its
/// chance. A successful parse settles host resolution for both families.
fn try_pton_inet(mut cb: Box<Gaicb>) {
    let addr = match cb.node.as_deref() {
        None if cb.hints.flags.contains(AiFlags::PASSIVE) => Ipv4Addr::UNSPECIFIED,
        None => Ipv4Addr::LOCALHOST,
        Some(node) => match node.parse::<Ipv4Addr>() {
            Ok(addr) => addr,
            Err(_) => {
                // Not a numeric host, so continue.
                next_state(cb);
                return;
            }
        },
    };

    // This step only runs for an Inet6 request when V4MAPPED is set; keep
    // the record in the requested family by mapping the address.
    let mut ai = if cb.hints.family == Family::Inet6 {
        AddrInfo::from_inet6(&cb.hints, addr.to_ipv6_mapped())
    } else {
        AddrInfo::from_inet(&cb.hints, addr)
    };

    if cb.hints.flags.contains(AiFlags::CANONNAME) {
        // glibc surfaces the literal itself as the canonical name.
        ai.canonname = cb.node.clone();
    }

    cb.prepend(ai);
    cb.state.clear(HOST_INET | HOST_INET6);
    next_state(cb);
}

/// Resolves the node as an IPv6 literal, without DNS.
///
/// Same contract as [`try_pton_inet`] for the other family.
fn try_pton_inet6(mut cb: Box<Gaicb>) {
    let addr = match cb.node.as_deref() {
        None if cb.hints.flags.contains(AiFlags::PASSIVE) => Ipv6Addr::UNSPECIFIED,
        None => Ipv6Addr::LOCALHOST,
        Some(node) => match node.parse::<Ipv6Addr>() {
            Ok(addr) => addr,
            Err(_) => {
                // Not a numeric host, so continue.
                next_state(cb);
                return;
            }
        },
    };

    let mut ai = AddrInfo::from_inet6(&cb.hints, addr);

    if cb.hints.flags.contains(AiFlags::CANONNAME) {
        ai.canonname = cb.node.clone();
    }

    cb.prepend(ai);
    cb.state.clear(HOST_INET | HOST_INET6);
    next_state(cb);
}

/// Issues the IPv4 host query through the channel.
fn resolve_host_inet(cb: Box<Gaicb>) {
    issue_host_query(cb, Family::Inet);
}

/// Issues the IPv6 host query through the channel.
fn resolve_host_inet6(cb: Box<Gaicb>) {
    issue_host_query(cb, Family::Inet6);
}

fn issue_host_query(cb: Box<Gaicb>, family: Family) {
    let Some(channel) = cb.channel.upgrade() else {
        // The channel is gone. Cancellation drops the request without
        // firing the callback.
        debug!(family = %family, "channel dropped, releasing request");
        return;
    };
    // Host bits are only derived when a node is present.
    let name = cb.node.clone().unwrap_or_default();
    let continuation: HostCallback =
        Box::new(move |status, timeouts, host| host_callback(cb, status, timeouts, host));
    channel.resolve_host(&name, family, continuation);
}

/// Continuation for both host queries.
///
/// Appends one record per returned address, keyed on the family the reply
/// actually carries: an `Inet` reply may answer an `Inet6` query when the
/// transport falls back.
fn host_callback(mut cb: Box<Gaicb>, status: Status, timeouts: u32, host: Option<&HostEnt>) {
    cb.timeouts += timeouts;

    if !status.is_success() {
        if cb.state.any(ANY_HOST) {
            // There is still a possibility of getting a host lookup.
            next_state(cb);
        } else {
            // This was the last attempt. Fail.
            cb.finish(status);
        }
        return;
    }

    let Some(host) = host else {
        // A success reply without a body violates the channel contract.
        cb.finish(Status::FormErr);
        return;
    };

    match &host.addrs {
        HostAddrs::V4(addrs) => {
            for addr in addrs {
                let ai = AddrInfo::from_inet(&cb.hints, *addr);
                cb.prepend(ai);
            }
            // The transport answers Inet6 queries with Inet records when it
            // falls back, so a dedicated Inet query would be redundant.
            cb.state.clear(HOST_INET);
        }
        HostAddrs::V6(addrs) => {
            for addr in addrs {
                let ai = AddrInfo::from_inet6(&cb.hints, *addr);
                cb.prepend(ai);
            }
            cb.state.clear(HOST_INET6);
            if cb.hints.family == Family::Inet6 && !cb.hints.flags.contains(AiFlags::ALL) {
                // The caller asked for Inet6 and got it; without ALL there
                // is no reason to collect mapped Inet records as well.
                cb.state.clear(HOST_INET);
            }
        }
    }

    if cb.state.has(CANONICAL) {
        // The reply name is free; take it while it is here.
        if let Some(name) = &host.name {
            if let Some(head) = cb.result.as_deref_mut() {
                head.canonname = Some(name.clone());
            }
        }
    }

    next_state(cb);
}

/// Surfaces a canonical name on the head of the chain.
///
/// The numeric and DNS steps attach names at different positions, and the
/// caller only looks at the head. Lift a trailing name forward when the
/// head has none; with no name anywhere the request fails.
fn find_canonical(mut cb: Box<Gaicb>) {
    if cb
        .result
        .as_deref()
        .is_some_and(|head| head.canonname.is_some())
    {
        // Already in place.
        next_state(cb);
        return;
    }

    let lifted = cb
        .result
        .as_deref()
        .and_then(|head| head.iter().skip(1).find_map(|ai| ai.canonname.clone()));

    match (lifted, cb.result.as_deref_mut()) {
        (Some(name), Some(head)) => {
            head.canonname = Some(name);
            next_state(cb);
        }
        _ => cb.finish(Status::BadName),
    }
}

/// Resolves the service as a decimal port number.
///
/// A string that is not a whole base-10 port falls through to the symbolic
/// lookup with the service bit still set; out-of-range values count as not
/// numeric. A successful parse stamps the port into every record.
fn try_serv_strtol(mut cb: Box<Gaicb>) {
    let Some(port) = cb.service.as_deref().and_then(|s| s.parse::<u16>().ok()) else {
        // Not a numeric port.
        next_state(cb);
        return;
    };

    if let Err(status) = apply_service_defaults(&mut cb.result) {
        cb.finish(status);
        return;
    }

    let result = chain_try_for_each_mut(&mut cb.result, |ai| match ai.family {
        Family::Inet | Family::Inet6 => {
            ai.addr.set_port(port);
            Ok(())
        }
        // Should not happen unless the engine itself is bad.
        Family::Unspec => Err(Status::BadFamily),
    });
    if let Err(status) = result {
        cb.finish(status);
        return;
    }

    // No need to look up the service.
    cb.state.clear(SERV);
    next_state(cb);
}

/// Resolves the service through the services database.
///
/// Runs after defaulting, so every record carries a concrete protocol; the
/// protocol's canonical name keys the per-record service lookup.
fn resolve_serv(mut cb: Box<Gaicb>) {
    let Some(service) = cb.service.clone() else {
        // The service bit is only derived when a service string exists.
        cb.finish(Status::FormErr);
        return;
    };

    if let Err(status) = apply_service_defaults(&mut cb.result) {
        cb.finish(status);
        return;
    }

    let db = Rc::clone(&cb.db);
    let result = chain_try_for_each_mut(&mut cb.result, |ai| {
        if ai.family == Family::Unspec {
            return Err(Status::BadFamily);
        }
        let Some(proto) = db.protocol_by_number(ai.protocol) else {
            return Err(Status::BadHints);
        };
        let Some(serv) = db.service_by_name(&service, &proto.name) else {
            return Err(Status::NoName);
        };
        ai.addr.set_port(serv.port);
        Ok(())
    });
    if let Err(status) = result {
        cb.finish(status);
        return;
    }

    next_state(cb);
}

/// Fills in the socket type and protocol defaults on every record.
///
/// A zero socket type becomes `STREAM`; a zero protocol follows from the
/// socket type. Anything underivable is a family error, the signal that a
/// record was corrupted.
fn apply_service_defaults(chain: &mut Option<Box<AddrInfo>>) -> Result<(), Status> {
    chain_try_for_each_mut(chain, |ai| {
        if ai.socktype == SockType::UNSPEC {
            match ai.family {
                Family::Inet | Family::Inet6 => ai.socktype = SockType::STREAM,
                Family::Unspec => return Err(Status::BadFamily),
            }
        }
        if ai.protocol == Protocol::UNSPEC {
            ai.protocol = match ai.socktype {
                SockType::STREAM => Protocol::TCP,
                SockType::DGRAM => Protocol::UDP,
                SockType::RAW => Protocol::RAW,
                SockType::SEQPACKET => Protocol::SCTP,
                _ => return Err(Status::BadFamily),
            };
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_unspec_with_node_and_service() {
        let state = initial_state(&Hints::new(), true, true);
        assert!(state.has(SERV | NUMERIC_SERV));
        assert!(state.has(HOST_INET | HOST_INET6));
        assert!(state.has(NUMERIC_HOST_INET | NUMERIC_HOST_INET6));
        assert!(!state.has(CANONICAL));
    }

    #[test]
    fn initial_state_without_node_keeps_numeric_bits() {
        let state = initial_state(&Hints::new(), false, true);
        assert!(!state.any(HOST_INET | HOST_INET6));
        assert!(state.has(NUMERIC_HOST_INET | NUMERIC_HOST_INET6));
    }

    #[test]
    fn initial_state_inet6_excludes_inet_bits() {
        let hints = Hints::new().with_family(Family::Inet6);
        let state = initial_state(&hints, true, false);
        assert!(!state.any(HOST_INET | NUMERIC_HOST_INET));
        assert!(state.has(HOST_INET6 | NUMERIC_HOST_INET6));
    }

    #[test]
    fn initial_state_v4mapped_widens_inet6() {
        let hints = Hints::new()
            .with_family(Family::Inet6)
            .with_flags(AiFlags::V4MAPPED);
        let state = initial_state(&hints, true, false);
        assert!(state.has(HOST_INET | NUMERIC_HOST_INET));
        assert!(state.has(HOST_INET6 | NUMERIC_HOST_INET6));
    }

    #[test]
    fn initial_state_inet_excludes_inet6_bits() {
        let hints = Hints::new().with_family(Family::Inet);
        let state = initial_state(&hints, true, true);
        assert!(!state.any(HOST_INET6 | NUMERIC_HOST_INET6));
        assert!(state.has(HOST_INET | NUMERIC_HOST_INET));
    }

    #[test]
    fn initial_state_canonname_sets_canonical() {
        let hints = Hints::new().with_flags(AiFlags::CANONNAME);
        let state = initial_state(&hints, true, false);
        assert!(state.has(CANONICAL));
    }

    #[test]
    fn defaults_fill_stream_tcp() {
        let mut chain = Some(AddrInfo::from_inet(&Hints::new(), Ipv4Addr::LOCALHOST));
        apply_service_defaults(&mut chain).unwrap();
        let head = chain.as_deref().unwrap();
        assert_eq!(head.socktype, SockType::STREAM);
        assert_eq!(head.protocol, Protocol::TCP);
    }

    #[test]
    fn defaults_follow_socket_type() {
        let hints = Hints::new().with_socktype(SockType::DGRAM);
        let mut chain = Some(AddrInfo::from_inet(&hints, Ipv4Addr::LOCALHOST));
        apply_service_defaults(&mut chain).unwrap();
        assert_eq!(chain.as_deref().unwrap().protocol, Protocol::UDP);

        let hints = Hints::new().with_socktype(SockType::SEQPACKET);
        let mut chain = Some(AddrInfo::from_inet(&hints, Ipv4Addr::LOCALHOST));
        apply_service_defaults(&mut chain).unwrap();
        assert_eq!(chain.as_deref().unwrap().protocol, Protocol::SCTP);
    }

    #[test]
    fn defaults_keep_explicit_protocol() {
        let hints = Hints::new()
            .with_socktype(SockType::DGRAM)
            .with_protocol(Protocol::SCTP);
        let mut chain = Some(AddrInfo::from_inet(&hints, Ipv4Addr::LOCALHOST));
        apply_service_defaults(&mut chain).unwrap();
        assert_eq!(chain.as_deref().unwrap().protocol, Protocol::SCTP);
    }

    #[test]
    fn defaults_reject_unknown_socket_type() {
        let hints = Hints::new().with_socktype(SockType(9));
        let mut chain = Some(AddrInfo::from_inet(&hints, Ipv4Addr::LOCALHOST));
        assert_eq!(
            apply_service_defaults(&mut chain).unwrap_err(),
            Status::BadFamily
        );
    }

    #[test]
    fn defaults_reject_corrupt_family() {
        let mut node = AddrInfo::from_inet(&Hints::new(), Ipv4Addr::LOCALHOST);
        node.family = Family::Unspec;
        let mut chain = Some(node);
        assert_eq!(
            apply_service_defaults(&mut chain).unwrap_err(),
            Status::BadFamily
        );
    }

    #[test]
    fn state_mask_ops() {
        let mut state = StateMask(0);
        state.set(SERV | CANONICAL);
        assert!(state.has(SERV));
        assert!(state.any(CANONICAL | HOST_INET));
        assert!(!state.has(SERV | HOST_INET));
        state.clear(SERV);
        assert!(!state.any(SERV));
        state.clear(CANONICAL);
        assert!(state.is_empty());
    }
}
