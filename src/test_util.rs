//! Test utilities: deterministic DNS channel mock and logging helpers.
//!
//! [`MockDnsChannel`] scripts replies per (name, family) pair and either
//! answers synchronously or queues queries until the test pumps the
//! channel, which models one turn of an embedder's event loop. [`capture`]
//! builds a completion callback that records its single invocation and
//! panics on a second one, so every test doubles as an exactly-once check.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::rc::Rc;
use std::sync::Once;

use tracing::{debug, warn};

use crate::addrinfo::AddrInfo;
use crate::channel::{DnsChannel, HostCallback, HostEnt};
use crate::hints::Family;
use crate::resolve::AddrInfoCallback;
use crate::status::Status;

static INIT_LOGGING: Once = Once::new();

/// Initialize tracing for tests with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

/// One scripted reply for the mock channel.
#[derive(Debug, Clone)]
pub struct MockReply {
    /// Status to deliver.
    pub status: Status,
    /// Timeouts the transport claims to have observed.
    pub timeouts: u32,
    /// Reply body for success statuses.
    pub host: Option<HostEnt>,
}

impl MockReply {
    /// Successful IPv4 reply.
    #[must_use]
    pub fn v4(name: Option<&str>, addrs: &[Ipv4Addr]) -> Self {
        Self {
            status: Status::Success,
            timeouts: 0,
            host: Some(HostEnt::v4(name, addrs.to_vec())),
        }
    }

    /// Successful IPv6 reply.
    #[must_use]
    pub fn v6(name: Option<&str>, addrs: &[Ipv6Addr]) -> Self {
        Self {
            status: Status::Success,
            timeouts: 0,
            host: Some(HostEnt::v6(name, addrs.to_vec())),
        }
    }

    /// Failed reply with the given status.
    #[must_use]
    pub const fn failure(status: Status) -> Self {
        Self {
            status,
            timeouts: 0,
            host: None,
        }
    }

    /// Attaches a timeout count to the reply.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: u32) -> Self {
        self.timeouts = timeouts;
        self
    }
}

struct PendingQuery {
    name: String,
    family: Family,
    callback: HostCallback,
}

/// Scripted, deterministic [`DnsChannel`].
///
/// Replies are scripted per (name, family) and consumed in FIFO order. A
/// query with no scripted reply is answered with a miss. In the default
/// deferred mode queries queue until [`MockDnsChannel::pump`] delivers
/// them; [`MockDnsChannel::immediate`] builds a channel that answers inside
/// `resolve_host`, like a transport with a hot cache.
pub struct MockDnsChannel {
    scripts: RefCell<Vec<(String, Family, VecDeque<MockReply>)>>,
    pending: RefCell<VecDeque<PendingQuery>>,
    queries: RefCell<Vec<(String, Family)>>,
    deliver_inline: Cell<bool>,
}

impl MockDnsChannel {
    /// Deferred-delivery channel; tests drive it with
    /// [`MockDnsChannel::pump`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            scripts: RefCell::new(Vec::new()),
            pending: RefCell::new(VecDeque::new()),
            queries: RefCell::new(Vec::new()),
            deliver_inline: Cell::new(false),
        }
    }

    /// Channel that answers queries synchronously inside `resolve_host`.
    #[must_use]
    pub fn immediate() -> Self {
        let channel = Self::new();
        channel.deliver_inline.set(true);
        channel
    }

    /// This channel as a trait handle for [`crate::getaddrinfo`].
    #[must_use]
    pub fn handle(self: &Rc<Self>) -> Rc<dyn DnsChannel> {
        Rc::clone(self) as Rc<dyn DnsChannel>
    }

    /// Scripts the next reply for `(name, family)`.
    pub fn script(&self, name: &str, family: Family, reply: MockReply) {
        let mut scripts = self.scripts.borrow_mut();
        if let Some((_, _, queue)) = scripts
            .iter_mut()
            .find(|(n, f, _)| n == name && *f == family)
        {
            queue.push_back(reply);
        } else {
            scripts.push((name.to_owned(), family, VecDeque::from([reply])));
        }
    }

    /// Delivers the oldest pending query. Returns false when none waited.
    pub fn pump(&self) -> bool {
        let query = self.pending.borrow_mut().pop_front();
        match query {
            Some(query) => {
                self.deliver(query);
                true
            }
            None => false,
        }
    }

    /// Pumps until the queue is empty, returning how many queries ran.
    pub fn pump_all(&self) -> usize {
        let mut delivered = 0;
        while self.pump() {
            delivered += 1;
        }
        delivered
    }

    /// Number of queries waiting for delivery.
    #[must_use]
    pub fn pending_queries(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Every query issued so far, in order.
    #[must_use]
    pub fn queries(&self) -> Vec<(String, Family)> {
        self.queries.borrow().clone()
    }

    fn take_reply(&self, name: &str, family: Family) -> Option<MockReply> {
        let mut scripts = self.scripts.borrow_mut();
        scripts
            .iter_mut()
            .find(|(n, f, _)| n == name && *f == family)
            .and_then(|(_, _, queue)| queue.pop_front())
    }

    fn deliver(&self, query: PendingQuery) {
        // Take the reply before invoking the continuation: the continuation
        // may re-enter resolve_host on this same channel.
        let reply = self.take_reply(&query.name, query.family);
        match reply {
            Some(reply) => {
                debug!(
                    name = %query.name,
                    family = %query.family,
                    status = %reply.status,
                    "mock channel delivering reply"
                );
                (query.callback)(reply.status, reply.timeouts, reply.host.as_ref());
            }
            None => {
                warn!(
                    name = %query.name,
                    family = %query.family,
                    "unscripted query, answering with a miss"
                );
                (query.callback)(Status::NoName, 0, None);
            }
        }
    }
}

impl Default for MockDnsChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl DnsChannel for MockDnsChannel {
    fn resolve_host(&self, name: &str, family: Family, callback: HostCallback) {
        self.queries.borrow_mut().push((name.to_owned(), family));
        let query = PendingQuery {
            name: name.to_owned(),
            family,
            callback,
        };
        if self.deliver_inline.get() {
            self.deliver(query);
        } else {
            self.pending.borrow_mut().push_back(query);
        }
    }
}

/// Completion outcome recorded by [`capture`].
pub type CapturedResult = Rc<RefCell<Option<(Status, u32, Option<Box<AddrInfo>>)>>>;

/// Builds a completion callback that records its single invocation.
///
/// The callback panics if it is ever invoked twice, so every test using it
/// also verifies the exactly-once contract.
#[must_use]
pub fn capture() -> (CapturedResult, AddrInfoCallback) {
    let slot: CapturedResult = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&slot);
    let callback: AddrInfoCallback = Box::new(move |status, timeouts, result| {
        let previous = sink.borrow_mut().replace((status, timeouts, result));
        assert!(
            previous.is_none(),
            "completion callback invoked more than once"
        );
    });
    (slot, callback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_replies_consume_in_order() {
        let channel = MockDnsChannel::new();
        channel.script("h.example", Family::Inet, MockReply::failure(Status::NoName));
        channel.script(
            "h.example",
            Family::Inet,
            MockReply::v4(None, &[Ipv4Addr::LOCALHOST]),
        );

        let first = channel.take_reply("h.example", Family::Inet).unwrap();
        assert_eq!(first.status, Status::NoName);
        let second = channel.take_reply("h.example", Family::Inet).unwrap();
        assert_eq!(second.status, Status::Success);
        assert!(channel.take_reply("h.example", Family::Inet).is_none());
    }

    #[test]
    fn deferred_channel_queues_until_pumped() {
        let channel = Rc::new(MockDnsChannel::new());
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        channel.resolve_host(
            "x.example",
            Family::Inet,
            Box::new(move |status, _, _| {
                assert_eq!(status, Status::NoName);
                flag.set(true);
            }),
        );

        assert_eq!(channel.pending_queries(), 1);
        assert!(!fired.get());
        assert!(channel.pump());
        assert!(fired.get());
        assert!(!channel.pump());
    }

    #[test]
    fn capture_records_one_completion() {
        let (slot, callback) = capture();
        callback(Status::Success, 3, None);
        let captured = slot.borrow();
        let (status, timeouts, _) = captured.as_ref().unwrap();
        assert_eq!(*status, Status::Success);
        assert_eq!(*timeouts, 3);
    }
}
