//! Addrsolve: asynchronous `getaddrinfo` over a pluggable DNS channel.
//!
//! # Overview
//!
//! Addrsolve implements the POSIX `getaddrinfo` contract as a
//! callback-driven resolution engine. It does not own a transport: host
//! lookups go through a caller-supplied [`DnsChannel`], and symbolic
//! service names resolve against a synchronous [`NetDatabase`]. Given a
//! node string, a service string and a [`Hints`] record, a request walks a
//! fixed sequence of steps (numeric literals first, then DNS, then
//! canonical-name selection, then service resolution) and completes by
//! invoking the completion callback exactly once.
//!
//! # Core Guarantees
//!
//! - The completion callback fires exactly once per request, on success and
//!   on every failure path.
//! - Host work always finishes before service work, so the service step can
//!   stamp a port into every resolved record.
//! - On success the caller receives ownership of the result chain; on
//!   failure the partial chain has already been released.
//! - A request suspends only inside [`DnsChannel::resolve_host`].
//!   Everything else runs synchronously on the caller's thread, and
//!   concurrent requests on one channel stay independent.
//!
//! # Module Structure
//!
//! - [`status`]: completion status codes
//! - [`hints`]: resolution hints, flags, family and protocol identifiers
//! - [`addrinfo`]: resolved endpoint records and the result chain
//! - [`channel`]: the asynchronous DNS channel interface
//! - [`netdb`]: the services and protocols database
//! - [`resolve`]: the resolution engine
//! - [`test_util`]: deterministic channel mock and test logging helpers
//!
//! # Example
//!
//! ```ignore
//! use std::rc::Rc;
//! use addrsolve::{getaddrinfo, test_util::MockDnsChannel};
//!
//! let channel = Rc::new(MockDnsChannel::new());
//! getaddrinfo(
//!     Some(channel.handle()),
//!     Some("127.0.0.1"),
//!     Some("80"),
//!     None,
//!     Box::new(|status, _timeouts, result| {
//!         if let Some(head) = result {
//!             println!("{status}: {}", head.addr);
//!         }
//!     }),
//! );
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]

pub mod addrinfo;
pub mod channel;
pub mod hints;
pub mod netdb;
pub mod resolve;
pub mod status;
pub mod test_util;

pub use addrinfo::{freeaddrinfo, AddrInfo, SockAddr};
pub use channel::{DnsChannel, HostAddrs, HostCallback, HostEnt};
pub use hints::{AiFlags, Family, Hints, Protocol, SockType};
pub use netdb::{NetDatabase, NetDbError, ProtoEntry, ServEntry, StaticNetDb};
pub use resolve::{getaddrinfo, getaddrinfo_with_db, AddrInfoCallback};
pub use status::Status;
