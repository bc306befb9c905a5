//! Resolution hints and the identifier types they carry.
//!
//! [`Hints`] narrows which resolutions a request produces. The flag bits
//! follow the POSIX `AI_*` set; socket types and protocol numbers keep their
//! conventional numeric values so results can flow straight into socket
//! creation.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Address family selector.
///
/// `Unspec` asks for every family the request can satisfy. Only these three
/// values exist; there is no way to hand the engine an unsupported family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Family {
    /// Any family.
    #[default]
    Unspec,
    /// IPv4.
    Inet,
    /// IPv6.
    Inet6,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unspec => f.write_str("unspec"),
            Self::Inet => f.write_str("inet"),
            Self::Inet6 => f.write_str("inet6"),
        }
    }
}

/// `AI_*` flag bitmask for a request.
///
/// Flags combine with `|`. The zero value carries no flags; the value used
/// when the caller passes no hints at all is [`AiFlags::DEFAULT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AiFlags(u32);

impl AiFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// The request is for a listening socket; absent nodes become the
    /// wildcard address instead of loopback.
    pub const PASSIVE: Self = Self(1);
    /// Surface the canonical name of the node on the head record.
    pub const CANONNAME: Self = Self(1 << 1);
    /// The node must be a numeric literal; DNS is forbidden.
    pub const NUMERICHOST: Self = Self(1 << 2);
    /// The service must be a numeric port; the services database is
    /// forbidden.
    pub const NUMERICSERV: Self = Self(1 << 3);
    /// Allow IPv4 answers to satisfy an IPv6 request as mapped addresses.
    pub const V4MAPPED: Self = Self(1 << 4);
    /// Together with [`AiFlags::V4MAPPED`], collect both native and mapped
    /// records instead of stopping at the first family that answers.
    pub const ALL: Self = Self(1 << 5);
    /// Accepted for compatibility and ignored.
    pub const ADDRCONFIG: Self = Self(1 << 6);
    /// Flags assumed when the caller supplies no hints.
    pub const DEFAULT: Self = Self(Self::V4MAPPED.0 | Self::ADDRCONFIG.0);

    /// Returns true when every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true when no bits are set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Raw bit value.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for AiFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AiFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Socket type number, using the conventional `SOCK_*` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SockType(pub u16);

impl SockType {
    /// Any socket type.
    pub const UNSPEC: Self = Self(0);
    /// Stream socket.
    pub const STREAM: Self = Self(1);
    /// Datagram socket.
    pub const DGRAM: Self = Self(2);
    /// Raw socket.
    pub const RAW: Self = Self(3);
    /// Sequenced-packet socket.
    pub const SEQPACKET: Self = Self(5);
}

/// Protocol number, using the conventional `IPPROTO_*` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Protocol(pub u8);

impl Protocol {
    /// Any protocol.
    pub const UNSPEC: Self = Self(0);
    /// TCP.
    pub const TCP: Self = Self(6);
    /// UDP.
    pub const UDP: Self = Self(17);
    /// SCTP.
    pub const SCTP: Self = Self(132);
    /// Raw IP.
    pub const RAW: Self = Self(255);
}

/// Caller-supplied constraints for a request.
///
/// The default value matches what the engine assumes when the caller passes
/// no hints: any family, any socket type, any protocol and
/// [`AiFlags::DEFAULT`].
#[derive(Debug, Clone)]
pub struct Hints {
    /// Request flags.
    pub flags: AiFlags,
    /// Requested address family.
    pub family: Family,
    /// Requested socket type, zero for any.
    pub socktype: SockType,
    /// Requested protocol, zero for any.
    pub protocol: Protocol,
}

impl Hints {
    /// Hints with no constraints and no flags at all.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            flags: AiFlags::NONE,
            family: Family::Unspec,
            socktype: SockType::UNSPEC,
            protocol: Protocol::UNSPEC,
        }
    }

    /// Sets the request flags.
    #[must_use]
    pub const fn with_flags(mut self, flags: AiFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the requested family.
    #[must_use]
    pub const fn with_family(mut self, family: Family) -> Self {
        self.family = family;
        self
    }

    /// Sets the requested socket type.
    #[must_use]
    pub const fn with_socktype(mut self, socktype: SockType) -> Self {
        self.socktype = socktype;
        self
    }

    /// Sets the requested protocol.
    #[must_use]
    pub const fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }
}

impl Default for Hints {
    fn default() -> Self {
        Self::new().with_flags(AiFlags::DEFAULT)
    }
}
