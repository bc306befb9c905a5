//! Completion status codes.
//!
//! Every request finishes with exactly one [`Status`], delivered through the
//! completion callback. The set mirrors the classic resolver status space:
//! one success code and a small taxonomy of terminal failures.

use std::fmt;

/// Terminal status of a resolution request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// The request completed and the result chain is valid.
    Success,
    /// An allocation failed. Retained for interface parity with transports
    /// that report it; Rust allocation failure aborts, so the engine itself
    /// never produces this code.
    NoMem,
    /// The request was malformed, such as a missing channel.
    BadQuery,
    /// No name could be resolved. Raised when both node and service are
    /// absent, when numeric-only resolution fails, and when a symbolic
    /// service is unknown to the database.
    NoName,
    /// The hints flags contradict the other arguments.
    BadFlags,
    /// An address family was unusable, either in the hints or in a result
    /// record during service defaulting.
    BadFamily,
    /// The protocol constraint could not be satisfied by the database.
    BadHints,
    /// A canonical name was requested but none is available.
    BadName,
    /// The state machine reached a state with no defined transition.
    FormErr,
}

impl Status {
    /// Human-readable description, in the style of `strerror`.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Success => "successful completion",
            Self::NoMem => "out of memory",
            Self::BadQuery => "bad query",
            Self::NoName => "name or service not known",
            Self::BadFlags => "invalid flags",
            Self::BadFamily => "address family not supported",
            Self::BadHints => "unsatisfiable protocol hints",
            Self::BadName => "canonical name not available",
            Self::FormErr => "resolver state error",
        }
    }

    /// Returns true for [`Status::Success`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true for every code that terminates a request in failure.
    #[must_use]
    pub const fn is_terminal_failure(self) -> bool {
        !matches!(self, Self::Success)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl std::error::Error for Status {}
