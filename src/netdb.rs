//! The services and protocols database.
//!
//! Symbolic service resolution needs two synchronous lookups: protocol
//! number to protocol name, and (service name, protocol name) to port. The
//! [`NetDatabase`] trait is that seam. [`StaticNetDb`] implements it over an
//! in-memory table, either the builtin IANA basics or the parsed contents of
//! `/etc/protocols` and `/etc/services`.
//!
//! Implementations take `&self` and are immutable after construction, so
//! they can be shared freely across requests.

use std::path::Path;

use thiserror::Error;

use crate::hints::Protocol;

/// Synchronous protocol and service lookups.
pub trait NetDatabase {
    /// Looks up a protocol entry by number.
    fn protocol_by_number(&self, number: Protocol) -> Option<ProtoEntry>;

    /// Looks up a service by name (or alias) and protocol name.
    ///
    /// Matching is ASCII case-insensitive, like the classic `getservbyname`.
    fn service_by_name(&self, name: &str, proto_name: &str) -> Option<ServEntry>;
}

/// One protocol database entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtoEntry {
    /// Official protocol name, e.g. `tcp`.
    pub name: String,
    /// Protocol number.
    pub number: Protocol,
    /// Alias names.
    pub aliases: Vec<String>,
}

/// One services database entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServEntry {
    /// Official service name, e.g. `http`.
    pub name: String,
    /// Port number, in host byte order.
    pub port: u16,
    /// Protocol name this entry applies to.
    pub proto: String,
    /// Alias names.
    pub aliases: Vec<String>,
}

/// Error loading a database from files.
#[derive(Debug, Error)]
pub enum NetDbError {
    /// A database file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path of the file that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A database parsed to nothing usable.
    #[error("no usable entries in {what} database")]
    Empty {
        /// Which database was empty.
        what: &'static str,
    },
}

// Enough of the IANA registry to resolve the common cases without touching
// the filesystem.
const BUILTIN_PROTOCOLS: &[(&str, u8, &[&str])] = &[
    ("icmp", 1, &["ICMP"]),
    ("tcp", 6, &["TCP"]),
    ("udp", 17, &["UDP"]),
    ("ipv6-icmp", 58, &["IPv6-ICMP"]),
    ("sctp", 132, &["SCTP"]),
    ("raw", 255, &["RAW"]),
];

const BUILTIN_SERVICES: &[(&str, u16, &str, &[&str])] = &[
    ("echo", 7, "tcp", &[]),
    ("echo", 7, "udp", &[]),
    ("ftp-data", 20, "tcp", &[]),
    ("ftp", 21, "tcp", &[]),
    ("ssh", 22, "tcp", &[]),
    ("telnet", 23, "tcp", &[]),
    ("smtp", 25, "tcp", &["mail"]),
    ("domain", 53, "tcp", &[]),
    ("domain", 53, "udp", &[]),
    ("http", 80, "tcp", &["www", "www-http"]),
    ("pop3", 110, "tcp", &["pop-3"]),
    ("ntp", 123, "udp", &[]),
    ("imap", 143, "tcp", &["imap2"]),
    ("snmp", 161, "udp", &[]),
    ("ldap", 389, "tcp", &[]),
    ("https", 443, "tcp", &[]),
    ("submission", 587, "tcp", &[]),
    ("rsync", 873, "tcp", &[]),
];

/// In-memory protocol and services database.
#[derive(Debug, Clone, Default)]
pub struct StaticNetDb {
    protocols: Vec<ProtoEntry>,
    services: Vec<ServEntry>,
}

impl StaticNetDb {
    /// Database preloaded with the builtin tables.
    #[must_use]
    pub fn builtin() -> Self {
        let protocols = BUILTIN_PROTOCOLS
            .iter()
            .map(|&(name, number, aliases)| ProtoEntry {
                name: name.to_owned(),
                number: Protocol(number),
                aliases: aliases.iter().map(|&a| a.to_owned()).collect(),
            })
            .collect();
        let services = BUILTIN_SERVICES
            .iter()
            .map(|&(name, port, proto, aliases)| ServEntry {
                name: name.to_owned(),
                port,
                proto: proto.to_owned(),
                aliases: aliases.iter().map(|&a| a.to_owned()).collect(),
            })
            .collect();
        Self {
            protocols,
            services,
        }
    }

    /// Database parsed from file contents in the `/etc/protocols` and
    /// `/etc/services` formats. Unparseable lines are skipped, like the
    /// classic readers do.
    #[must_use]
    pub fn from_contents(protocols: &str, services: &str) -> Self {
        let protocols = protocols.lines().filter_map(parse_protocols_line).collect();
        let services = services.lines().filter_map(parse_services_line).collect();
        Self {
            protocols,
            services,
        }
    }

    /// Database loaded from protocol and services files on disk.
    ///
    /// # Errors
    ///
    /// Returns [`NetDbError::Io`] when a file cannot be read and
    /// [`NetDbError::Empty`] when a file parses to no entries.
    pub fn from_files(protocols: &Path, services: &Path) -> Result<Self, NetDbError> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|source| NetDbError::Io {
                path: path.display().to_string(),
                source,
            })
        };
        let db = Self::from_contents(&read(protocols)?, &read(services)?);
        if db.protocols.is_empty() {
            return Err(NetDbError::Empty { what: "protocols" });
        }
        if db.services.is_empty() {
            return Err(NetDbError::Empty { what: "services" });
        }
        Ok(db)
    }

    /// Database loaded from the conventional system paths.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`StaticNetDb::from_files`].
    pub fn from_system() -> Result<Self, NetDbError> {
        Self::from_files(Path::new("/etc/protocols"), Path::new("/etc/services"))
    }

    /// Number of protocol entries.
    #[must_use]
    pub fn protocol_count(&self) -> usize {
        self.protocols.len()
    }

    /// Number of service entries.
    #[must_use]
    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

impl NetDatabase for StaticNetDb {
    fn protocol_by_number(&self, number: Protocol) -> Option<ProtoEntry> {
        self.protocols.iter().find(|p| p.number == number).cloned()
    }

    fn service_by_name(&self, name: &str, proto_name: &str) -> Option<ServEntry> {
        self.services
            .iter()
            .find(|s| {
                s.proto.eq_ignore_ascii_case(proto_name)
                    && (s.name.eq_ignore_ascii_case(name)
                        || s.aliases.iter().any(|a| a.eq_ignore_ascii_case(name)))
            })
            .cloned()
    }
}

/// Parses one `/etc/services` line: `<name> <port>/<proto> [alias...]`.
///
/// Comments and blank or malformed lines yield `None`.
fn parse_services_line(line: &str) -> Option<ServEntry> {
    let line = line.split('#').next().unwrap_or("");
    let mut fields = line.split_whitespace();

    let name = fields.next()?;
    let port_proto = fields.next()?;
    let (port, proto) = port_proto.split_once('/')?;
    let port: u16 = port.parse().ok()?;
    if proto.is_empty() {
        return None;
    }

    Some(ServEntry {
        name: name.to_owned(),
        port,
        proto: proto.to_owned(),
        aliases: fields.map(str::to_owned).collect(),
    })
}

/// Parses one `/etc/protocols` line: `<name> <number> [alias...]`.
fn parse_protocols_line(line: &str) -> Option<ProtoEntry> {
    let line = line.split('#').next().unwrap_or("");
    let mut fields = line.split_whitespace();

    let name = fields.next()?;
    let number: u8 = fields.next()?.parse().ok()?;

    Some(ProtoEntry {
        name: name.to_owned(),
        number: Protocol(number),
        aliases: fields.map(str::to_owned).collect(),
    })
}
