use std::io;
use std::net::IpAddr;

use crate::icmp::Family;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the transports and the echo client.
#[derive(Debug)]
pub enum Error {
    /// An operating system error. Missing raw socket privileges show up here
    /// as [`io::ErrorKind::PermissionDenied`].
    Io(io::Error),
    /// The interface has no usable address of the requested family.
    NoBindAddress { family: Family, interface: String },
    /// An address of the wrong family was handed to a single-family transport.
    FamilyMismatch { expected: Family, addr: IpAddr },
    /// A received datagram could not be decoded.
    Parse(String),
    /// A peer address carried an IPv6 zone that does not belong to the
    /// transport's interface.
    UnknownZone(String),
    /// The caller's cancellation token fired.
    Cancelled,
    /// The transport has been closed.
    Closed,
    /// Raw ICMP sockets are not implemented for this operating system.
    Unimplemented(&'static str),
}

impl Error {
    /// Reports whether the error was caused by missing privileges, so callers
    /// can skip gracefully instead of failing.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == io::ErrorKind::PermissionDenied)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub fn is_unimplemented(&self) -> bool {
        matches!(self, Error::Unimplemented(_))
    }

    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "{}", e),
            Error::NoBindAddress { family, interface } => {
                write!(f, "no valid {} bind address for {:?}", family, interface)
            }
            Error::FamilyMismatch { expected, addr } => write!(
                f,
                "{} addresses must be used with an {} connection, got {}",
                expected, expected, addr
            ),
            Error::Parse(msg) => write!(f, "malformed ICMP datagram: {}", msg),
            Error::UnknownZone(zone) => write!(f, "unknown IPv6 zone ID: {}", zone),
            Error::Cancelled => write!(f, "operation cancelled"),
            Error::Closed => write!(f, "use of closed ICMP connection"),
            Error::Unimplemented(os) => write!(f, "icmpx: unimplemented on {}", os),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
