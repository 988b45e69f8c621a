pub mod packet;

pub use packet::*;

use std::net::IpAddr;

/// An IP address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Family::V4,
            IpAddr::V6(_) => Family::V6,
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Family::V4 => write!(f, "IPv4"),
            Family::V6 => write!(f, "IPv6"),
        }
    }
}

/// An ICMPv4 message type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Icmpv4Type(pub u8);

impl Icmpv4Type {
    pub const ECHO_REPLY: Self = Self(0);
    pub const DESTINATION_UNREACHABLE: Self = Self(3);
    pub const REDIRECT: Self = Self(5);
    pub const ECHO_REQUEST: Self = Self(8);
    pub const TIME_EXCEEDED: Self = Self(11);
    pub const PARAMETER_PROBLEM: Self = Self(12);
}

/// An ICMPv6 message type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Icmpv6Type(pub u8);

impl Icmpv6Type {
    pub const DESTINATION_UNREACHABLE: Self = Self(1);
    pub const PACKET_TOO_BIG: Self = Self(2);
    pub const TIME_EXCEEDED: Self = Self(3);
    pub const PARAMETER_PROBLEM: Self = Self(4);
    pub const ECHO_REQUEST: Self = Self(128);
    pub const ECHO_REPLY: Self = Self(129);
    pub const NEIGHBOR_SOLICITATION: Self = Self(135);
    pub const NEIGHBOR_ADVERTISEMENT: Self = Self(136);
}

/// The type of an ICMP message, tagged with its protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    V4(Icmpv4Type),
    V6(Icmpv6Type),
}

impl MessageType {
    pub fn family(&self) -> Family {
        match self {
            MessageType::V4(_) => Family::V4,
            MessageType::V6(_) => Family::V6,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            MessageType::V4(t) => t.0,
            MessageType::V6(t) => t.0,
        }
    }

    /// The echo request type for a family.
    pub fn echo_request(family: Family) -> Self {
        match family {
            Family::V4 => MessageType::V4(Icmpv4Type::ECHO_REQUEST),
            Family::V6 => MessageType::V6(Icmpv6Type::ECHO_REQUEST),
        }
    }

    /// The echo reply type for a family.
    pub fn echo_reply(family: Family) -> Self {
        match family {
            Family::V4 => MessageType::V4(Icmpv4Type::ECHO_REPLY),
            Family::V6 => MessageType::V6(Icmpv6Type::ECHO_REPLY),
        }
    }

    fn is_echo(&self) -> bool {
        matches!(
            *self,
            MessageType::V4(Icmpv4Type::ECHO_REQUEST)
                | MessageType::V4(Icmpv4Type::ECHO_REPLY)
                | MessageType::V6(Icmpv6Type::ECHO_REQUEST)
                | MessageType::V6(Icmpv6Type::ECHO_REPLY)
        )
    }
}
