//! Conversions between IP addresses with optional IPv6 zones and OS socket
//! addresses.

use socket2::SockAddr;
use std::net::{IpAddr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::netif::Interface;

/// An IP address with an optional IPv6 zone, such as `fe80::1%eth0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ZonedAddr {
    ip: IpAddr,
    zone: Option<String>,
}

impl ZonedAddr {
    pub fn new(ip: IpAddr) -> Self {
        Self { ip, zone: None }
    }

    /// Attaches a zone. An empty zone means "no zone", and IPv4 addresses
    /// never carry one.
    pub fn with_zone(self, zone: impl Into<String>) -> Self {
        let zone = zone.into();
        let zone = (self.ip.is_ipv6() && !zone.is_empty()).then_some(zone);
        Self { zone, ..self }
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn zone(&self) -> Option<&str> {
        self.zone.as_deref()
    }
}

impl From<IpAddr> for ZonedAddr {
    fn from(ip: IpAddr) -> Self {
        Self::new(ip)
    }
}

impl PartialEq<IpAddr> for ZonedAddr {
    fn eq(&self, other: &IpAddr) -> bool {
        self.zone.is_none() && self.ip == *other
    }
}

impl std::fmt::Display for ZonedAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.zone {
            Some(zone) => write!(f, "{}%{}", self.ip, zone),
            None => write!(f, "{}", self.ip),
        }
    }
}

impl FromStr for ZonedAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (ip, zone) = match s.split_once('%') {
            Some((ip, zone)) => (ip, Some(zone)),
            None => (s, None),
        };

        let ip: IpAddr = ip
            .parse()
            .map_err(|e| Error::parse(format!("invalid IP address {:?}: {}", s, e)))?;

        match zone {
            Some(zone) if ip.is_ipv4() => Err(Error::parse(format!(
                "IPv4 address {} cannot have zone {:?}",
                ip, zone
            ))),
            Some(zone) => Ok(Self::new(ip).with_zone(zone)),
            None => Ok(Self::new(ip)),
        }
    }
}

fn is_link_local_unicast(ip: &Ipv6Addr) -> bool {
    // fe80::/10
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

fn is_link_local_multicast(ip: &Ipv6Addr) -> bool {
    // ff02::/16
    ip.segments()[0] == 0xff02
}

/// Builds the OS socket address for `ip`. The zone is only attached to IPv6
/// link-local unicast and multicast addresses.
pub fn to_sockaddr(ip: IpAddr, zone: u32) -> SockAddr {
    let sa = match ip {
        IpAddr::V4(ip) => SocketAddr::V4(SocketAddrV4::new(ip, 0)),
        IpAddr::V6(ip) => {
            let scope_id = if is_link_local_unicast(&ip) || is_link_local_multicast(&ip) {
                zone
            } else {
                0
            };
            SocketAddr::V6(SocketAddrV6::new(ip, 0, 0, scope_id))
        }
    };

    SockAddr::from(sa)
}

/// Converts an OS socket address back into an address, carrying a nonzero
/// IPv6 scope ID as a numeric zone.
pub fn from_sockaddr(sa: &SockAddr) -> Result<ZonedAddr> {
    match sa.as_socket() {
        Some(SocketAddr::V4(sa)) => Ok(ZonedAddr::new(IpAddr::V4(*sa.ip()))),
        Some(SocketAddr::V6(sa)) => {
            let addr = ZonedAddr::new(IpAddr::V6(*sa.ip()));
            if sa.scope_id() > 0 {
                Ok(addr.with_zone(sa.scope_id().to_string()))
            } else {
                Ok(addr)
            }
        }
        None => Err(Error::parse(format!(
            "unsupported socket address family {}",
            sa.family()
        ))),
    }
}

/// Like [`from_sockaddr`], but for IPv6-only sockets. A zone naming the local
/// interface's index is rewritten to the interface name; any other zone is
/// rejected.
pub fn from_sockaddr_v6(sa: &SockAddr, ifi: &Interface) -> Result<ZonedAddr> {
    let addr = from_sockaddr(sa)?;
    if addr.ip().is_ipv4() {
        return Err(Error::parse(format!(
            "found IPv4 address {} in IPv6-only context",
            addr
        )));
    }

    match addr.zone() {
        None => Ok(addr),
        Some(z) if z == ifi.index.to_string() => {
            let name = ifi.name.clone();
            Ok(addr.with_zone(name))
        }
        Some(z) => Err(Error::UnknownZone(z.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ifi() -> Interface {
        Interface {
            index: 1,
            name: "lo".to_string(),
            mtu: 65536,
            flags: 0,
        }
    }

    #[test]
    fn test_to_sockaddr() {
        let sa = to_sockaddr("192.0.2.0".parse().unwrap(), 1);
        assert_eq!(sa.as_socket(), Some("192.0.2.0:0".parse().unwrap()));

        let sa = to_sockaddr("fe80::1".parse().unwrap(), 1);
        let v6 = sa.as_socket_ipv6().unwrap();
        assert_eq!(v6.ip(), &"fe80::1".parse::<Ipv6Addr>().unwrap());
        assert_eq!(v6.scope_id(), 1);

        let sa = to_sockaddr("ff02::1".parse().unwrap(), 3);
        assert_eq!(sa.as_socket_ipv6().unwrap().scope_id(), 3);

        // Global addresses never carry a zone.
        let sa = to_sockaddr("2001:db8::1".parse().unwrap(), 1);
        assert_eq!(sa.as_socket_ipv6().unwrap().scope_id(), 0);
    }

    #[test]
    fn test_from_sockaddr() {
        for ip in ["192.0.2.0", "2001:db8::1", "::1"] {
            let ip: IpAddr = ip.parse().unwrap();
            let got = from_sockaddr(&to_sockaddr(ip, 0)).unwrap();
            assert_eq!(got, ip);
        }

        let got = from_sockaddr(&to_sockaddr("fe80::1".parse().unwrap(), 1)).unwrap();
        assert_eq!(got, "fe80::1%1".parse::<ZonedAddr>().unwrap());
        assert_eq!(got.zone(), Some("1"));
    }

    #[test]
    fn test_from_sockaddr_v6_zone_rewrite() {
        let ifi = ifi();

        let sa = to_sockaddr("fe80::1".parse().unwrap(), 1);
        let got = from_sockaddr_v6(&sa, &ifi).unwrap();
        assert_eq!(got.to_string(), "fe80::1%lo");

        let sa = to_sockaddr("2001:db8::1".parse().unwrap(), 1);
        assert_eq!(from_sockaddr_v6(&sa, &ifi).unwrap().zone(), None);

        let sa = to_sockaddr("fe80::1".parse().unwrap(), 7);
        assert!(matches!(
            from_sockaddr_v6(&sa, &ifi),
            Err(Error::UnknownZone(z)) if z == "7"
        ));

        let sa = to_sockaddr("192.0.2.1".parse().unwrap(), 0);
        assert!(from_sockaddr_v6(&sa, &ifi).is_err());
    }

    #[test]
    fn test_zoned_addr_parse() {
        let addr: ZonedAddr = "fe80::1%eth0".parse().unwrap();
        assert_eq!(addr.ip(), "fe80::1".parse::<IpAddr>().unwrap());
        assert_eq!(addr.zone(), Some("eth0"));

        let addr: ZonedAddr = "fe80::1%".parse().unwrap();
        assert_eq!(addr.zone(), None);

        assert!("192.0.2.1%eth0".parse::<ZonedAddr>().is_err());
        assert!("not-an-ip".parse::<ZonedAddr>().is_err());
    }
}
