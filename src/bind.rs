//! Source address selection for a transport bound to one interface.

use socket2::SockAddr;
use std::net::{IpAddr, Ipv6Addr};

use crate::addr::to_sockaddr;
use crate::error::{Error, Result};
use crate::icmp::Family;
use crate::netif::{self, AddressMessage, IFA_F_MANAGETEMPADDR, Interface};

/// Chooses a bind address of `family` for `ifi` from the kernel's address
/// list.
pub fn bind_sockaddr(family: Family, ifi: &Interface) -> Result<(SockAddr, IpAddr)> {
    let msgs = netif::addresses(ifi)?;
    BindContext { family, ifi }.select(&msgs)
}

/// Shared state while selecting a socket bind address.
pub struct BindContext<'a> {
    pub family: Family,
    pub ifi: &'a Interface,
}

impl BindContext<'_> {
    pub fn select(&self, msgs: &[AddressMessage]) -> Result<(SockAddr, IpAddr)> {
        let selected = match self.family {
            Family::V4 => self.select_ipv4(msgs),
            Family::V6 => self.select_ipv6(msgs),
        };

        selected.ok_or_else(|| Error::NoBindAddress {
            family: self.family,
            interface: self.ifi.name.clone(),
        })
    }

    fn candidates<'m>(
        &'m self,
        msgs: &'m [AddressMessage],
    ) -> impl Iterator<Item = (&'m AddressMessage, IpAddr)> + 'm {
        msgs.iter()
            .filter(|m| m.family == self.family && m.index == self.ifi.index)
            .filter_map(|m| m.bind_candidate().map(|ip| (m, ip)))
            .filter(|(_, ip)| Family::of(ip) == self.family)
    }

    fn select_ipv4(&self, msgs: &[AddressMessage]) -> Option<(SockAddr, IpAddr)> {
        // One IPv4 address per interface is assumed to reach every scope we
        // need. IPv4 never carries a zone.
        let (_, ip) = self.candidates(msgs).next()?;
        Some((to_sockaddr(ip, 0), ip))
    }

    fn select_ipv6(&self, msgs: &[AddressMessage]) -> Option<(SockAddr, IpAddr)> {
        let mut bind: Option<IpAddr> = None;
        for (m, ip) in self.candidates(msgs) {
            if bind.is_none() {
                bind = Some(ip);
            }

            // A global, non-ULA address that backs temporary addresses is
            // likely stable and can reach any target on this link.
            if let IpAddr::V6(v6) = ip {
                if !is_unique_local(&v6)
                    && is_global_unicast(&v6)
                    && m.flags & IFA_F_MANAGETEMPADDR != 0
                {
                    bind = Some(ip);
                }
            }
        }

        let ip = bind?;
        Some((to_sockaddr(ip, self.ifi.index), ip))
    }
}

/// fc00::/7
fn is_unique_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xfe00) == 0xfc00
}

/// Any unicast address outside loopback and link-local scope. Unique local
/// addresses count as global unicast here.
fn is_global_unicast(ip: &Ipv6Addr) -> bool {
    !ip.is_unspecified()
        && !ip.is_loopback()
        && !ip.is_multicast()
        && (ip.segments()[0] & 0xffc0) != 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lo() -> Interface {
        Interface {
            index: 1,
            name: "lo".to_string(),
            mtu: 65536,
            flags: 0x49,
        }
    }

    fn msg(family: Family, ip: &str, flags: u32) -> AddressMessage {
        AddressMessage {
            family,
            index: 1,
            prefix_len: 0,
            scope: 0,
            flags,
            address: Some(ip.parse().unwrap()),
            local: None,
        }
    }

    #[test]
    fn test_select_ipv4() {
        let ifi = lo();
        let bc = BindContext {
            family: Family::V4,
            ifi: &ifi,
        };

        let (sa, ip) = bc
            .select(&[
                msg(Family::V6, "::1", 0),
                msg(Family::V4, "127.0.0.1", 0),
            ])
            .unwrap();
        assert_eq!(ip, "127.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(sa.as_socket(), Some("127.0.0.1:0".parse().unwrap()));
    }

    #[test]
    fn test_select_ipv6_localhost() {
        let ifi = lo();
        let bc = BindContext {
            family: Family::V6,
            ifi: &ifi,
        };

        let (sa, ip) = bc.select(&[msg(Family::V6, "::1", 0)]).unwrap();
        assert_eq!(ip, "::1".parse::<IpAddr>().unwrap());
        assert_eq!(sa.as_socket_ipv6().unwrap().scope_id(), 0);
    }

    #[test]
    fn test_select_ipv6_prefers_temporary_address_source() {
        let ifi = lo();
        let bc = BindContext {
            family: Family::V6,
            ifi: &ifi,
        };

        let (_, ip) = bc
            .select(&[
                msg(Family::V6, "::1", 0),
                msg(Family::V6, "2001:db8::1234", 0),
                msg(Family::V6, "2001:db8::1", IFA_F_MANAGETEMPADDR),
            ])
            .unwrap();
        assert_eq!(ip, "2001:db8::1".parse::<IpAddr>().unwrap());

        // ULAs are never preferred.
        let (_, ip) = bc
            .select(&[
                msg(Family::V6, "fe80::1", 0),
                msg(Family::V6, "fd00::1", IFA_F_MANAGETEMPADDR),
            ])
            .unwrap();
        assert_eq!(ip, "fe80::1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_select_link_local_carries_zone() {
        let ifi = lo();
        let bc = BindContext {
            family: Family::V6,
            ifi: &ifi,
        };

        let (sa, _) = bc.select(&[msg(Family::V6, "fe80::1", 0)]).unwrap();
        assert_eq!(sa.as_socket_ipv6().unwrap().scope_id(), 1);
    }

    #[test]
    fn test_select_no_address() {
        let ifi = lo();
        let bc = BindContext {
            family: Family::V4,
            ifi: &ifi,
        };

        let mut other = msg(Family::V4, "192.0.2.1", 0);
        other.index = 2;

        match bc.select(&[msg(Family::V6, "::1", 0), other]) {
            Err(Error::NoBindAddress { family, interface }) => {
                assert_eq!(family, Family::V4);
                assert_eq!(interface, "lo");
            }
            other => panic!("unexpected result: {:?}", other.map(|(_, ip)| ip)),
        }
    }

    #[test]
    fn test_bind_sockaddr_loopback() {
        let lo = match Interface::loopback() {
            Ok(lo) => lo,
            Err(e) if e.is_unimplemented() => return,
            Err(e) => panic!("failed to find loopback: {}", e),
        };

        let (_, ip) = bind_sockaddr(Family::V4, &lo).unwrap();
        assert_eq!(ip, "127.0.0.1".parse::<IpAddr>().unwrap());

        // IPv6 may be disabled in some sandboxes.
        if let Ok((_, ip)) = bind_sockaddr(Family::V6, &lo) {
            assert_eq!(ip, "::1".parse::<IpAddr>().unwrap());
        }
    }
}
