//! rtnetlink dumps of links and addresses.

use log::debug;
use netlink_packet_core::{
    NLM_F_DUMP, NLM_F_REQUEST, NetlinkBuffer, NetlinkHeader, NetlinkMessage, NetlinkPayload,
};
use netlink_packet_route::address::nlas::Nla as AddressNla;
use netlink_packet_route::link::nlas::Nla as LinkNla;
use netlink_packet_route::{AF_INET, AF_INET6, LinkMessage, RtnlMessage};
use netlink_sys::{Socket, SocketAddr, protocols::NETLINK_ROUTE};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::{AddressMessage, Interface};
use crate::error::{Error, Result};
use crate::icmp::Family;

const SEQ: u32 = 1;
const RECV_BUF_LEN: usize = 64 * 1024;
const NLMSG_HDRLEN: usize = 16;

pub(super) fn links() -> Result<Vec<Interface>> {
    let msgs = dump(RtnlMessage::GetLink(LinkMessage::default()))?;
    Ok(msgs
        .into_iter()
        .filter_map(|m| match m {
            RtnlMessage::NewLink(link) => Some(interface(link)),
            _ => None,
        })
        .collect())
}

pub(super) fn addresses(index: u32) -> Result<Vec<AddressMessage>> {
    // Any family, filtered to one interface index where the kernel supports
    // it.
    let mut req = netlink_packet_route::AddressMessage::default();
    req.header.index = index;

    let msgs = dump(RtnlMessage::GetAddress(req))?;
    Ok(msgs
        .into_iter()
        .filter_map(|m| match m {
            RtnlMessage::NewAddress(addr) => address(addr),
            _ => None,
        })
        .collect())
}

/// Sends a dump request and collects every message of the reply. Blocks the
/// calling thread until the kernel finishes the dump.
fn dump(req: RtnlMessage) -> Result<Vec<RtnlMessage>> {
    let mut socket = Socket::new(NETLINK_ROUTE)?;
    socket.bind_auto()?;
    socket.connect(&SocketAddr::new(0, 0))?;

    let mut packet = NetlinkMessage::new(NetlinkHeader::default(), NetlinkPayload::from(req));
    packet.header.flags = NLM_F_REQUEST | NLM_F_DUMP;
    packet.header.sequence_number = SEQ;
    packet.finalize();

    let mut buf = vec![0; packet.buffer_len()];
    packet.serialize(&mut buf[..]);
    socket.send(&buf[..], 0)?;

    let mut buf = vec![0; RECV_BUF_LEN];
    let mut out = Vec::new();
    loop {
        let n = socket.recv(&mut &mut buf[..], 0)?;
        if n == 0 {
            return Err(Error::parse("netlink socket closed mid-dump"));
        }

        if collect(&buf[..n.min(RECV_BUF_LEN)], &mut out)? {
            return Ok(out);
        }
    }
}

/// Collects the route messages in one datagram of a dump. Returns true once
/// the dump is complete.
fn collect(mut buf: &[u8], out: &mut Vec<RtnlMessage>) -> Result<bool> {
    while !buf.is_empty() {
        let len = NetlinkBuffer::new_checked(buf)
            .map_err(|e| Error::parse(e.to_string()))?
            .length() as usize;
        if len < NLMSG_HDRLEN {
            return Err(Error::parse(format!("truncated netlink message of {} bytes", len)));
        }

        match NetlinkMessage::<RtnlMessage>::deserialize(&buf[..len]) {
            Ok(msg) => match msg.payload {
                NetlinkPayload::Done(_) => return Ok(true),
                NetlinkPayload::Error(e) if e.code.is_some() => return Err(Error::Io(e.to_io())),
                NetlinkPayload::InnerMessage(m) => out.push(m),
                _ => {}
            },
            // Newer kernels may send attributes this decoder rejects.
            Err(e) => debug!("skipping undecodable netlink message: {}", e),
        }

        buf = &buf[len..];
    }

    Ok(false)
}

fn interface(link: LinkMessage) -> Interface {
    let mut ifi = Interface {
        index: link.header.index,
        name: String::new(),
        mtu: 0,
        flags: link.header.flags,
    };

    for nla in link.nlas {
        match nla {
            LinkNla::IfName(name) => ifi.name = name,
            LinkNla::Mtu(mtu) => ifi.mtu = mtu,
            _ => {}
        }
    }

    ifi
}

fn parse_ip(data: &[u8]) -> Option<IpAddr> {
    match data.len() {
        4 => {
            let b: [u8; 4] = data.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(b)))
        }
        16 => {
            let b: [u8; 16] = data.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(b)))
        }
        _ => None,
    }
}

fn address(m: netlink_packet_route::AddressMessage) -> Option<AddressMessage> {
    let family = match u16::from(m.header.family) {
        AF_INET => Family::V4,
        AF_INET6 => Family::V6,
        _ => return None,
    };

    let mut msg = AddressMessage {
        family,
        index: m.header.index,
        prefix_len: m.header.prefix_len,
        scope: m.header.scope,
        flags: u32::from(m.header.flags),
        address: None,
        local: None,
    };

    for nla in m.nlas {
        match nla {
            AddressNla::Address(data) => msg.address = parse_ip(&data),
            AddressNla::Local(data) => msg.local = parse_ip(&data),
            // Supersedes the 8-bit ifa_flags field.
            AddressNla::Flags(flags) => msg.flags = flags,
            _ => {}
        }
    }

    Some(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netif::IFA_F_MANAGETEMPADDR;
    use netlink_packet_core::{DoneMessage, ErrorMessage};
    use std::io;
    use std::num::NonZeroI32;

    fn datagram(payloads: Vec<NetlinkPayload<RtnlMessage>>) -> Vec<u8> {
        let mut out = Vec::new();
        for payload in payloads {
            let mut m = NetlinkMessage::new(NetlinkHeader::default(), payload);
            m.header.sequence_number = SEQ;
            m.finalize();

            let mut b = vec![0; m.buffer_len()];
            m.serialize(&mut b[..]);
            out.extend(b);
        }
        out
    }

    fn ifaddr(family: u16, index: u32, nlas: Vec<AddressNla>) -> netlink_packet_route::AddressMessage {
        let mut m = netlink_packet_route::AddressMessage::default();
        m.header.family = family as u8;
        m.header.prefix_len = 64;
        m.header.index = index;
        m.nlas = nlas;
        m
    }

    #[test]
    fn test_ipv6_address_with_extended_flags() {
        let ip: Ipv6Addr = "2001:db8::1".parse().unwrap();
        let m = ifaddr(
            AF_INET6,
            2,
            vec![
                AddressNla::Address(ip.octets().to_vec()),
                AddressNla::Flags(IFA_F_MANAGETEMPADDR),
            ],
        );

        let got = address(m).unwrap();
        assert_eq!(got.family, Family::V6);
        assert_eq!(got.index, 2);
        assert_eq!(got.prefix_len, 64);
        assert_eq!(got.address, Some(IpAddr::V6(ip)));
        assert_eq!(got.local, None);
        assert_eq!(got.flags, IFA_F_MANAGETEMPADDR);
    }

    #[test]
    fn test_point_to_point_address_keeps_local() {
        let m = ifaddr(
            AF_INET,
            3,
            vec![
                AddressNla::Address(vec![192, 0, 2, 2]),
                AddressNla::Local(vec![192, 0, 2, 1]),
            ],
        );

        let got = address(m).unwrap();
        assert_eq!(got.family, Family::V4);
        assert_eq!(got.bind_candidate(), Some("192.0.2.1".parse().unwrap()));
    }

    #[test]
    fn test_address_skips_other_families() {
        let m = ifaddr(netlink_packet_route::AF_PACKET, 1, Vec::new());
        assert_eq!(address(m), None);
    }

    #[test]
    fn test_interface_from_link() {
        let mut link = LinkMessage::default();
        link.header.index = 1;
        link.header.flags = 0x49;
        link.nlas = vec![LinkNla::IfName("lo".to_string()), LinkNla::Mtu(65536)];

        let ifi = interface(link);
        assert_eq!(ifi.index, 1);
        assert_eq!(ifi.name, "lo");
        assert_eq!(ifi.mtu, 65536);
        assert!(ifi.is_loopback());
        assert!(ifi.is_up());
    }

    #[test]
    fn test_collect_dump() {
        let buf = datagram(vec![
            RtnlMessage::NewAddress(ifaddr(AF_INET, 1, Vec::new())).into(),
            RtnlMessage::NewLink(LinkMessage::default()).into(),
        ]);

        let mut out = Vec::new();
        assert!(!collect(&buf, &mut out).unwrap());
        assert_eq!(out.len(), 2);

        let done = datagram(vec![NetlinkPayload::Done(DoneMessage::default())]);
        assert!(collect(&done, &mut out).unwrap());
    }

    #[test]
    fn test_collect_dump_error() {
        let mut nack = ErrorMessage::default();
        nack.code = NonZeroI32::new(-libc::EPERM);
        let err = datagram(vec![NetlinkPayload::Error(nack)]);

        match collect(&err, &mut Vec::new()) {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_collect_rejects_truncated_datagram() {
        let mut buf = datagram(vec![RtnlMessage::NewLink(LinkMessage::default()).into()]);
        buf.truncate(buf.len() - 4);
        assert!(matches!(collect(&buf, &mut Vec::new()), Err(Error::Parse(_))));
    }
}
