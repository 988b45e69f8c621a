//! ICMPv4 and ICMPv6 transports bound to a single network interface.

#[cfg(target_os = "linux")]
#[path = "conn/linux.rs"]
mod sys;

#[cfg(not(target_os = "linux"))]
#[path = "conn/unsupported.rs"]
mod sys;

use async_trait::async_trait;
use log::debug;
use std::net::IpAddr;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::addr::{ZonedAddr, from_sockaddr, from_sockaddr_v6, to_sockaddr};
use crate::bind::bind_sockaddr;
use crate::error::{Error, Result};
use crate::filter::{Ipv4Filter, Ipv6Filter};
use crate::icmp::{Family, Message, ipv4_header_len};
use crate::netif::Interface;

use sys::RawConn;

// Interfaces reporting no MTU still get a buffer that fits a minimum-MTU
// IPv6 packet.
const MIN_BUFFER_LEN: usize = 1280;

/// Reads and writes ICMP messages of one address family.
#[async_trait]
pub trait Conn: Send + Sync {
    /// Reads one ICMP message and returns it with the sender's address.
    async fn read_from(&self, cancel: &CancellationToken) -> Result<(Message, ZonedAddr)>;

    /// Writes an ICMP message to a destination address.
    async fn write_to(&self, cancel: &CancellationToken, msg: &Message, dst: IpAddr)
    -> Result<()>;

    /// Closes the underlying socket. Closing twice is not an error.
    fn close(&self) -> Result<()>;
}

/// Configures an [`Ipv4Conn`].
#[derive(Debug, Clone, Default)]
pub struct Ipv4Config {
    /// Installed before bind, so no datagram that fails the filter is ever
    /// queued on the socket. `None` applies no filter.
    pub filter: Option<Ipv4Filter>,
}

/// Configures an [`Ipv6Conn`].
#[derive(Debug, Clone, Default)]
pub struct Ipv6Config {
    /// Installed before bind, so no datagram that fails the filter is ever
    /// queued on the socket. `None` applies no filter.
    pub filter: Option<Ipv6Filter>,
}

/// A socket which can be released when its setup fails.
trait Release {
    fn release(&self) -> Result<()>;
}

impl Release for RawConn {
    fn release(&self) -> Result<()> {
        self.close()
    }
}

/// Runs the socket setup steps that follow `open`, closing the socket if any
/// of them fails.
fn configure<C: Release>(conn: C, setup: impl FnOnce(&C) -> Result<()>) -> Result<C> {
    if let Err(e) = setup(&conn) {
        let _ = conn.release();
        return Err(e);
    }

    Ok(conn)
}

fn buffer(ifi: &Interface) -> Mutex<Vec<u8>> {
    Mutex::new(vec![0; (ifi.mtu as usize).max(MIN_BUFFER_LEN)])
}

async fn lock_buffer<'a>(
    buf: &'a Mutex<Vec<u8>>,
    cancel: &CancellationToken,
) -> Result<MutexGuard<'a, Vec<u8>>> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        guard = buf.lock() => Ok(guard),
    }
}

/// Reads and writes ICMPv4 messages on one network interface.
pub struct Ipv4Conn {
    ip: IpAddr,
    ifi: Interface,
    conn: RawConn,
    buf: Mutex<Vec<u8>>,
}

impl Ipv4Conn {
    /// Binds an ICMPv4 socket on `ifi`. Must be called within a Tokio
    /// runtime.
    ///
    /// The bind address comes from a netlink dump that blocks the calling
    /// thread. Call from `spawn_blocking` where stalling a runtime worker
    /// matters.
    pub fn listen(ifi: &Interface, cfg: Ipv4Config) -> Result<Self> {
        let (sa, ip) = bind_sockaddr(Family::V4, ifi)?;

        let conn = configure(RawConn::open(Family::V4)?, |conn| {
            conn.bind_to_ifindex(ifi.index)?;
            if let Some(filter) = &cfg.filter {
                conn.set_icmp_filter(filter)?;
            }
            conn.bind(&sa)
        })?;

        debug!("ICMPv4 socket bound to {} on {}", ip, ifi.name);

        Ok(Self {
            ip,
            ifi: ifi.clone(),
            conn,
            buf: buffer(ifi),
        })
    }

    /// The bind address chosen for this connection.
    pub fn local_addr(&self) -> IpAddr {
        self.ip
    }

    pub fn interface(&self) -> &Interface {
        &self.ifi
    }

    /// Sets the IPv4 Type of Service byte on outgoing messages.
    pub fn set_tos(&self, tos: u8) -> Result<()> {
        self.conn.set_tos(tos)
    }
}

#[async_trait]
impl Conn for Ipv4Conn {
    async fn read_from(&self, cancel: &CancellationToken) -> Result<(Message, ZonedAddr)> {
        let mut buf = lock_buffer(&self.buf, cancel).await?;
        let (n, sa) = self.conn.recv_from(cancel, &mut buf).await?;

        // Raw ICMPv4 sockets hand back the whole IPv4 packet.
        let h = ipv4_header_len(&buf[..n])?;
        let msg = Message::parse(Family::V4, &buf[h..n])?;
        let src = from_sockaddr(&sa)?;

        debug!("received {} byte ICMPv4 message from {}", n - h, src);
        Ok((msg, src))
    }

    async fn write_to(
        &self,
        cancel: &CancellationToken,
        msg: &Message,
        dst: IpAddr,
    ) -> Result<()> {
        if !dst.is_ipv4() {
            return Err(Error::FamilyMismatch {
                expected: Family::V4,
                addr: dst,
            });
        }

        let b = msg.marshal();
        debug!("sending {} byte ICMPv4 message to {}", b.len(), dst);

        // IPv4 destinations never carry a zone.
        self.conn.send_to(cancel, &b, &to_sockaddr(dst, 0)).await
    }

    fn close(&self) -> Result<()> {
        self.conn.close()
    }
}

/// Reads and writes ICMPv6 messages on one network interface.
pub struct Ipv6Conn {
    ip: IpAddr,
    ifi: Interface,
    conn: RawConn,
    buf: Mutex<Vec<u8>>,
}

impl Ipv6Conn {
    /// Binds an ICMPv6 socket on `ifi`. Must be called within a Tokio
    /// runtime.
    ///
    /// Blocks on a netlink dump like [`Ipv4Conn::listen`].
    pub fn listen(ifi: &Interface, cfg: Ipv6Config) -> Result<Self> {
        let (sa, ip) = bind_sockaddr(Family::V6, ifi)?;

        let conn = configure(RawConn::open(Family::V6)?, |conn| {
            conn.bind_to_ifindex(ifi.index)?;
            if let Some(filter) = &cfg.filter {
                conn.set_icmpv6_filter(filter)?;
            }
            conn.bind(&sa)
        })?;

        debug!("ICMPv6 socket bound to {} on {}", ip, ifi.name);

        Ok(Self {
            ip,
            ifi: ifi.clone(),
            conn,
            buf: buffer(ifi),
        })
    }

    /// The bind address chosen for this connection.
    pub fn local_addr(&self) -> IpAddr {
        self.ip
    }

    pub fn interface(&self) -> &Interface {
        &self.ifi
    }

    /// Sets the IPv6 Traffic Class byte on outgoing messages.
    pub fn set_traffic_class(&self, tc: u8) -> Result<()> {
        self.conn.set_traffic_class(tc)
    }
}

#[async_trait]
impl Conn for Ipv6Conn {
    async fn read_from(&self, cancel: &CancellationToken) -> Result<(Message, ZonedAddr)> {
        let mut buf = lock_buffer(&self.buf, cancel).await?;
        let (n, sa) = self.conn.recv_from(cancel, &mut buf).await?;

        let msg = Message::parse(Family::V6, &buf[..n])?;
        let src = from_sockaddr_v6(&sa, &self.ifi)?;

        debug!("received {} byte ICMPv6 message from {}", n, src);
        Ok((msg, src))
    }

    async fn write_to(
        &self,
        cancel: &CancellationToken,
        msg: &Message,
        dst: IpAddr,
    ) -> Result<()> {
        if !dst.is_ipv6() {
            return Err(Error::FamilyMismatch {
                expected: Family::V6,
                addr: dst,
            });
        }

        let b = msg.marshal();
        debug!("sending {} byte ICMPv6 message to {}", b.len(), dst);

        // Link-local destinations route through this interface.
        self.conn
            .send_to(cancel, &b, &to_sockaddr(dst, self.ifi.index))
            .await
    }

    fn close(&self) -> Result<()> {
        self.conn.close()
    }
}
