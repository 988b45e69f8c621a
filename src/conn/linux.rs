//! Raw ICMP sockets on Linux.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::unix::AsyncFd;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::filter::{Ipv4Filter, Ipv6Filter};
use crate::icmp::Family;

// <linux/icmp.h> and <linux/icmpv6.h>
const SOL_RAW: libc::c_int = 255;
const ICMP_FILTER: libc::c_int = 1;
const ICMPV6_FILTER: libc::c_int = 1;

/// A raw ICMP socket registered with the Tokio reactor.
pub(crate) struct RawConn {
    fd: Mutex<Option<Arc<AsyncFd<Socket>>>>,
    closed: CancellationToken,
}

impl RawConn {
    /// Opens a non-blocking raw socket. Must be called within a Tokio
    /// runtime.
    pub(crate) fn open(family: Family) -> Result<Self> {
        let (domain, protocol) = match family {
            Family::V4 => (Domain::IPV4, Protocol::ICMPV4),
            Family::V6 => (Domain::IPV6, Protocol::ICMPV6),
        };

        tokio::runtime::Handle::try_current().map_err(io::Error::other)?;

        let socket = Socket::new(domain, Type::RAW, Some(protocol))?;
        socket.set_nonblocking(true)?;

        Ok(Self {
            fd: Mutex::new(Some(Arc::new(AsyncFd::new(socket)?))),
            closed: CancellationToken::new(),
        })
    }

    fn socket(&self) -> Result<Arc<AsyncFd<Socket>>> {
        self.fd
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::Closed)
    }

    fn setsockopt<T>(&self, level: libc::c_int, name: libc::c_int, value: &T) -> Result<()> {
        let fd = self.socket()?;
        setsockopt(fd.get_ref().as_raw_fd(), level, name, value)?;
        Ok(())
    }

    /// Restricts the socket to one interface (SO_BINDTOIFINDEX).
    pub(crate) fn bind_to_ifindex(&self, index: u32) -> Result<()> {
        let index = index as libc::c_int;
        self.setsockopt(libc::SOL_SOCKET, libc::SO_BINDTOIFINDEX, &index)
    }

    pub(crate) fn set_icmp_filter(&self, f: &Ipv4Filter) -> Result<()> {
        // struct icmp_filter is a single 32-bit word.
        self.setsockopt(SOL_RAW, ICMP_FILTER, &f.raw())
    }

    pub(crate) fn set_icmpv6_filter(&self, f: &Ipv6Filter) -> Result<()> {
        self.setsockopt(libc::IPPROTO_ICMPV6, ICMPV6_FILTER, f.raw())
    }

    pub(crate) fn set_tos(&self, tos: u8) -> Result<()> {
        self.socket()?.get_ref().set_tos(tos.into())?;
        Ok(())
    }

    pub(crate) fn set_traffic_class(&self, tc: u8) -> Result<()> {
        self.socket()?.get_ref().set_tclass_v6(tc.into())?;
        Ok(())
    }

    pub(crate) fn bind(&self, sa: &SockAddr) -> Result<()> {
        self.socket()?.get_ref().bind(sa)?;
        Ok(())
    }

    pub(crate) async fn send_to(
        &self,
        cancel: &CancellationToken,
        buf: &[u8],
        sa: &SockAddr,
    ) -> Result<()> {
        let fd = self.socket()?;
        loop {
            let mut guard = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = self.closed.cancelled() => return Err(Error::Closed),
                ready = fd.writable() => ready?,
            };

            match guard.try_io(|inner| inner.get_ref().send_to(buf, sa)) {
                Ok(result) => {
                    result?;
                    return Ok(());
                }
                Err(_would_block) => continue,
            }
        }
    }

    pub(crate) async fn recv_from(
        &self,
        cancel: &CancellationToken,
        buf: &mut [u8],
    ) -> Result<(usize, SockAddr)> {
        let fd = self.socket()?;
        loop {
            let mut guard = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = self.closed.cancelled() => return Err(Error::Closed),
                ready = fd.readable() => ready?,
            };

            match guard.try_io(|inner| inner.get_ref().recv_from(as_uninit(&mut *buf))) {
                Ok(result) => return Ok(result?),
                Err(_would_block) => continue,
            }
        }
    }

    /// Releases the socket. In-flight operations fail with `Error::Closed`.
    pub(crate) fn close(&self) -> Result<()> {
        self.closed.cancel();
        let _ = self.fd.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}

fn setsockopt<T>(fd: RawFd, level: libc::c_int, name: libc::c_int, value: &T) -> io::Result<()> {
    // SAFETY: value points to a live T and the length passed is its size.
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            value as *const T as *const libc::c_void,
            std::mem::size_of::<T>() as libc::socklen_t,
        )
    };
    if ret == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

fn as_uninit(buf: &mut [u8]) -> &mut [MaybeUninit<u8>] {
    // SAFETY: MaybeUninit<u8> has the layout of u8, and recvfrom only ever
    // writes initialized bytes into the slice.
    unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(family: Family) -> Option<RawConn> {
        match RawConn::open(family) {
            Ok(conn) => Some(conn),
            // IPv6 may be disabled on the host.
            Err(Error::Io(e))
                if e.kind() == io::ErrorKind::PermissionDenied
                    || e.raw_os_error() == Some(libc::EAFNOSUPPORT) =>
            {
                println!("skipping, raw sockets unavailable: {}", e);
                None
            }
            Err(e) => panic!("failed to open raw socket: {}", e),
        }
    }

    #[tokio::test]
    async fn test_set_tos() {
        let Some(conn) = open(Family::V4) else { return };
        conn.set_tos(0x10).unwrap();
        assert_eq!(conn.socket().unwrap().get_ref().tos().unwrap(), 0x10);

        conn.close().unwrap();
        assert!(matches!(conn.set_tos(0x10), Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_set_traffic_class() {
        let Some(conn) = open(Family::V6) else { return };
        conn.set_traffic_class(0x20).unwrap();
        assert_eq!(conn.socket().unwrap().get_ref().tclass_v6().unwrap(), 0x20);
    }

    #[test]
    fn test_open_requires_runtime() {
        assert!(matches!(RawConn::open(Family::V4), Err(Error::Io(_))));
    }
}
