//! Stand-ins for platforms without raw ICMP socket support. Every operation
//! fails with `Error::Unimplemented`.

use socket2::SockAddr;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::filter::{Ipv4Filter, Ipv6Filter};
use crate::icmp::Family;

fn unimplemented() -> Error {
    Error::Unimplemented(std::env::consts::OS)
}

pub(crate) struct RawConn;

impl RawConn {
    pub(crate) fn open(_family: Family) -> Result<Self> {
        Err(unimplemented())
    }

    pub(crate) fn bind_to_ifindex(&self, _index: u32) -> Result<()> {
        Err(unimplemented())
    }

    pub(crate) fn set_icmp_filter(&self, _f: &Ipv4Filter) -> Result<()> {
        Err(unimplemented())
    }

    pub(crate) fn set_icmpv6_filter(&self, _f: &Ipv6Filter) -> Result<()> {
        Err(unimplemented())
    }

    pub(crate) fn set_tos(&self, _tos: u8) -> Result<()> {
        Err(unimplemented())
    }

    pub(crate) fn set_traffic_class(&self, _tc: u8) -> Result<()> {
        Err(unimplemented())
    }

    pub(crate) fn bind(&self, _sa: &SockAddr) -> Result<()> {
        Err(unimplemented())
    }

    pub(crate) async fn send_to(
        &self,
        _cancel: &CancellationToken,
        _buf: &[u8],
        _sa: &SockAddr,
    ) -> Result<()> {
        Err(unimplemented())
    }

    pub(crate) async fn recv_from(
        &self,
        _cancel: &CancellationToken,
        _buf: &mut [u8],
    ) -> Result<(usize, SockAddr)> {
        Err(unimplemented())
    }

    pub(crate) fn close(&self) -> Result<()> {
        Err(unimplemented())
    }
}
