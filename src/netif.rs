//! Network interface and address lookup.

#[cfg(target_os = "linux")]
mod netlink;

use std::net::IpAddr;

use crate::error::{Error, Result};
use crate::icmp::Family;

const IFF_UP: u32 = 0x1;
const IFF_LOOPBACK: u32 = 0x8;

/// Kernel flag for an address used to generate temporary (privacy)
/// addresses.
pub const IFA_F_MANAGETEMPADDR: u32 = 0x100;

/// A network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub index: u32,
    pub name: String,
    pub mtu: u32,
    /// Raw `IFF_*` flags.
    pub flags: u32,
}

impl Interface {
    pub fn by_name(name: &str) -> Result<Self> {
        list()?
            .into_iter()
            .find(|ifi| ifi.name == name)
            .ok_or_else(|| not_found(format!("no interface named {:?}", name)))
    }

    pub fn by_index(index: u32) -> Result<Self> {
        list()?
            .into_iter()
            .find(|ifi| ifi.index == index)
            .ok_or_else(|| not_found(format!("no interface with index {}", index)))
    }

    /// Looks up an interface by name, or by index when the input is numeric.
    pub fn find(spec: &str) -> Result<Self> {
        match spec.parse::<u32>() {
            Ok(index) => Self::by_index(index),
            Err(_) => Self::by_name(spec),
        }
    }

    /// The first loopback interface that is up.
    pub fn loopback() -> Result<Self> {
        list()?
            .into_iter()
            .find(|ifi| ifi.is_loopback() && ifi.is_up())
            .ok_or_else(|| not_found("no loopback interface".to_string()))
    }

    pub fn is_up(&self) -> bool {
        self.flags & IFF_UP != 0
    }

    pub fn is_loopback(&self) -> bool {
        self.flags & IFF_LOOPBACK != 0
    }
}

fn not_found(msg: String) -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, msg))
}

/// An address configured on an interface, as reported by the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressMessage {
    pub family: Family,
    pub index: u32,
    pub prefix_len: u8,
    pub scope: u8,
    /// `IFA_F_*` flags, including the extended ones.
    pub flags: u32,
    pub address: Option<IpAddr>,
    /// The local address on point-to-point links, where `address` is the
    /// peer.
    pub local: Option<IpAddr>,
}

impl AddressMessage {
    /// The address a socket would bind to.
    pub fn bind_candidate(&self) -> Option<IpAddr> {
        self.local.or(self.address)
    }
}

/// Lists all network interfaces.
#[cfg(target_os = "linux")]
pub fn list() -> Result<Vec<Interface>> {
    netlink::links()
}

/// Lists the addresses configured on `ifi`.
#[cfg(target_os = "linux")]
pub fn addresses(ifi: &Interface) -> Result<Vec<AddressMessage>> {
    let msgs = netlink::addresses(ifi.index)?;
    Ok(msgs.into_iter().filter(|m| m.index == ifi.index).collect())
}

#[cfg(not(target_os = "linux"))]
pub fn list() -> Result<Vec<Interface>> {
    Err(Error::Unimplemented(std::env::consts::OS))
}

#[cfg(not(target_os = "linux"))]
pub fn addresses(_ifi: &Interface) -> Result<Vec<AddressMessage>> {
    Err(Error::Unimplemented(std::env::consts::OS))
}
