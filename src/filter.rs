//! In-memory mirrors of the kernel's per-socket ICMP type filters.
//!
//! A set bit means "block this type". The layouts match Linux's
//! `struct icmp_filter` (one 32-bit word) and `struct icmp6_filter` (eight
//! 32-bit words) so they can be handed to `setsockopt` as-is.

use crate::icmp::{Icmpv4Type, Icmpv6Type};

/// An ICMPv4 filter which may be attached to an [`Ipv4Conn`](crate::Ipv4Conn).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ipv4Filter {
    data: u32,
}

impl Ipv4Filter {
    /// A filter which only permits the listed ICMPv4 types.
    pub fn allow_only(types: &[Icmpv4Type]) -> Self {
        let mut f = Self::default();
        f.set_all(true);

        for &t in types {
            f.accept(t);
        }

        f
    }

    pub fn accept(&mut self, typ: Icmpv4Type) {
        self.data &= !Self::bit(typ);
    }

    pub fn block(&mut self, typ: Icmpv4Type) {
        self.data |= Self::bit(typ);
    }

    /// Blocks or allows every ICMPv4 type.
    pub fn set_all(&mut self, block: bool) {
        self.data = if block { u32::MAX } else { 0 };
    }

    pub fn will_block(&self, typ: Icmpv4Type) -> bool {
        self.data & Self::bit(typ) != 0
    }

    /// The raw kernel bitmask.
    pub fn raw(&self) -> u32 {
        self.data
    }

    // Only one word exists, so types above 31 alias onto it like they do in
    // the kernel.
    fn bit(typ: Icmpv4Type) -> u32 {
        1 << (typ.0 as u32 & 31)
    }
}

/// An ICMPv6 filter which may be attached to an [`Ipv6Conn`](crate::Ipv6Conn).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ipv6Filter {
    data: [u32; 8],
}

impl Ipv6Filter {
    /// A filter which only permits the listed ICMPv6 types.
    pub fn allow_only(types: &[Icmpv6Type]) -> Self {
        let mut f = Self::default();
        f.set_all(true);

        for &t in types {
            f.accept(t);
        }

        f
    }

    pub fn accept(&mut self, typ: Icmpv6Type) {
        let (word, bit) = Self::index(typ);
        self.data[word] &= !bit;
    }

    pub fn block(&mut self, typ: Icmpv6Type) {
        let (word, bit) = Self::index(typ);
        self.data[word] |= bit;
    }

    /// Blocks or allows every ICMPv6 type.
    pub fn set_all(&mut self, block: bool) {
        self.data = [if block { u32::MAX } else { 0 }; 8];
    }

    pub fn will_block(&self, typ: Icmpv6Type) -> bool {
        let (word, bit) = Self::index(typ);
        self.data[word] & bit != 0
    }

    /// The raw kernel bitmask.
    pub fn raw(&self) -> &[u32; 8] {
        &self.data
    }

    fn index(typ: Icmpv6Type) -> (usize, u32) {
        ((typ.0 >> 5) as usize, 1 << (typ.0 as u32 & 31))
    }
}
