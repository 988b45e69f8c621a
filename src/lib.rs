//! Raw ICMPv4/ICMPv6 sockets bound to a single network interface, and an
//! echo client built on top of them.
//!
//! The [`Ipv4Conn`] and [`Ipv6Conn`] transports pick a source address on the
//! interface, install an optional kernel ICMP type filter and bind a raw
//! socket. The [`echo::Client`] multiplexes many concurrent pings over one
//! transport per address family.
//!
//! ```rust,no_run
//! use icmpx::{echo::Client, Interface};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> icmpx::Result<()> {
//!     let lo = Interface::loopback()?;
//!     let client = Client::new(&lo)?;
//!
//!     let res = client
//!         .ping(&CancellationToken::new(), "127.0.0.1".parse().unwrap())
//!         .await?;
//!     println!("{}: seq={} time={:?}", res.ip, res.ping.seq, res.duration);
//!
//!     client.close().await
//! }
//! ```

pub mod addr;
pub mod bind;
pub mod conn;
pub mod echo;
pub mod error;
pub mod filter;
pub mod icmp;
pub mod netif;

pub use addr::ZonedAddr;
pub use conn::{Conn, Ipv4Config, Ipv4Conn, Ipv6Config, Ipv6Conn};
pub use error::{Error, Result};
pub use filter::{Ipv4Filter, Ipv6Filter};
pub use icmp::{Body, Echo, Family, Icmpv4Type, Icmpv6Type, Message, MessageType};
pub use netif::{AddressMessage, Interface};
