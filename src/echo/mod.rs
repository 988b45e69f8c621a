//! A dual-stack ICMP echo ("ping") client.

mod context;


use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::addr::ZonedAddr;
use crate::conn::{Conn, Ipv4Config, Ipv4Conn, Ipv6Config, Ipv6Conn};
use crate::error::Result;
use crate::filter::{Ipv4Filter, Ipv6Filter};
use crate::icmp::{Echo, Family, Icmpv4Type, Icmpv6Type};
use crate::netif::Interface;

use context::ConnContext;

/// Called with the request that went unanswered before it is resent.
pub type RetryHook = Arc<dyn Fn(&Echo) + Send + Sync>;

/// The result of a [`Client::ping`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Time elapsed from the first attempt until the reply arrived.
    pub duration: Duration,
    /// The echo request sent on the successful attempt.
    pub ping: Echo,
    /// The echo reply received from the target.
    pub pong: Echo,
    /// The address of the target host.
    pub ip: ZonedAddr,
}

/// Configures a [`Client`].
#[derive(Clone)]
pub struct ClientConfig {
    /// How long to wait for a reply before resending the request.
    pub retry_delay: Duration,
    /// Observes every retry.
    pub on_retry: Option<RetryHook>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(1),
            on_retry: None,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("retry_delay", &self.retry_delay)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

/// Sends ICMPv4/6 echo requests on one network interface.
///
/// Pings to different hosts may run concurrently. Concurrent pings to the
/// same host share one echo ID, so a reply may be handed to either caller.
pub struct Client {
    v4: ConnContext,
    v6: ConnContext,
}

impl Client {
    /// Binds a client on `ifi`. Must be called within a Tokio runtime.
    pub fn new(ifi: &Interface) -> Result<Self> {
        Self::with_config(ifi, ClientConfig::default())
    }

    /// Like [`Client::new`], with explicit configuration.
    pub fn with_config(ifi: &Interface, config: ClientConfig) -> Result<Self> {
        let c4 = Ipv4Conn::listen(
            ifi,
            Ipv4Config {
                filter: Some(Ipv4Filter::allow_only(&[Icmpv4Type::ECHO_REPLY])),
            },
        )?;

        let c6 = match Ipv6Conn::listen(
            ifi,
            Ipv6Config {
                filter: Some(Ipv6Filter::allow_only(&[Icmpv6Type::ECHO_REPLY])),
            },
        ) {
            Ok(c6) => c6,
            Err(e) => {
                let _ = c4.close();
                return Err(e);
            }
        };

        Ok(Self::from_conns(c4, c6, config))
    }

    /// Builds a client on top of existing connections. Every message read
    /// from them is expected to be an echo reply.
    pub fn from_conns(
        c4: impl Conn + 'static,
        c6: impl Conn + 'static,
        config: ClientConfig,
    ) -> Self {
        Self {
            v4: ConnContext::new(Family::V4, Box::new(c4), &config),
            v6: ConnContext::new(Family::V6, Box::new(c6), &config),
        }
    }

    /// Pings `dst` until it replies or `cancel` fires. There is no retry
    /// limit; apply a deadline through `cancel` or a timeout.
    pub async fn ping(&self, cancel: &CancellationToken, dst: IpAddr) -> Result<Response> {
        match dst {
            IpAddr::V4(_) => self.v4.ping(cancel, dst).await,
            IpAddr::V6(_) => self.v6.ping(cancel, dst).await,
        }
    }

    /// Closes both connections, reporting the first error.
    pub async fn close(&self) -> Result<()> {
        if let Err(e) = self.v4.close().await {
            let _ = self.v6.close().await;
            return Err(e);
        }

        self.v6.close().await
    }
}
