use byteorder::{BigEndian, ByteOrder};
use log::{debug, warn};
use rand::RngCore;
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{ClientConfig, Response, RetryHook};
use crate::addr::ZonedAddr;
use crate::conn::Conn;
use crate::error::{Error, Result};
use crate::icmp::{Echo, Family, Message, MessageType};

/// Length of the random opaque data carried by every echo request.
const ECHO_DATA_LEN: usize = 8;

/// An echo reply routed to a waiting ping.
#[derive(Debug)]
struct PingResponse {
    echo: Echo,
    ip: ZonedAddr,
}

/// Single-slot mailbox for replies carrying one echo ID.
struct ReplySlot {
    tx: mpsc::Sender<PingResponse>,
    rx: tokio::sync::Mutex<mpsc::Receiver<PingResponse>>,
}

impl ReplySlot {
    fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    async fn recv(&self) -> Option<PingResponse> {
        self.rx.lock().await.recv().await
    }
}

/// The outcome of one echo request attempt.
enum Attempt {
    Reply(Response),
    Retry,
}

/// State shared between pings and the background reader.
struct Shared {
    conn: Box<dyn Conn>,
    family: Family,
    typ: MessageType,

    // Echo state per destination host. Lock order: pings, then responses.
    pings: Mutex<HashMap<IpAddr, Echo>>,

    // Reply mailboxes by echo ID. Entries are never removed.
    responses: RwLock<HashMap<u16, Arc<ReplySlot>>>,

    retry_delay: Duration,
    on_retry: Option<RetryHook>,
}

/// Manages one ICMP socket for ping operations: a background reader that
/// dispatches echo replies by ID, and the per-destination echo state.
pub(crate) struct ConnContext {
    shared: Arc<Shared>,
    stop: CancellationToken,
    reader: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl ConnContext {
    /// Starts the background reader for `conn`. Must be called within a Tokio
    /// runtime.
    pub(crate) fn new(family: Family, conn: Box<dyn Conn>, config: &ClientConfig) -> Self {
        let shared = Arc::new(Shared {
            conn,
            family,
            typ: MessageType::echo_request(family),
            pings: Mutex::new(HashMap::new()),
            responses: RwLock::new(HashMap::new()),
            retry_delay: config.retry_delay,
            on_retry: config.on_retry.clone(),
        });

        let stop = CancellationToken::new();
        let reader = tokio::spawn(read_loop(shared.clone(), stop.clone()));

        Self {
            shared,
            stop,
            reader: Mutex::new(Some(reader)),
        }
    }

    /// Stops the background reader and closes the socket. A failure of the
    /// reader is reported after the socket is closed.
    pub(crate) async fn close(&self) -> Result<()> {
        self.stop.cancel();

        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let stopped = match reader {
            Some(handle) => match handle.await {
                Ok(res) => res,
                Err(e) => Err(Error::Io(io::Error::other(e))),
            },
            None => Ok(()),
        };

        match stopped {
            Ok(()) => self.shared.conn.close(),
            Err(e) => {
                let _ = self.shared.conn.close();
                Err(e)
            }
        }
    }

    /// Pings `dst` until a reply arrives or `cancel` fires, resending the
    /// request every retry delay.
    pub(crate) async fn ping(&self, cancel: &CancellationToken, dst: IpAddr) -> Result<Response> {
        if Family::of(&dst) != self.shared.family {
            return Err(Error::FamilyMismatch {
                expected: self.shared.family,
                addr: dst,
            });
        }

        let start = Instant::now();
        loop {
            // Every attempt takes the next sequence number for this host.
            let (echo, slot) = self.shared.echo(dst)?;

            match self.attempt(cancel, start, &echo, &slot, dst).await? {
                Attempt::Reply(res) => return Ok(res),
                Attempt::Retry => {
                    debug!(
                        "no reply from {} for id={} seq={}, retrying",
                        dst, echo.id, echo.seq
                    );
                    if let Some(hook) = &self.shared.on_retry {
                        hook(&echo);
                    }
                }
            }
        }
    }

    /// Sends one echo request and waits up to the retry delay for a reply.
    async fn attempt(
        &self,
        cancel: &CancellationToken,
        start: Instant,
        echo: &Echo,
        slot: &ReplySlot,
        dst: IpAddr,
    ) -> Result<Attempt> {
        let msg = Message::echo(self.shared.typ, echo.clone());
        self.shared.conn.write_to(cancel, &msg, dst).await?;

        tokio::select! {
            res = slot.recv() => match res {
                // TODO: compare sequence number and data so a late reply to an
                // earlier attempt is not taken for this one.
                Some(res) => Ok(Attempt::Reply(Response {
                    duration: start.elapsed(),
                    ping: echo.clone(),
                    pong: res.echo,
                    ip: res.ip,
                })),
                None => Err(Error::Closed),
            },
            _ = tokio::time::sleep(self.shared.retry_delay) => Ok(Attempt::Retry),
            _ = cancel.cancelled() => Err(Error::Cancelled),
        }
    }
}

impl Drop for ConnContext {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

impl Shared {
    /// Returns the next echo request for `ip` along with the mailbox for its
    /// replies, creating both on the first ping to a host.
    fn echo(&self, ip: IpAddr) -> Result<(Echo, Arc<ReplySlot>)> {
        let mut pings = self.pings.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(echo) = pings.get_mut(&ip) {
            echo.seq = echo.seq.wrapping_add(1);
            let echo = echo.clone();
            let slot = self.slot(echo.id);
            return Ok((echo, slot));
        }

        // New host: random opaque data, with the ID taken from its first two
        // bytes.
        let mut data = vec![0u8; ECHO_DATA_LEN];
        rand::thread_rng()
            .try_fill_bytes(&mut data)
            .map_err(io::Error::other)?;

        let echo = Echo {
            id: BigEndian::read_u16(&data[..2]),
            seq: 1,
            data,
        };
        pings.insert(ip, echo.clone());

        let slot = self.slot(echo.id);
        debug!("new echo state for {}: id={}", ip, echo.id);
        Ok((echo, slot))
    }

    /// The reply mailbox for `id`, registered on first use.
    fn slot(&self, id: u16) -> Arc<ReplySlot> {
        if let Some(slot) = self
            .responses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
        {
            return slot.clone();
        }

        self.responses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_insert_with(|| Arc::new(ReplySlot::new()))
            .clone()
    }

    fn lookup(&self, id: u16) -> Option<Arc<ReplySlot>> {
        self.responses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }
}

/// Reads echo replies until `stop` fires, handing each to the ping waiting on
/// its ID.
async fn read_loop(shared: Arc<Shared>, stop: CancellationToken) -> Result<()> {
    loop {
        let (msg, ip) = match shared.conn.read_from(&stop).await {
            Ok(v) => v,
            Err(_) if stop.is_cancelled() => return Ok(()),
            Err(e) => {
                warn!("{} echo reader stopped: {}", shared.family, e);
                return Err(e);
            }
        };

        // The socket filter only lets echo replies through.
        let Some(echo) = msg.into_echo() else {
            debug!("ignoring non-echo message from {}", ip);
            continue;
        };

        let Some(slot) = shared.lookup(echo.id) else {
            debug!("no ping waiting for id={} from {}", echo.id, ip);
            continue;
        };

        let (id, seq) = (echo.id, echo.seq);
        if slot.tx.try_send(PingResponse { echo, ip }).is_err() {
            debug!("dropping echo reply id={} seq={}, mailbox full", id, seq);
        }
    }
}
