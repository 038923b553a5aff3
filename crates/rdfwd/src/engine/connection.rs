//! Stream engine: per-connection state machine.
//!
//! A live connection is two independent tasks sharing an `Arc<Connection>`:
//! [`run_outbound`] pumps socket reads into DATA messages toward the peer,
//! [`run_inbound`] drains a queue of peer-sent DATA payloads into the
//! socket. Both watch the same [`CancellationToken`], so firing it at close
//! stops both promptly; dropping the table's `Arc` and the two tasks'
//! clones is what finally frees the connection — ordinary Rust ownership
//! standing in for a manual reference count.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use rdfwd_proto::messages::DataMsg;
use rdfwd_proto::{AckMsg, Command};

use super::constants::{BUFFER_SIZE, DATA_HEAD_SIZE, WINDOW_SIZE};
use super::forwarder::Forwarder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connecting,
    Open,
    Closing,
}

struct Counters {
    state: ConnState,
    data_received: u32,
    ack_interval: u32,
}

/// Outcome of applying an inbound ACK.
pub enum AckOutcome {
    /// The connection was `Connecting`; it is now `Open` and its read loop
    /// should begin.
    BecameOpen,
    /// `data_sent` crossed back under `WINDOW_SIZE`; the read loop should
    /// resume.
    ResumeRead,
    /// No action needed.
    NoChange,
    /// `size` exceeded `data_sent` — treated as a protocol error and
    /// closed rather than allowed to wrap.
    Underflow,
    /// The connection is already closing; ignore.
    Ignore,
}

/// A live multiplexed bidirectional stream.
pub struct Connection {
    pub id: u32,
    counters: Mutex<Counters>,
    data_sent: AtomicU32,
    open_notify: Notify,
    pub cancellation: CancellationToken,
    write_tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl Connection {
    /// Create a new connection entry plus the receiver its write loop will
    /// drain. Every connection starts `Connecting`: the agent-initiated
    /// path (ACCEPTED) leaves it that way until the local async-connect
    /// succeeds; the client-initiated path (local accept, CONNECT emitted)
    /// leaves it that way until the peer's ACK arrives.
    pub fn new(id: u32, ack_interval: u32) -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Self {
            id,
            counters: Mutex::new(Counters {
                state: ConnState::Connecting,
                data_received: 0,
                ack_interval,
            }),
            data_sent: AtomicU32::new(0),
            open_notify: Notify::new(),
            cancellation: CancellationToken::new(),
            write_tx,
        });
        (conn, write_rx)
    }

    pub fn state(&self) -> ConnState {
        self.counters.lock().unwrap().state
    }

    /// Queue inbound DATA for the write loop. Returns `false` if the
    /// connection is still `Connecting` — inbound DATA is rejected without
    /// mutating state — and the caller logs and drops it.
    pub fn enqueue_data(&self, data: Vec<u8>) -> bool {
        if self.state() == ConnState::Connecting {
            return false;
        }
        self.write_tx.send(data).is_ok()
    }

    /// ACCEPTED-origin handshake completion: the local socket connected.
    pub fn mark_open_after_connect(&self) {
        self.counters.lock().unwrap().state = ConnState::Open;
        self.open_notify.notify_one();
    }

    /// Apply an inbound ACK.
    pub fn on_ack(&self, ack: &AckMsg) -> AckOutcome {
        let mut c = self.counters.lock().unwrap();
        match c.state {
            ConnState::Closing => AckOutcome::Ignore,
            ConnState::Connecting => {
                c.state = ConnState::Open;
                c.ack_interval = ack.win_size / 2;
                drop(c);
                self.open_notify.notify_one();
                AckOutcome::BecameOpen
            }
            ConnState::Open => {
                drop(c);
                let before = self.data_sent.load(Ordering::Relaxed);
                if ack.size > before {
                    return AckOutcome::Underflow;
                }
                let after = before - ack.size;
                self.data_sent.store(after, Ordering::Relaxed);
                if before >= WINDOW_SIZE && after < WINDOW_SIZE {
                    AckOutcome::ResumeRead
                } else {
                    AckOutcome::NoChange
                }
            }
        }
    }

    pub fn window_available(&self) -> bool {
        self.data_sent.load(Ordering::Relaxed) < WINDOW_SIZE
    }

    /// Wake a `run_outbound` loop parked waiting for the window to free up.
    /// Shares `open_notify` with the handshake-completion signal since both
    /// wake the same stalled read loop.
    pub fn notify_resume(&self) {
        self.open_notify.notify_one();
    }

    fn account_sent(&self, n: u32) {
        self.data_sent.fetch_add(n, Ordering::Relaxed);
    }

    /// Record `n` bytes flushed to the local socket; returns an ACK to
    /// emit once `data_received` crosses `ack_interval`.
    fn account_received(&self, n: u32) -> Option<AckMsg> {
        let mut c = self.counters.lock().unwrap();
        c.data_received += n;
        if c.data_received >= c.ack_interval {
            let msg = AckMsg {
                id: self.id,
                size: c.data_received,
                win_size: c.ack_interval * 2,
            };
            c.data_received = 0;
            Some(msg)
        } else {
            None
        }
    }

    /// Mark the connection as closing and fire its cancellation token.
    /// Idempotent: subsequent calls are no-ops.
    pub fn begin_closing(&self) {
        self.counters.lock().unwrap().state = ConnState::Closing;
        self.cancellation.cancel();
    }
}

/// Outbound bytes: socket read -> DATA message toward the peer.
///
/// Waits for `Open` if still `Connecting` (the CONNECT-origin path — the
/// ACCEPTED-origin path is already `Open` by the time this is spawned, so
/// the wait resolves immediately without blocking). Stops on cancellation,
/// EOF, or a read error; the latter two close the connection and notify
/// the peer.
pub async fn run_outbound(conn: Arc<Connection>, mut read_half: OwnedReadHalf, forwarder: Forwarder) {
    if conn.state() == ConnState::Connecting {
        tokio::select! {
            _ = conn.cancellation.cancelled() => return,
            _ = conn.open_notify.notified() => {}
        }
    }

    let mut buf = vec![0u8; DATA_HEAD_SIZE + BUFFER_SIZE];
    loop {
        if conn.cancellation.is_cancelled() {
            break;
        }
        if !conn.window_available() {
            tokio::select! {
                _ = conn.cancellation.cancelled() => break,
                _ = conn.open_notify.notified() => continue,
            }
        }

        let read_result = tokio::select! {
            _ = conn.cancellation.cancelled() => break,
            r = read_half.read(&mut buf[DATA_HEAD_SIZE..]) => r,
        };

        match read_result {
            Ok(0) => {
                debug!(id = conn.id, "connection reset by peer");
                forwarder.close_connection(conn.id, true);
                break;
            }
            Ok(n) => {
                DataMsg::patch_header(&mut buf[..DATA_HEAD_SIZE], conn.id, n as u32);
                forwarder.emit(Command::Data, &buf[..DATA_HEAD_SIZE + n]);
                conn.account_sent(n as u32);
                debug!(id = conn.id, bytes = n, "data forwarded to peer");
            }
            Err(e) => {
                warn!(id = conn.id, error = %e, "read error");
                forwarder.close_connection(conn.id, true);
                break;
            }
        }
    }
}

/// Inbound bytes: peer DATA payloads -> socket write, with ACK accounting.
pub async fn run_inbound(
    conn: Arc<Connection>,
    mut write_half: OwnedWriteHalf,
    mut write_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    forwarder: Forwarder,
) {
    loop {
        let data = tokio::select! {
            _ = conn.cancellation.cancelled() => break,
            msg = write_rx.recv() => match msg {
                Some(d) => d,
                None => break,
            },
        };

        let n = data.len() as u32;
        if let Err(e) = write_half.write_all(&data).await {
            warn!(id = conn.id, error = %e, "write error");
            forwarder.close_connection(conn.id, true);
            break;
        }

        if let Some(ack) = conn.account_received(n) {
            debug!(id = conn.id, size = ack.size, "emitting ack");
            forwarder.emit(Command::Ack, &ack.encode());
        }
    }
    let _ = write_half.shutdown().await;
}
