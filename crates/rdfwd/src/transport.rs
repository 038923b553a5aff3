//! Demonstration agent-channel transport: length-prefixed framing of
//! `rdfwd` control messages over a single TCP connection.
//!
//! The engine itself is transport-agnostic; this module is the
//! `rdfwd-host` binary's own choice of framing. Wire format per frame:
//! `length: u32 BE` (covers command + payload) followed by
//! `command: u32 LE` and the payload bytes.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use rdfwd::{CommandSink, Forwarder};
use rdfwd_proto::Command;

const LENGTH_PREFIX_SIZE: usize = 4;
const COMMAND_SIZE: usize = 4;

/// Build the outbound `CommandSink` for a TCP agent channel: every emitted
/// command is framed and queued on an unbounded channel drained by a
/// single dedicated writer task, so frames hit the wire in exactly the
/// order `emit()` was called — the queueing happens synchronously inside
/// the closure, never in a spawned task, so call order and channel order
/// can never diverge. Per-connection flow control (the sliding window)
/// already bounds how much any one connection can have in flight, which
/// is what keeps this queue from growing without bound under a slow peer.
pub fn make_sink(write_half: tokio::net::tcp::OwnedWriteHalf) -> CommandSink {
    let (tx, rx) = mpsc::unbounded_channel::<Vec<u8>>();
    tokio::spawn(run_writer(write_half, rx));
    Arc::new(move |command: Command, payload: &[u8]| {
        let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + COMMAND_SIZE + payload.len());
        let len = (COMMAND_SIZE + payload.len()) as u32;
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&(command as u32).to_le_bytes());
        frame.extend_from_slice(payload);
        let _ = tx.send(frame);
    })
}

/// The agent channel's sole writer: drains queued frames in order and
/// writes each to completion before starting the next. Stops once the
/// channel is closed or a write fails.
async fn run_writer(
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = write_half.write_all(&frame).await {
            warn!(error = %e, "failed to write agent-channel frame");
            break;
        }
    }
}

/// Drive the inbound half of the agent channel: read length-prefixed
/// frames until EOF or error, decoding each into `(command, payload)` and
/// handing it to `forwarder.handle_message`. Returns when the channel
/// closes, at which point the caller should call
/// [`Forwarder::agent_disconnected`].
pub async fn run_inbound(mut read_half: tokio::net::tcp::OwnedReadHalf, forwarder: Forwarder) {
    let mut len_buf = [0u8; LENGTH_PREFIX_SIZE];
    loop {
        if let Err(e) = read_half.read_exact(&mut len_buf).await {
            debug!(error = %e, "agent channel closed");
            break;
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if len < COMMAND_SIZE {
            warn!(len, "agent channel frame shorter than command header, dropping connection");
            break;
        }
        let mut body = vec![0u8; len];
        if let Err(e) = read_half.read_exact(&mut body).await {
            warn!(error = %e, "agent channel truncated mid-frame");
            break;
        }
        let command = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
        forwarder.handle_message(command, &body[COMMAND_SIZE..]);
    }
}

/// Connect to the agent's listening address and split the stream into an
/// inbound reader and an outbound `CommandSink`.
pub async fn connect(addr: &str) -> std::io::Result<(tokio::net::tcp::OwnedReadHalf, CommandSink)> {
    let stream = TcpStream::connect(addr).await?;
    let (read_half, write_half) = stream.into_split();
    Ok((read_half, make_sink(write_half)))
}
