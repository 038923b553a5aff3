//! The `Forwarder`: the engine's process-wide singleton.
//!
//! Cheap to clone — an `Arc` around the shared tables — so the handle can
//! be captured freely by spawned listener and connection tasks without
//! lifetime gymnastics.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use rdfwd_proto::messages::{AcceptedMsg, AckMsg, CloseMsg, ConnectMsg, DataMsg, ListenMsg, ShutdownMsg};
use rdfwd_proto::{Command, ForwardResult};

use super::association::AssociationTable;
use super::connection::{run_inbound, run_outbound, AckOutcome, Connection};
use super::constants::WINDOW_SIZE;
use super::id_alloc::IdAllocator;
use super::listener::ListenerPool;
use super::rule::Rule;
use super::target::Target;

/// Callback the host installs at construction: `(command, payload bytes)`.
/// Must be synchronous and non-blocking — it is handed bytes built in a
/// connection's own reusable read buffer and must not retain the slice
/// past return; copy if async emission is required.
pub type CommandSink = Arc<dyn Fn(Command, &[u8]) + Send + Sync>;

struct Inner {
    sink: CommandSink,
    associations: AssociationTable,
    connections: Mutex<HashMap<u32, Arc<Connection>>>,
    listeners: ListenerPool,
    ids: IdAllocator,
}

#[derive(Clone)]
pub struct Forwarder {
    inner: Arc<Inner>,
}

impl Forwarder {
    pub fn new(sink: CommandSink) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                associations: AssociationTable::new(),
                connections: Mutex::new(HashMap::new()),
                listeners: ListenerPool::new(),
                ids: IdAllocator::new(),
            }),
        }
    }

    pub(super) fn emit(&self, command: Command, payload: &[u8]) {
        (self.inner.sink)(command, payload);
    }

    /// Advertise a listening socket on the agent side; traffic the agent
    /// accepts there is relayed to
    /// `host:host_port` on this side. Replacing an already-registered
    /// `guest_port` emits `SHUTDOWN` for the old rule before the new
    /// `LISTEN`.
    pub fn associate_remote(&self, rule: &str) -> bool {
        let parsed = match Rule::parse(rule) {
            Ok(r) => r,
            Err(e) => {
                warn!(rule, error = %e, "malformed associate_remote rule");
                return false;
            }
        };

        if self.inner.associations.get(parsed.port).is_some() {
            self.emit(
                Command::Shutdown,
                &ShutdownMsg {
                    listen_id: parsed.port as u32,
                }
                .encode(),
            );
        }

        let (port, host, host_port, bind_address) =
            (parsed.port, parsed.host, parsed.host_port, parsed.bind_address);

        self.inner
            .associations
            .insert(port, Target::new(host.clone(), host_port));

        self.emit(
            Command::Listen,
            &ListenMsg {
                id: port as u32,
                port,
                address: bind_address,
            }
            .encode(),
        );
        debug!(port, host = %host, host_port, "remote association registered");
        true
    }

    /// Retire a previously registered `associate_remote` rule.
    pub fn disassociate_remote(&self, port: u16) -> bool {
        match self.inner.associations.remove(port) {
            Some(_) => {
                self.emit(
                    Command::Shutdown,
                    &ShutdownMsg {
                        listen_id: port as u32,
                    }
                    .encode(),
                );
                debug!(port, "remote association retired");
                true
            }
            None => false,
        }
    }

    /// Bind a local listening socket; each accept asks the agent to open a
    /// connection to `host:host_port`.
    pub async fn associate_local(&self, rule: &str) -> bool {
        let parsed = match Rule::parse(rule) {
            Ok(r) => r,
            Err(e) => {
                warn!(rule, error = %e, "malformed associate_local rule");
                return false;
            }
        };

        let target = Target::new(parsed.host, parsed.host_port);
        match self
            .inner
            .listeners
            .bind(&parsed.bind_address, parsed.port, target, self.clone())
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(rule, error = %e, "local bind failed");
                false
            }
        }
    }

    /// Called by the listener pool on each local accept. Allocates a
    /// connection id, registers a `Connecting` connection, emits
    /// `CONNECT`, and spawns the stream engine tasks.
    pub(super) fn spawn_outbound_connection(&self, stream: TcpStream, target: Target) {
        let id = self.inner.ids.allocate();
        let ack_interval = WINDOW_SIZE / 2;
        let (conn, write_rx) = Connection::new(id, ack_interval);
        self.inner.connections.lock().unwrap().insert(id, conn.clone());

        self.emit(
            Command::Connect,
            &ConnectMsg {
                id,
                win_size: WINDOW_SIZE,
                port: target.port,
                address: target.host.clone(),
            }
            .encode(),
        );

        let (read_half, write_half) = stream.into_split();
        tokio::spawn(run_outbound(conn.clone(), read_half, self.clone()));
        tokio::spawn(run_inbound(conn, write_half, write_rx, self.clone()));
    }

    /// Idempotent close: removes the entry from the connections table at
    /// most once, fires its cancellation, and — unless the close was
    /// triggered by an inbound `CLOSE` — notifies the peer.
    pub(super) fn close_connection(&self, id: u32, notify_peer: bool) {
        let conn = self.inner.connections.lock().unwrap().remove(&id);
        if let Some(conn) = conn {
            conn.begin_closing();
            if notify_peer {
                self.emit(Command::Close, &CloseMsg { id }.encode());
            }
            debug!(id, "connection closed");
        }
    }

    fn handle_accepted(&self, msg: AcceptedMsg) {
        if self.inner.ids.was_locally_allocated(msg.id) {
            warn!(id = msg.id, "ACCEPTED id collides with a locally allocated id, closing");
            self.emit(Command::Close, &CloseMsg { id: msg.id }.encode());
            return;
        }

        // A duplicate id is closed unconditionally, before the association
        // lookup: whether or not `listen_id` resolves, a stale entry under
        // `msg.id` must never survive this call.
        let prior = self.inner.connections.lock().unwrap().remove(&msg.id);
        if let Some(prior) = prior {
            warn!(id = msg.id, "duplicate connection id on ACCEPTED, closing prior connection");
            prior.begin_closing();
        }

        let target = match self.inner.associations.get(msg.listen_id as u16) {
            Some(t) => t,
            None => {
                warn!(id = msg.id, listen_id = msg.listen_id, "ACCEPTED for unknown association");
                self.emit(Command::Close, &CloseMsg { id: msg.id }.encode());
                return;
            }
        };

        let ack_interval = msg.win_size / 2;
        let (conn, write_rx) = Connection::new(msg.id, ack_interval);
        self.inner.connections.lock().unwrap().insert(msg.id, conn.clone());

        self.spawn_agent_initiated_connect(conn, write_rx, target);
    }

    /// Agent-initiated path: async-connect to the Target, then on success
    /// transition to `Open`, send the initial ACK advertising our window,
    /// and spawn the stream engine tasks.
    fn spawn_agent_initiated_connect(
        &self,
        conn: Arc<Connection>,
        write_rx: mpsc::UnboundedReceiver<Vec<u8>>,
        target: Target,
    ) {
        let forwarder = self.clone();
        tokio::spawn(async move {
            match TcpStream::connect(target.addr_string()).await {
                Ok(stream) => {
                    conn.mark_open_after_connect();
                    forwarder.emit(
                        Command::Ack,
                        &AckMsg {
                            id: conn.id,
                            size: 0,
                            win_size: WINDOW_SIZE,
                        }
                        .encode(),
                    );
                    let (read_half, write_half) = stream.into_split();
                    tokio::spawn(run_outbound(conn.clone(), read_half, forwarder.clone()));
                    run_inbound(conn, write_half, write_rx, forwarder).await;
                }
                Err(e) => {
                    warn!(id = conn.id, target = %target.addr_string(), error = %e, "async connect failed");
                    forwarder.close_connection(conn.id, true);
                }
            }
        });
    }

    fn handle_data(&self, msg: DataMsg) {
        let conn = self.inner.connections.lock().unwrap().get(&msg.id).cloned();
        match conn {
            Some(conn) => {
                if !conn.enqueue_data(msg.data) {
                    warn!(id = msg.id, "DATA for a Connecting-state connection, dropped");
                }
            }
            None => debug!(id = msg.id, "DATA for unknown id, dropped"),
        }
    }

    fn handle_close(&self, msg: CloseMsg) {
        self.close_connection(msg.id, false);
    }

    fn handle_ack(&self, msg: AckMsg) {
        let conn = self.inner.connections.lock().unwrap().get(&msg.id).cloned();
        let conn = match conn {
            Some(c) => c,
            None => {
                debug!(id = msg.id, "ACK for unknown id, ignored");
                return;
            }
        };
        match conn.on_ack(&msg) {
            AckOutcome::Underflow => {
                warn!(id = msg.id, size = msg.size, "ACK size exceeds data_sent, closing");
                self.close_connection(msg.id, true);
            }
            AckOutcome::ResumeRead => {
                debug!(id = msg.id, "window freed, resuming read");
                conn.notify_resume();
            }
            AckOutcome::BecameOpen | AckOutcome::NoChange | AckOutcome::Ignore => {}
        }
    }

    /// Decode and route an inbound control message.
    pub fn handle_message(&self, command: u32, payload: &[u8]) {
        let command = match Command::from_u32(command) {
            Some(c) => c,
            None => {
                warn!(command, "unknown command code, dropped");
                return;
            }
        };

        let result: ForwardResult<()> = (|| {
            match command {
                Command::Accepted => self.handle_accepted(AcceptedMsg::decode(payload)?),
                Command::Data => self.handle_data(DataMsg::decode(payload)?),
                Command::Close => self.handle_close(CloseMsg::decode(payload)?),
                Command::Ack => self.handle_ack(AckMsg::decode(payload)?),
                other => warn!(?other, "inbound message for an outbound-only command, dropped"),
            }
            Ok(())
        })();

        if let Err(e) = result {
            warn!(error = %e, "malformed inbound message, dropped");
        }
    }

    /// The agent disconnected: purge the association and connection
    /// tables. No outbound messages are emitted — the channel is gone.
    pub fn agent_disconnected(&self) {
        self.inner.associations.clear();
        let mut conns = self.inner.connections.lock().unwrap();
        for (_, conn) in conns.drain() {
            conn.begin_closing();
        }
        debug!("agent disconnected, tables cleared");
    }

    /// Full engine teardown: purge the tables and stop every local
    /// listener's accept loop.
    pub fn delete(&self) {
        self.agent_disconnected();
        self.inner.listeners.shutdown();
    }
}
