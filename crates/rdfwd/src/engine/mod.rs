//! Connection-forwarding engine — multiplexes bidirectional TCP streams
//! over a single message-oriented control channel to a guest agent.
//!
//! # Submodule architecture
//!
//! The engine is composed of five cooperating submodules:
//!
//! - **[`association`]** — the [`association::AssociationTable`], mapping
//!   remote-listen ports advertised to the peer agent to local
//!   [`target::Target`]s. Consulted on inbound `ACCEPTED`.
//! - **[`listener`]** — the [`listener::ListenerPool`], binding local
//!   sockets for `associate_local` rules and emitting `CONNECT` on every
//!   accept.
//! - **[`connection`]** — the [`connection::Connection`] state machine and
//!   its two pump tasks ([`connection::run_outbound`],
//!   [`connection::run_inbound`]), the bulk of the engine's behavior.
//! - **[`id_alloc`]** — the downward-counting [`id_alloc::IdAllocator`]
//!   that keeps locally-issued connection ids out of the agent's range.
//! - **[`rule`]** — the colon-delimited association rule grammar shared by
//!   `associate_remote` and `associate_local`.
//! - **[`forwarder`]** — the [`forwarder::Forwarder`] itself: owns the
//!   association and connection tables, the listener pool, and the id
//!   allocator, and dispatches inbound control messages to the above.
//! - **[`target`]** — the plain `(host, port)` value carried by listener
//!   registrations and association entries.
//! - **[`constants`]** — the flow-control and buffer-size constants.
//!
//! # Data flow
//!
//! ```text
//! local socket read -> DATA out        (connection::run_outbound)
//! DATA in -> local socket write        (connection::run_inbound)
//! LISTEN/SHUTDOWN/CONNECT/ACK/CLOSE     (forwarder::Forwarder, emitted via
//!                                        the host's CommandSink)
//! ACCEPTED/DATA/CLOSE/ACK (inbound)    (forwarder::Forwarder::handle_message)
//! ```

pub mod association;
pub mod connection;
pub mod constants;
pub mod forwarder;
pub mod id_alloc;
pub mod listener;
pub mod rule;
pub mod target;

pub use forwarder::{CommandSink, Forwarder};
