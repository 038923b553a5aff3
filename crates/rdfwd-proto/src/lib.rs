//! rdfwd-proto: wire messages for the rdfwd connection-forwarding protocol.
//!
//! The host transport owns message framing (length prefix, command tag,
//! encryption, ...); this crate only encodes/decodes the fixed-layout
//! payload bytes for each control message, plus the shared error type.

pub mod error;
pub mod messages;
pub mod wire;

// Re-export commonly used items at crate root.
pub use error::{ForwardError, ForwardResult};
pub use messages::{
    AckMsg, AcceptedMsg, CloseMsg, Command, ConnectMsg, DataMsg, ListenMsg, Proto, ShutdownMsg,
};
