//! Numeric and flow-control constants.

/// Per-stream, per-direction in-flight byte limit.
pub const WINDOW_SIZE: u32 = 10 * 1024 * 1024; // 10 MiB

/// `id: u32 + size: u32` — the fixed prefix of a DATA message.
pub const DATA_HEAD_SIZE: usize = 8;

/// The outer transport's maximum message length minus its header. The
/// engine is handed already-framed payloads, so this is a policy choice
/// rather than a wire-format requirement: it bounds how much is read from
/// a socket per DATA message.
pub const MAX_MSG_SIZE: usize = 64 * 1024;

/// The per-read chunk size: `MAX_MSG_SIZE` minus the DATA header.
pub const BUFFER_SIZE: usize = MAX_MSG_SIZE - DATA_HEAD_SIZE;
