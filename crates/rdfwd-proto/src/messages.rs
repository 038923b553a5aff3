//! Control message types for the connection-forwarding protocol.
//!
//! Field order and widths are compatibility-critical: every multi-byte
//! integer is little-endian and addresses are written as
//! `addressLength: u16` followed by `addressLength + 1` bytes (the address
//! string plus a trailing NUL). The host transport is responsible for
//! framing these payloads and attaching the [`Command`] code; this module
//! only encodes/decodes the payload bytes.

use crate::error::{ForwardError, ForwardResult};
use crate::wire::{put_address, put_u16, put_u32, put_u8, Reader};

/// Numeric command codes carried alongside each payload by the host
/// transport's outer framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    Listen = 0x01,
    Shutdown = 0x02,
    Connect = 0x03,
    Accepted = 0x04,
    Data = 0x05,
    Close = 0x06,
    Ack = 0x07,
}

impl Command {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0x01 => Command::Listen,
            0x02 => Command::Shutdown,
            0x03 => Command::Connect,
            0x04 => Command::Accepted,
            0x05 => Command::Data,
            0x06 => Command::Close,
            0x07 => Command::Ack,
            _ => return None,
        })
    }
}

/// Transport-layer protocol tag. Only `Tcp` is implemented; `Udp` is
/// reserved on the wire and round-trips but is never produced by this
/// crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Proto {
    Tcp = 1,
    Udp = 2,
}

impl Proto {
    fn from_u8(v: u8) -> ForwardResult<Self> {
        match v {
            1 => Ok(Proto::Tcp),
            2 => Ok(Proto::Udp),
            other => Err(ForwardError::MalformedMessage(format!(
                "unknown proto tag {other}"
            ))),
        }
    }
}

/// `LISTEN { id: u32, port: u16, proto: u8, addressLength: u16, address }`
///
/// Emitted by the client when a `associate_remote` rule is registered: asks
/// the peer agent to bind a listening socket on its side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenMsg {
    pub id: u32,
    pub port: u16,
    pub address: String,
}

impl ListenMsg {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(9 + self.address.len());
        put_u32(&mut buf, self.id);
        put_u16(&mut buf, self.port);
        put_u8(&mut buf, Proto::Tcp as u8);
        put_address(&mut buf, &self.address);
        buf
    }

    pub fn decode(data: &[u8]) -> ForwardResult<Self> {
        let mut r = Reader::new(data);
        let id = r.u32()?;
        let port = r.u16()?;
        Proto::from_u8(r.u8()?)?;
        let address = r.address()?;
        Ok(Self { id, port, address })
    }
}

/// `SHUTDOWN { listenId: u32 }`
///
/// Retires a previously emitted `LISTEN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownMsg {
    pub listen_id: u32,
}

impl ShutdownMsg {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4);
        put_u32(&mut buf, self.listen_id);
        buf
    }

    pub fn decode(data: &[u8]) -> ForwardResult<Self> {
        let mut r = Reader::new(data);
        Ok(Self {
            listen_id: r.u32()?,
        })
    }
}

/// `CONNECT { id: u32, winSize: u32, port: u16, proto: u8, addressLength: u16, address }`
///
/// Emitted when a local listener (from `associate_local`) accepts an
/// inbound application connection: asks the peer to open the other half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectMsg {
    pub id: u32,
    pub win_size: u32,
    pub port: u16,
    pub address: String,
}

impl ConnectMsg {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(13 + self.address.len());
        put_u32(&mut buf, self.id);
        put_u32(&mut buf, self.win_size);
        put_u16(&mut buf, self.port);
        put_u8(&mut buf, Proto::Tcp as u8);
        put_address(&mut buf, &self.address);
        buf
    }

    pub fn decode(data: &[u8]) -> ForwardResult<Self> {
        let mut r = Reader::new(data);
        let id = r.u32()?;
        let win_size = r.u32()?;
        let port = r.u16()?;
        Proto::from_u8(r.u8()?)?;
        let address = r.address()?;
        Ok(Self {
            id,
            win_size,
            port,
            address,
        })
    }
}

/// `ACCEPTED { id: u32, listenId: u32, winSize: u32 }`
///
/// Sent by the peer agent when it accepts an inbound connection on a
/// listener the client previously advertised via `LISTEN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptedMsg {
    pub id: u32,
    pub listen_id: u32,
    pub win_size: u32,
}

impl AcceptedMsg {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12);
        put_u32(&mut buf, self.id);
        put_u32(&mut buf, self.listen_id);
        put_u32(&mut buf, self.win_size);
        buf
    }

    pub fn decode(data: &[u8]) -> ForwardResult<Self> {
        let mut r = Reader::new(data);
        Ok(Self {
            id: r.u32()?,
            listen_id: r.u32()?,
            win_size: r.u32()?,
        })
    }
}

/// `DATA { id: u32, size: u32, data: bytes[size] }`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMsg {
    pub id: u32,
    pub data: Vec<u8>,
}

impl DataMsg {
    /// Encode directly into `out`, which the caller may pre-size and reuse
    /// across calls (the stream engine builds this in-place in its read
    /// buffer to avoid a copy — see `Connection::read_buffer`).
    pub fn encode_into(out: &mut Vec<u8>, id: u32, data: &[u8]) {
        out.clear();
        put_u32(out, id);
        put_u32(out, data.len() as u32);
        out.extend_from_slice(data);
    }

    /// Patch the `id`/`size` header fields in place at the front of a
    /// buffer whose payload bytes already follow the header. Used by the
    /// stream engine's read loop, which reads directly into
    /// `buf[DATA_HEAD_SIZE..]` and then stamps the header afterward,
    /// avoiding a copy of the payload.
    pub fn patch_header(buf: &mut [u8], id: u32, size: u32) {
        buf[0..4].copy_from_slice(&id.to_le_bytes());
        buf[4..8].copy_from_slice(&size.to_le_bytes());
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.data.len());
        Self::encode_into(&mut buf, self.id, &self.data);
        buf
    }

    pub fn decode(data: &[u8]) -> ForwardResult<Self> {
        let mut r = Reader::new(data);
        let id = r.u32()?;
        let size = r.u32()? as usize;
        let payload = r.bytes(size)?.to_vec();
        Ok(Self { id, data: payload })
    }
}

/// `CLOSE { id: u32 }`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseMsg {
    pub id: u32,
}

impl CloseMsg {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4);
        put_u32(&mut buf, self.id);
        buf
    }

    pub fn decode(data: &[u8]) -> ForwardResult<Self> {
        let mut r = Reader::new(data);
        Ok(Self { id: r.u32()? })
    }
}

/// `ACK { id: u32, size: u32, winSize: u32 }`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckMsg {
    pub id: u32,
    pub size: u32,
    pub win_size: u32,
}

impl AckMsg {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12);
        put_u32(&mut buf, self.id);
        put_u32(&mut buf, self.size);
        put_u32(&mut buf, self.win_size);
        buf
    }

    pub fn decode(data: &[u8]) -> ForwardResult<Self> {
        let mut r = Reader::new(data);
        Ok(Self {
            id: r.u32()?,
            size: r.u32()?,
            win_size: r.u32()?,
        })
    }
}
