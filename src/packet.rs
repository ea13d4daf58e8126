//! Wire format of the gateway protocol. All multi-byte fields are little-endian:
//!
//! ```ascii
//! 0: length (u8) - payload length + 5, i.e. the size of the command byte, the payload
//!     and the checksum. The frame on the wire is one byte longer.
//! 1: command (u8) - bit 7 is the sequence flag, bits 0-6 the command code
//! 2: payload (length - 5 bytes)
//! *: checksum (u32 LE) - CRC32 over length, command and payload
//! ```
//!
//! The payload of CONNECT is the upstream address: four IPv4 octets in order, followed by
//!  the port (u16 LE).

pub mod checksum;
pub mod command;

use std::fmt::{Debug, Formatter};
use std::net::{Ipv4Addr, SocketAddrV4};

use anyhow::bail;
use bytes::{Buf, BufMut, Bytes};

pub use checksum::Checksum;
pub use command::Command;

/// Reasons for discarding a frame
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum FrameError {
    /// a field did not arrive within the per-field timeout
    #[error("timeout reading frame")]
    Timeout,
    #[error("checksum mismatch: received {received:?}, calculated {calculated:?}")]
    ChecksumMismatch {
        received: Checksum,
        calculated: Checksum,
    },
    /// the length field is smaller than the fixed part of a frame
    #[error("malformed length field {0}")]
    MalformedLength(u8),
    /// the buffer ends before the frame does
    #[error("incomplete frame")]
    Incomplete,
    /// the byte stream ended
    #[error("byte stream closed")]
    StreamClosed,
}


#[derive(Clone, Eq, PartialEq)]
pub struct Packet {
    /// raw command byte, including the sequence flag
    command: u8,
    payload: Bytes,
}

impl Debug for Packet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.command() {
            Some(command) => write!(f, "{:?}", command)?,
            None => write!(f, "Unknown({:#04x})", self.command)?,
        }
        write!(f, "{{seq:{}, payload:{} bytes}}", self.sequence_flag() as u8, self.payload.len())
    }
}

impl Packet {
    /// length and command byte
    pub const HEADER_LEN: usize = 2;
    /// value of the length field for a packet without payload
    pub const MIN_LEN: usize = 5;
    pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - Self::MIN_LEN;
    pub const CONNECT_PAYLOAD_LEN: usize = 6;

    pub fn try_new(command: Command, sequence_flag: bool, payload: Bytes) -> anyhow::Result<Packet> {
        if payload.len() > Self::MAX_PAYLOAD_LEN {
            bail!("payload of {} bytes exceeds the maximum of {}", payload.len(), Self::MAX_PAYLOAD_LEN);
        }
        Ok(Packet {
            command: command.to_raw(sequence_flag),
            payload,
        })
    }

    /// a packet without payload
    pub fn control(command: Command, sequence_flag: bool) -> Packet {
        Packet {
            command: command.to_raw(sequence_flag),
            payload: Bytes::new(),
        }
    }

    pub fn connect(addr: SocketAddrV4) -> Packet {
        let mut payload = Vec::with_capacity(Self::CONNECT_PAYLOAD_LEN);
        payload.put_slice(&addr.ip().octets());
        payload.put_u16_le(addr.port());
        Packet {
            command: Command::Connect.to_raw(false),
            payload: payload.into(),
        }
    }

    /// The upstream address carried by a CONNECT payload, or `None` if the payload does not
    ///  have exactly the required length
    pub fn connect_addr(&self) -> Option<SocketAddrV4> {
        if self.payload.len() != Self::CONNECT_PAYLOAD_LEN {
            return None;
        }
        let p = &self.payload;
        let ip = Ipv4Addr::new(p[0], p[1], p[2], p[3]);
        let port = u16::from_le_bytes([p[4], p[5]]);
        Some(SocketAddrV4::new(ip, port))
    }

    /// `None` for command codes outside the known set
    pub fn command(&self) -> Option<Command> {
        Command::parse(self.command).0
    }

    pub fn sequence_flag(&self) -> bool {
        Command::parse(self.command).1
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// value of the length field
    pub fn length(&self) -> u8 {
        (Self::MIN_LEN + self.payload.len()) as u8
    }

    pub fn checksum(&self) -> Checksum {
        Checksum::new(self.length(), self.command, &self.payload)
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.length());
        buf.put_u8(self.command);
        buf.put_slice(&self.payload);
        buf.put_slice(&self.checksum().to_le_bytes());
    }

    /// Parses and verifies a single complete frame from the start of the buffer
    pub fn try_deser(buf: &mut impl Buf) -> Result<Packet, FrameError> {
        if buf.remaining() < Self::HEADER_LEN {
            return Err(FrameError::Incomplete);
        }
        let length = buf.get_u8();
        let command = buf.get_u8();

        if (length as usize) < Self::MIN_LEN {
            return Err(FrameError::MalformedLength(length));
        }
        let payload_len = length as usize - Self::MIN_LEN;
        if buf.remaining() < payload_len + Checksum::SERIALIZED_LEN {
            return Err(FrameError::Incomplete);
        }

        let payload = buf.copy_to_bytes(payload_len);
        let received = Checksum(buf.get_u32_le());
        let calculated = Checksum::new(length, command, &payload);
        if received != calculated {
            return Err(FrameError::ChecksumMismatch { received, calculated });
        }

        Ok(Packet { command, payload })
    }
}
