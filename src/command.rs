//! FINS command construction and request codec.
//!
//! A command is a 2-byte big-endian command code followed by a
//! command-specific body; the session prepends the 10-byte header before
//! framing. The builders here produce the four commands the library speaks:
//!
//! | Code | Command | Body |
//! |------|---------|------|
//! | 0x0101 | Memory Area Read | memory address (4) + item count (2) |
//! | 0x0102 | Memory Area Write | memory address (4) + item count (2) + payload |
//! | 0x0601 | PLC Status Read | empty |
//! | 0x0701 | Clock Read | empty |

use crate::address::{MemoryAddress, MEMORY_ADDRESS_SIZE};
use crate::error::{Error, Result};
use crate::header::{Header, HEADER_SIZE};

/// Memory Area Read command code.
pub const COMMAND_MEMORY_AREA_READ: u16 = 0x0101;
/// Memory Area Write command code.
pub const COMMAND_MEMORY_AREA_WRITE: u16 = 0x0102;
/// PLC Status Read command code.
pub const COMMAND_PLC_STATUS_READ: u16 = 0x0601;
/// Clock Read command code.
pub const COMMAND_CLOCK_READ: u16 = 0x0701;

/// Minimum size of an encoded request: header plus command code.
pub const MIN_REQUEST_SIZE: usize = HEADER_SIZE + 2;

/// Builds a Memory Area Read command body.
pub(crate) fn read_command(address: MemoryAddress, item_count: u16) -> Vec<u8> {
    let mut command = Vec::with_capacity(2 + MEMORY_ADDRESS_SIZE + 2);
    command.extend_from_slice(&COMMAND_MEMORY_AREA_READ.to_be_bytes());
    command.extend_from_slice(&address.to_bytes());
    command.extend_from_slice(&item_count.to_be_bytes());
    command
}

/// Builds a Memory Area Write command body.
pub(crate) fn write_command(address: MemoryAddress, item_count: u16, payload: &[u8]) -> Vec<u8> {
    let mut command = Vec::with_capacity(2 + MEMORY_ADDRESS_SIZE + 2 + payload.len());
    command.extend_from_slice(&COMMAND_MEMORY_AREA_WRITE.to_be_bytes());
    command.extend_from_slice(&address.to_bytes());
    command.extend_from_slice(&item_count.to_be_bytes());
    command.extend_from_slice(payload);
    command
}

/// Builds a Clock Read command body.
pub(crate) fn clock_read_command() -> Vec<u8> {
    COMMAND_CLOCK_READ.to_be_bytes().to_vec()
}

/// Builds a PLC Status Read command body.
pub(crate) fn status_read_command() -> Vec<u8> {
    COMMAND_PLC_STATUS_READ.to_be_bytes().to_vec()
}

/// A decoded FINS command request.
///
/// The client never decodes requests; this is the shape the simulator
/// dispatches on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// The request header.
    pub header: Header,
    /// Command code (e.g. [`COMMAND_MEMORY_AREA_READ`]).
    pub command_code: u16,
    /// Command body following the code.
    pub data: Vec<u8>,
}

impl Request {
    /// Serializes the request: header, command code, body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(MIN_REQUEST_SIZE + self.data.len());
        bytes.extend_from_slice(&self.header.to_bytes());
        bytes.extend_from_slice(&self.command_code.to_be_bytes());
        bytes.extend_from_slice(&self.data);
        bytes
    }

    /// Parses a request from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if fewer than 12 bytes are given.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_REQUEST_SIZE {
            return Err(Error::codec(format!(
                "request too short: expected at least {} bytes, got {}",
                MIN_REQUEST_SIZE,
                bytes.len()
            )));
        }
        let header = Header::from_bytes(&bytes[..HEADER_SIZE])?;
        Ok(Self {
            header,
            command_code: u16::from_be_bytes([bytes[HEADER_SIZE], bytes[HEADER_SIZE + 1]]),
            data: bytes[MIN_REQUEST_SIZE..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::NodeAddress;
    use crate::memory::MemoryArea;

    #[test]
    fn test_read_command_layout() {
        let command = read_command(MemoryAddress::word(MemoryArea::DmWord, 100), 10);
        assert_eq!(
            command,
            [0x01, 0x01, 0x82, 0x00, 0x64, 0x00, 0x00, 0x0A]
        );
    }

    #[test]
    fn test_write_command_layout() {
        let command = write_command(
            MemoryAddress::word(MemoryArea::DmWord, 100),
            2,
            &[0x12, 0x34, 0x56, 0x78],
        );
        assert_eq!(
            command,
            [0x01, 0x02, 0x82, 0x00, 0x64, 0x00, 0x00, 0x02, 0x12, 0x34, 0x56, 0x78]
        );
    }

    #[test]
    fn test_write_command_bit_offset() {
        let address = MemoryAddress::bit(MemoryArea::DmBit, 10, 2).unwrap();
        let command = write_command(address, 3, &[0x01, 0x00, 0x01]);
        assert_eq!(
            command,
            [0x01, 0x02, 0x02, 0x00, 0x0A, 0x02, 0x00, 0x03, 0x01, 0x00, 0x01]
        );
    }

    #[test]
    fn test_bare_commands() {
        assert_eq!(clock_read_command(), [0x07, 0x01]);
        assert_eq!(status_read_command(), [0x06, 0x01]);
    }

    #[test]
    fn test_request_roundtrip() {
        let request = Request {
            header: Header::command(NodeAddress::new(0, 2, 0), NodeAddress::new(0, 10, 0), 0x05),
            command_code: COMMAND_MEMORY_AREA_READ,
            data: vec![0x82, 0x00, 0x64, 0x00, 0x00, 0x05],
        };
        let parsed = Request::from_bytes(&request.to_bytes()).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_request_from_bytes_too_short() {
        assert!(matches!(
            Request::from_bytes(&[0xC0; 11]),
            Err(Error::Codec { .. })
        ));
    }
}
