//! FINS response parsing and payload decoding.
//!
//! A FINS response consists of:
//!
//! | Component | Size | Description |
//! |-----------|------|-------------|
//! | Header | 10 bytes | FINS header (same structure as the command) |
//! | Command code | 2 bytes | Echo of the command being answered |
//! | End code | 2 bytes | 0x0000 = normal completion |
//! | Data | variable | Response payload (if any) |
//!
//! The payload decoders here turn raw response data into the shapes the
//! client hands back: words in a configurable byte order, booleans from
//! bit reads, and the PLC clock from six BCD fields.

use chrono::{NaiveDate, NaiveDateTime};

use crate::client::ByteOrder;
use crate::error::{Error, Result};
use crate::header::{Header, HEADER_SIZE};

/// End code reported for normal completion.
pub const END_CODE_NORMAL_COMPLETION: u16 = 0x0000;
/// End code reported when a request runs past a memory area.
pub const END_CODE_ADDRESS_RANGE_EXCEEDED: u16 = 0x1104;
/// End code reported for commands the device does not implement.
pub const END_CODE_NOT_SUPPORTED: u16 = 0x0402;

/// Minimum size of an encoded response: header, command code, end code.
pub const MIN_RESPONSE_SIZE: usize = HEADER_SIZE + 4;

/// A decoded FINS command response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The response header.
    pub header: Header,
    /// Command code this response answers.
    pub command_code: u16,
    /// End code; 0x0000 means normal completion.
    pub end_code: u16,
    /// Response payload.
    pub data: Vec<u8>,
}

impl Response {
    /// Builds the response a device sends for `request`.
    ///
    /// The request header is echoed with source and destination swapped and
    /// the response-required bit cleared; the SID is preserved.
    pub fn for_request(request: &crate::command::Request, end_code: u16, data: Vec<u8>) -> Self {
        Self {
            header: request.header.reply(),
            command_code: request.command_code,
            end_code,
            data,
        }
    }

    /// Serializes the response: header, command code, end code, payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(MIN_RESPONSE_SIZE + self.data.len());
        bytes.extend_from_slice(&self.header.to_bytes());
        bytes.extend_from_slice(&self.command_code.to_be_bytes());
        bytes.extend_from_slice(&self.end_code.to_be_bytes());
        bytes.extend_from_slice(&self.data);
        bytes
    }

    /// Parses a response from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if fewer than 14 bytes are given.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_RESPONSE_SIZE {
            return Err(Error::codec(format!(
                "response too short: expected at least {} bytes, got {}",
                MIN_RESPONSE_SIZE,
                bytes.len()
            )));
        }
        let header = Header::from_bytes(&bytes[..HEADER_SIZE])?;
        Ok(Self {
            header,
            command_code: u16::from_be_bytes([bytes[HEADER_SIZE], bytes[HEADER_SIZE + 1]]),
            end_code: u16::from_be_bytes([bytes[HEADER_SIZE + 2], bytes[HEADER_SIZE + 3]]),
            data: bytes[MIN_RESPONSE_SIZE..].to_vec(),
        })
    }

    /// Fails with [`Error::EndCodeNonNormal`] unless the end code is 0x0000.
    pub fn check_end_code(&self) -> Result<()> {
        if self.end_code == END_CODE_NORMAL_COMPLETION {
            Ok(())
        } else {
            Err(Error::EndCodeNonNormal(self.end_code))
        }
    }

    /// Decodes the first `count` words of the payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if the payload holds fewer than
    /// `2 * count` bytes.
    pub fn words(&self, order: ByteOrder, count: u16) -> Result<Vec<u16>> {
        let needed = usize::from(count) * 2;
        if self.data.len() < needed {
            return Err(Error::codec(format!(
                "expected {} payload bytes for {} words, got {}",
                needed,
                count,
                self.data.len()
            )));
        }
        Ok(self.data[..needed]
            .chunks_exact(2)
            .map(|pair| order.decode_u16([pair[0], pair[1]]))
            .collect())
    }

    /// Decodes the first `count` payload bytes as booleans.
    ///
    /// Each byte's low bit determines the value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if the payload holds fewer than `count`
    /// bytes.
    pub fn bits(&self, count: u16) -> Result<Vec<bool>> {
        let needed = usize::from(count);
        if self.data.len() < needed {
            return Err(Error::codec(format!(
                "expected {} payload bytes for {} bits, got {}",
                needed,
                count,
                self.data.len()
            )));
        }
        Ok(self.data[..needed].iter().map(|b| b & 0x01 != 0).collect())
    }

    /// Decodes the payload of a Clock Read response.
    ///
    /// The payload carries six BCD bytes: year, month, day, hour, minute,
    /// second. Years below 50 are in the 2000s, the rest in the 1900s.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] on a short payload or out-of-range calendar
    /// fields, and the BCD errors on malformed digits.
    pub fn clock(&self) -> Result<NaiveDateTime> {
        if self.data.len() < 6 {
            return Err(Error::codec(format!(
                "clock payload too short: expected 6 bytes, got {}",
                self.data.len()
            )));
        }
        let mut year = decode_bcd(&self.data[0..1])?;
        year += if year < 50 { 2000 } else { 1900 };
        let month = decode_bcd(&self.data[1..2])?;
        let day = decode_bcd(&self.data[2..3])?;
        let hour = decode_bcd(&self.data[3..4])?;
        let minute = decode_bcd(&self.data[4..5])?;
        let second = decode_bcd(&self.data[5..6])?;

        NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
            .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
            .ok_or_else(|| Error::codec("clock fields out of range"))
    }
}

/// Decodes a big-endian BCD byte sequence into a decimal value.
///
/// Each byte contributes two digits, high nibble first. A low nibble of 0xF
/// in the final byte terminates the number without contributing a digit;
/// any other non-decimal nibble is an error.
///
/// # Errors
///
/// Returns [`Error::BcdBadDigit`] for a nibble outside 0-9 and
/// [`Error::BcdOverflow`] if the value exceeds `u64`.
pub fn decode_bcd(bcd: &[u8]) -> Result<u64> {
    let mut value: u64 = 0;
    for (i, byte) in bcd.iter().enumerate() {
        let hi = byte >> 4;
        let lo = byte & 0x0F;

        if hi > 9 {
            return Err(Error::BcdBadDigit { nibble: hi });
        }
        value = push_digit(value, hi)?;

        if lo == 0x0F && i == bcd.len() - 1 {
            return Ok(value);
        }
        if lo > 9 {
            return Err(Error::BcdBadDigit { nibble: lo });
        }
        value = push_digit(value, lo)?;
    }
    Ok(value)
}

fn push_digit(value: u64, digit: u8) -> Result<u64> {
    value
        .checked_mul(10)
        .and_then(|v| v.checked_add(u64::from(digit)))
        .ok_or(Error::BcdOverflow)
}
