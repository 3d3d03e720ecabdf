//! Error types for the FINS/TCP library.
//!
//! This module defines the [`Error`] enum and the [`Result`] type alias used
//! throughout the library.
//!
//! # Error Categories
//!
//! - **Validation** - [`Error::IncompatibleMemoryArea`] and
//!   [`Error::InvalidArgument`], raised before anything touches the wire
//! - **Transport** - [`Error::DialTimeout`], [`Error::Io`],
//!   [`Error::HandshakeInvalid`]
//! - **Protocol** - [`Error::Framing`], [`Error::Codec`],
//!   [`Error::BcdBadDigit`], [`Error::BcdOverflow`]
//! - **Request outcome** - [`Error::EndCodeNonNormal`],
//!   [`Error::ResponseTimeout`], [`Error::ChannelClosed`],
//!   [`Error::NotConnected`]
//!
//! # Example
//!
//! ```no_run
//! use fins_tcp::{Client, Endpoint, Error, MemoryArea};
//!
//! # async fn demo() -> fins_tcp::Result<()> {
//! let local = Endpoint::new("127.0.0.1", 9600, 0, 2, 0)?;
//! let plc = Endpoint::new("192.168.1.250", 9600, 0, 10, 0)?;
//! let client = Client::connect(&local, &plc).await?;
//!
//! match client.read_words(MemoryArea::DmWord, 100, 10).await {
//!     Ok(words) => println!("DM100..110 = {words:?}"),
//!     Err(Error::ResponseTimeout(d)) => eprintln!("no response within {d:?}"),
//!     Err(Error::EndCodeNonNormal(code)) => {
//!         // The display includes the documented description, e.g.
//!         // "end code 0x1104: Address range exceeded"
//!         eprintln!("PLC refused the request: 0x{code:04X}");
//!     }
//!     Err(e) => eprintln!("error: {e}"),
//! }
//! # Ok(())
//! # }
//! ```

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Returns a short description of a FINS end code.
///
/// The high byte of an end code names an error category, the low byte the
/// specific fault. Codes this library and its simulator produce, and the
/// responses commonly seen from real controllers, get their own text; any
/// other code falls back to its category.
///
/// # Example
///
/// ```
/// use fins_tcp::end_code_description;
///
/// assert_eq!(end_code_description(0x1104), "Address range exceeded");
/// assert_eq!(end_code_description(0x1177), "Parameter error");
/// ```
pub fn end_code_description(end_code: u16) -> &'static str {
    match end_code {
        0x0000 => "Completed normally",
        0x0001 => "Service was canceled",

        0x0101 => "Local node is not part of the network",
        0x0102 => "Token timed out",
        0x0103 => "Send retries exhausted",
        0x0106 => "Node address collides with another unit",
        0x0100..=0x01FF => "Local node error",

        0x0201 => "Destination node is not part of the network",
        0x0202 => "No unit with the given node address",
        0x0204 => "Destination node is busy",
        0x0205 => "Destination node did not respond in time",
        0x0200..=0x02FF => "Destination node error",

        0x0302 => "CPU unit error at the destination",
        0x0300..=0x03FF => "Controller error at the destination",

        0x0401 => "Undefined command code",
        0x0402 => "Command is not supported by this model or version",
        0x0400..=0x04FF => "Service cannot be executed",

        0x0501 => "Destination address is not in the routing tables",
        0x0502 => "Routing tables are not registered",
        0x0504 => "Relay count exceeded",
        0x0500..=0x05FF => "Routing error",

        0x1001 => "Command is too long",
        0x1002 => "Command is too short",
        0x1003 => "Element count does not match the attached data",
        0x1005 => "Wrong header",
        0x1000..=0x10FF => "Command format error",

        0x1101 => "Memory area code cannot be used here",
        0x1102 => "Wrong access size for the area",
        0x1103 => "First address is not accessible",
        0x1104 => "Address range exceeded",
        0x110B => "Response would exceed the maximum length",
        0x1100..=0x11FF => "Parameter error",

        0x2002 => "Data is read-protected",
        0x2000..=0x20FF => "Cannot read the requested data",

        0x2101 => "Area is read-only",
        0x2102 => "Data is write-protected",
        0x2107 => "File already exists",
        0x2100..=0x21FF => "Cannot write the requested data",

        0x2200..=0x22FF => "Wrong PLC mode for this command",

        0x2303 => "No clock is present",
        0x2300..=0x23FF => "Required device is not present",

        0x2400..=0x24FF => "Data link table error",

        0x2502 => "Memory parity or checksum error",
        0x2505 => "CPU bus error",
        0x250F => "Memory error",
        0x2500..=0x25FF => "Unit error",

        0x2602 => "Wrong password",
        0x2604 => "Area is protected",
        0x2605 => "Service is already executing",
        0x2600..=0x26FF => "Service state does not allow the command",

        0x3001 => "Access right is held by another device",
        0x3000..=0x30FF => "Access right error",

        0x4000..=0x40FF => "Command aborted",

        _ => "Unknown end code",
    }
}

/// Result type alias for FINS operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during FINS/TCP communication.
#[derive(Debug, Error)]
pub enum Error {
    /// The operation's addressing class does not match the memory area.
    ///
    /// Carries the wire code of the rejected area.
    #[error("memory area 0x{0:02X} is incompatible with this operation")]
    IncompatibleMemoryArea(u8),

    /// An argument failed validation before anything was sent.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Description of the rejected argument.
        reason: String,
    },

    /// The TCP connection could not be established within the connect timeout.
    #[error("connection attempt timed out")]
    DialTimeout,

    /// I/O error during communication.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The FINS/TCP handshake failed.
    #[error("handshake failed: {reason}")]
    HandshakeInvalid {
        /// Description of the handshake failure.
        reason: String,
    },

    /// The outer FINS/TCP envelope could not be parsed.
    #[error("framing error: {reason}")]
    Framing {
        /// Description of the framing fault.
        reason: String,
    },

    /// A FINS header, request, or response could not be decoded.
    #[error("codec error: {reason}")]
    Codec {
        /// Description of the decoding failure.
        reason: String,
    },

    /// A BCD field contained a nibble outside 0-9.
    #[error("bad BCD digit: 0x{nibble:X}")]
    BcdBadDigit {
        /// The offending nibble value.
        nibble: u8,
    },

    /// A decoded BCD value overflowed the accumulator.
    #[error("overflow while decoding BCD value")]
    BcdOverflow,

    /// The PLC reported a non-zero end code.
    #[error("end code 0x{code:04X}: {desc}", code = .0, desc = end_code_description(*.0))]
    EndCodeNonNormal(u16),

    /// No correlated response arrived within the response timeout.
    #[error("response timeout after {0:?}")]
    ResponseTimeout(Duration),

    /// The session closed while the caller was awaiting a response.
    #[error("session closed while awaiting a response")]
    ChannelClosed,

    /// An operation was invoked on a closed session.
    #[error("session is not connected")]
    NotConnected,
}

impl Error {
    /// Creates a new `InvalidArgument` error.
    ///
    /// # Example
    ///
    /// ```
    /// use fins_tcp::Error;
    ///
    /// let err = Error::invalid_argument("count must be greater than 0");
    /// ```
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Creates a new `HandshakeInvalid` error.
    pub fn handshake_invalid(reason: impl Into<String>) -> Self {
        Self::HandshakeInvalid {
            reason: reason.into(),
        }
    }

    /// Creates a new `Framing` error.
    pub fn framing(reason: impl Into<String>) -> Self {
        Self::Framing {
            reason: reason.into(),
        }
    }

    /// Creates a new `Codec` error.
    ///
    /// # Example
    ///
    /// ```
    /// use fins_tcp::Error;
    ///
    /// let err = Error::codec("response too short");
    /// ```
    pub fn codec(reason: impl Into<String>) -> Self {
        Self::Codec {
            reason: reason.into(),
        }
    }

    /// Returns the end-code description if this is an `EndCodeNonNormal`.
    ///
    /// # Example
    ///
    /// ```
    /// use fins_tcp::Error;
    ///
    /// let err = Error::EndCodeNonNormal(0x1104);
    /// assert_eq!(err.end_code_description(), Some("Address range exceeded"));
    /// assert_eq!(Error::DialTimeout.end_code_description(), None);
    /// ```
    pub fn end_code_description(&self) -> Option<&'static str> {
        match self {
            Self::EndCodeNonNormal(code) => Some(end_code_description(*code)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_code_non_normal_display() {
        let err = Error::EndCodeNonNormal(0x0402);
        assert_eq!(
            err.to_string(),
            "end code 0x0402: Command is not supported by this model or version"
        );
    }

    #[test]
    fn test_end_code_non_normal_display_unknown() {
        let err = Error::EndCodeNonNormal(0xFFFF);
        assert_eq!(err.to_string(), "end code 0xFFFF: Unknown end code");
    }

    #[test]
    fn test_incompatible_memory_area_display() {
        let err = Error::IncompatibleMemoryArea(0x02);
        assert_eq!(
            err.to_string(),
            "memory area 0x02 is incompatible with this operation"
        );
    }

    #[test]
    fn test_invalid_argument_display() {
        let err = Error::invalid_argument("data length must be even");
        assert_eq!(err.to_string(), "invalid argument: data length must be even");
    }

    #[test]
    fn test_response_timeout_display() {
        let err = Error::ResponseTimeout(Duration::from_millis(50));
        assert_eq!(err.to_string(), "response timeout after 50ms");
    }

    #[test]
    fn test_bcd_errors_display() {
        assert_eq!(
            Error::BcdBadDigit { nibble: 0xA }.to_string(),
            "bad BCD digit: 0xA"
        );
        assert_eq!(
            Error::BcdOverflow.to_string(),
            "overflow while decoding BCD value"
        );
    }

    #[test]
    fn test_end_code_description_various_codes() {
        assert_eq!(end_code_description(0x0000), "Completed normally");
        assert_eq!(end_code_description(0x0103), "Send retries exhausted");
        assert_eq!(end_code_description(0x1104), "Address range exceeded");
        assert_eq!(
            end_code_description(0x1101),
            "Memory area code cannot be used here"
        );
        assert_eq!(end_code_description(0x2505), "CPU bus error");
        assert_eq!(end_code_description(0x4001), "Command aborted");
        assert_eq!(end_code_description(0xABCD), "Unknown end code");
    }

    #[test]
    fn test_end_code_description_category_fallbacks() {
        assert_eq!(end_code_description(0x0299), "Destination node error");
        assert_eq!(end_code_description(0x11FF), "Parameter error");
        assert_eq!(
            end_code_description(0x2206),
            "Wrong PLC mode for this command"
        );
        assert_eq!(end_code_description(0x30AA), "Access right error");
    }

    #[test]
    fn test_error_from_io() {
        let err: Error = io::Error::new(io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(err, Error::Io(_)));
    }
}
