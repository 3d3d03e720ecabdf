//! PLC run-state decoding for the Status Read command.
//!
//! A status response payload carries the operating status in byte 0, the
//! operating mode in byte 1, and sixteen fatal-error indicator bytes in
//! bytes 2..18; indicator byte `i` set to 1 lights bit `i` of the
//! [`FatalErrorFlags`] bitset.

use crate::error::{Error, Result};
use crate::response::Response;

/// Operating status of the PLC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// Program not being executed.
    Stop,
    /// Program being executed.
    Run,
    /// CPU on standby.
    Standby,
    /// A status byte outside the documented set.
    Unknown(u8),
}

impl StatusCode {
    /// Maps a raw status byte to its code.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => StatusCode::Stop,
            0x01 => StatusCode::Run,
            0x80 => StatusCode::Standby,
            other => StatusCode::Unknown(other),
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusCode::Stop => write!(f, "STOP"),
            StatusCode::Run => write!(f, "RUN"),
            StatusCode::Standby => write!(f, "STANDBY"),
            StatusCode::Unknown(value) => write!(f, "UNKNOWN(0x{value:02X})"),
        }
    }
}

/// Operating mode of the PLC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeCode {
    /// PROGRAM mode.
    Program,
    /// DEBUG mode.
    Debug,
    /// MONITOR mode.
    Monitor,
    /// RUN mode.
    Run,
    /// A mode byte outside the documented set.
    Unknown(u8),
}

impl ModeCode {
    /// Maps a raw mode byte to its code.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => ModeCode::Program,
            0x01 => ModeCode::Debug,
            0x02 => ModeCode::Monitor,
            0x04 => ModeCode::Run,
            other => ModeCode::Unknown(other),
        }
    }
}

impl std::fmt::Display for ModeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModeCode::Program => write!(f, "PROGRAM"),
            ModeCode::Debug => write!(f, "DEBUG"),
            ModeCode::Monitor => write!(f, "MONITOR"),
            ModeCode::Run => write!(f, "RUN"),
            ModeCode::Unknown(value) => write!(f, "UNKNOWN(0x{value:02X})"),
        }
    }
}

/// Fatal-error indicator bits extracted from a status response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FatalErrorFlags(pub u16);

impl FatalErrorFlags {
    /// Returns whether any fatal-error bit is set.
    pub fn any(self) -> bool {
        self.0 != 0
    }

    /// Returns whether the given bit (0-15) is set.
    pub fn bit(self, index: u8) -> bool {
        index < 16 && self.0 & (1 << index) != 0
    }
}

/// Parsed result of a PLC Status Read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlcStatus {
    /// Operating status.
    pub status: StatusCode,
    /// Operating mode.
    pub mode: ModeCode,
    /// Fatal-error indicator bits.
    pub fatal_errors: FatalErrorFlags,
}

impl PlcStatus {
    /// Decodes a status response payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if the payload holds fewer than 18 bytes.
    pub fn from_response(response: &Response) -> Result<Self> {
        let data = &response.data;
        if data.len() < 18 {
            return Err(Error::codec(format!(
                "status payload too short: expected 18 bytes, got {}",
                data.len()
            )));
        }

        let mut fatal = 0u16;
        for (i, indicator) in data[2..18].iter().enumerate() {
            if *indicator == 1 {
                fatal |= 1 << i;
            }
        }

        Ok(Self {
            status: StatusCode::from_u8(data[0]),
            mode: ModeCode::from_u8(data[1]),
            fatal_errors: FatalErrorFlags(fatal),
        })
    }

    /// Returns whether the PLC is executing its program.
    pub fn is_running(&self) -> bool {
        self.status == StatusCode::Run
    }

    /// Returns whether the PLC is stopped.
    pub fn is_stopped(&self) -> bool {
        self.status == StatusCode::Stop
    }

    /// Returns whether the CPU is on standby.
    pub fn is_standby(&self) -> bool {
        self.status == StatusCode::Standby
    }

    /// Returns whether any fatal error is flagged.
    pub fn has_fatal_error(&self) -> bool {
        self.fatal_errors.any()
    }

    /// Returns whether any of the given error bits are flagged.
    ///
    /// # Example
    ///
    /// ```
    /// use fins_tcp::FatalErrorFlags;
    ///
    /// # fn check(status: fins_tcp::PlcStatus) {
    /// if status.has_error(FatalErrorFlags(0x0001)) {
    ///     eprintln!("watchdog timer error");
    /// }
    /// # }
    /// ```
    pub fn has_error(&self, flags: FatalErrorFlags) -> bool {
        self.fatal_errors.0 & flags.0 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::NodeAddress;
    use crate::command::{Request, COMMAND_PLC_STATUS_READ};
    use crate::header::Header;

    fn status_response(payload: &[u8]) -> Response {
        let request = Request {
            header: Header::command(NodeAddress::new(0, 2, 0), NodeAddress::new(0, 10, 0), 0x01),
            command_code: COMMAND_PLC_STATUS_READ,
            data: vec![],
        };
        Response::for_request(&request, 0x0000, payload.to_vec())
    }

    #[test]
    fn test_status_decode_running() {
        let mut payload = vec![0x01, 0x04];
        payload.extend_from_slice(&[0u8; 16]);
        let status = PlcStatus::from_response(&status_response(&payload)).unwrap();
        assert_eq!(status.status, StatusCode::Run);
        assert_eq!(status.mode, ModeCode::Run);
        assert!(status.is_running());
        assert!(!status.has_fatal_error());
    }

    #[test]
    fn test_status_decode_fatal_error_bits() {
        let mut payload = vec![0x00, 0x00];
        let mut indicators = [0u8; 16];
        indicators[0] = 1;
        indicators[15] = 1;
        payload.extend_from_slice(&indicators);

        let status = PlcStatus::from_response(&status_response(&payload)).unwrap();
        assert!(status.is_stopped());
        assert!(status.has_fatal_error());
        assert!(status.fatal_errors.bit(0));
        assert!(status.fatal_errors.bit(15));
        assert!(!status.fatal_errors.bit(7));
        assert_eq!(status.fatal_errors, FatalErrorFlags(0x8001));
    }

    #[test]
    fn test_has_error_masks_specific_bits() {
        let mut payload = vec![0x01, 0x04];
        let mut indicators = [0u8; 16];
        indicators[0] = 1;
        indicators[15] = 1;
        payload.extend_from_slice(&indicators);

        let status = PlcStatus::from_response(&status_response(&payload)).unwrap();
        assert!(status.has_error(FatalErrorFlags(0x0001)));
        assert!(status.has_error(FatalErrorFlags(0x8000)));
        // a mask matches if any of its bits are lit
        assert!(status.has_error(FatalErrorFlags(0x8002)));
        assert!(!status.has_error(FatalErrorFlags(0x0002)));
        assert!(!status.has_error(FatalErrorFlags(0)));
    }

    #[test]
    fn test_status_decode_short_payload() {
        assert!(matches!(
            PlcStatus::from_response(&status_response(&[0x01, 0x02, 0x00])),
            Err(Error::Codec { .. })
        ));
    }

    #[test]
    fn test_unknown_codes_display() {
        assert_eq!(StatusCode::from_u8(0x7F).to_string(), "UNKNOWN(0x7F)");
        assert_eq!(ModeCode::from_u8(0x03).to_string(), "UNKNOWN(0x03)");
        assert_eq!(StatusCode::Standby.to_string(), "STANDBY");
        assert_eq!(ModeCode::Monitor.to_string(), "MONITOR");
    }
}
