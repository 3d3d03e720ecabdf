//! FINS/TCP client for communicating with Omron PLCs.
//!
//! [`Client`] wraps one [session](crate::session) and exposes the typed
//! operations: word, byte, string, and bit reads and writes, single-bit
//! set/reset/toggle, the PLC clock, and the PLC status. Operations validate
//! their arguments before anything touches the wire and may be invoked
//! concurrently from any number of tasks; responses are correlated by
//! service ID, not arrival order.

use std::time::Duration;

use tracing::warn;

use crate::address::{Endpoint, MemoryAddress, NodeAddress};
use crate::command;
use crate::error::{Error, Result};
use crate::frame::DEFAULT_MAX_PACKET_SIZE;
use crate::memory::MemoryArea;
use crate::response::Response;
use crate::session::Session;
use crate::status::PlcStatus;

/// Default deadline for a correlated response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for establishing the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Backoff sequence used by [`Client::reconnect`].
const RECONNECT_BACKOFF: [Duration; 4] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

/// Byte order used to decode and encode 16-bit words.
///
/// The FINS wire format itself is big-endian; some installations store
/// word payloads little-endian, so the order is configurable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ByteOrder {
    /// Most significant byte first (the default).
    #[default]
    BigEndian,
    /// Least significant byte first.
    LittleEndian,
}

impl ByteOrder {
    pub(crate) fn decode_u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            ByteOrder::BigEndian => u16::from_be_bytes(bytes),
            ByteOrder::LittleEndian => u16::from_le_bytes(bytes),
        }
    }

    pub(crate) fn encode_u16(self, value: u16) -> [u8; 2] {
        match self {
            ByteOrder::BigEndian => value.to_be_bytes(),
            ByteOrder::LittleEndian => value.to_le_bytes(),
        }
    }
}

/// Configuration for creating a FINS client.
///
/// # Example
///
/// ```
/// use fins_tcp::{ByteOrder, ClientConfig};
/// use std::time::Duration;
///
/// let config = ClientConfig::new()
///     .with_response_timeout(Duration::from_secs(2))
///     .with_byte_order(ByteOrder::LittleEndian)
///     .with_keepalive(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline for a correlated response; zero blocks indefinitely.
    pub response_timeout: Duration,
    /// Deadline for the TCP dial and the handshake read.
    pub connect_timeout: Duration,
    /// Byte order for word payloads.
    pub byte_order: ByteOrder,
    /// TCP keepalive period; `None` leaves keepalive disabled.
    pub keepalive: Option<Duration>,
    /// Upper bound on a frame's payload length.
    pub max_packet_size: usize,
}

impl ClientConfig {
    /// Creates a configuration with the documented defaults.
    pub fn new() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            byte_order: ByteOrder::BigEndian,
            keepalive: None,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }

    /// Sets the response timeout (zero = no deadline).
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the word byte order.
    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    /// Enables TCP keepalive with the given period.
    pub fn with_keepalive(mut self, period: Duration) -> Self {
        self.keepalive = Some(period);
        self
    }

    /// Sets the maximum accepted frame payload length.
    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// FINS/TCP client for one PLC.
///
/// Created by [`Client::connect`]; closed by [`Client::close`]. All
/// operations are safe to call concurrently. Word and byte operations
/// require a word-addressed area, bit operations a bit-addressed area;
/// mixing the two fails with [`Error::IncompatibleMemoryArea`] before the
/// wire is touched.
///
/// # Example
///
/// ```no_run
/// use fins_tcp::{Client, Endpoint, MemoryArea};
///
/// # async fn demo() -> fins_tcp::Result<()> {
/// let local = Endpoint::new("192.168.1.5", 9600, 0, 2, 0)?;
/// let plc = Endpoint::new("192.168.1.250", 9600, 0, 10, 0)?;
/// let client = Client::connect(&local, &plc).await?;
///
/// client.write_words(MemoryArea::DmWord, 100, &[1, 2, 3]).await?;
/// let words = client.read_words(MemoryArea::DmWord, 100, 3).await?;
/// assert_eq!(words, vec![1, 2, 3]);
///
/// client.close().await;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    session: Session,
    local: Endpoint,
    plc: Endpoint,
    config: ClientConfig,
}

impl Client {
    /// Connects to a PLC with the default configuration.
    ///
    /// Dials with a bounded timeout, performs the FINS/TCP handshake, and
    /// spawns the listener task. The node numbers granted by the PLC are
    /// recorded and used for all subsequent commands.
    ///
    /// # Errors
    ///
    /// [`Error::DialTimeout`] if the TCP connection cannot be established
    /// in time, [`Error::HandshakeInvalid`] if the handshake reply is
    /// missing or malformed, [`Error::Io`] for transport failures.
    pub async fn connect(local: &Endpoint, plc: &Endpoint) -> Result<Self> {
        Self::connect_with_config(local, plc, ClientConfig::new()).await
    }

    /// Connects to a PLC with an explicit configuration.
    pub async fn connect_with_config(
        local: &Endpoint,
        plc: &Endpoint,
        config: ClientConfig,
    ) -> Result<Self> {
        let session = Session::connect(local, plc, &config).await?;
        Ok(Self {
            session,
            local: local.clone(),
            plc: plc.clone(),
            config,
        })
    }

    /// Reads `count` words from a word-addressed memory area.
    ///
    /// # Errors
    ///
    /// [`Error::IncompatibleMemoryArea`] if `area` is not word-addressed,
    /// [`Error::InvalidArgument`] for a zero count or a request exceeding
    /// the packet bound, plus the per-request failure modes of the session
    /// ([`Error::ResponseTimeout`], [`Error::ChannelClosed`], [`Error::Io`],
    /// [`Error::NotConnected`], [`Error::EndCodeNonNormal`]).
    pub async fn read_words(&self, area: MemoryArea, address: u16, count: u16) -> Result<Vec<u16>> {
        self.require_word_area(area)?;
        self.check_request_size(count, 2)?;
        let command = command::read_command(MemoryAddress::word(area, address), count);
        let response = self.transact(&command).await?;
        response.words(self.session.byte_order(), count)
    }

    /// Reads `byte_count` bytes from a word-addressed memory area.
    ///
    /// `byte_count` must be even (the wire carries whole words). The
    /// returned payload is exactly what the PLC sent and may exceed
    /// `byte_count` if the device answers with full word pairs.
    pub async fn read_bytes(
        &self,
        area: MemoryArea,
        address: u16,
        byte_count: u16,
    ) -> Result<Vec<u8>> {
        self.require_word_area(area)?;
        if byte_count % 2 != 0 {
            return Err(Error::invalid_argument(
                "odd length: byte count for a word area must be a multiple of 2",
            ));
        }
        let word_count = byte_count / 2;
        self.check_request_size(word_count, 2)?;
        let command = command::read_command(MemoryAddress::word(area, address), word_count);
        let response = self.transact(&command).await?;
        Ok(response.data)
    }

    /// Reads a NUL-trimmed string from a word-addressed memory area.
    ///
    /// `byte_count` is rounded up to the next even value; trailing NUL
    /// bytes are stripped and the rest interpreted as UTF-8 (invalid
    /// sequences are replaced, valid UTF-8 is returned unchanged).
    pub async fn read_string(
        &self,
        area: MemoryArea,
        address: u16,
        byte_count: u16,
    ) -> Result<String> {
        let byte_count = byte_count
            .checked_add(byte_count % 2)
            .ok_or_else(|| Error::invalid_argument("byte count too large to word-align"))?;
        let data = self.read_bytes(area, address, byte_count).await?;
        let end = data
            .iter()
            .rposition(|b| *b != 0x00)
            .map_or(0, |pos| pos + 1);
        Ok(String::from_utf8_lossy(&data[..end]).into_owned())
    }

    /// Reads `count` bits from a bit-addressed memory area.
    ///
    /// Each returned boolean is the low bit of the corresponding response
    /// byte.
    pub async fn read_bits(
        &self,
        area: MemoryArea,
        address: u16,
        bit_offset: u8,
        count: u16,
    ) -> Result<Vec<bool>> {
        self.require_bit_area(area)?;
        self.check_request_size(count, 1)?;
        let memory = MemoryAddress::bit(area, address, bit_offset)?;
        let command = command::read_command(memory, count);
        let response = self.transact(&command).await?;
        response.bits(count)
    }

    /// Writes words to a word-addressed memory area.
    pub async fn write_words(&self, area: MemoryArea, address: u16, data: &[u16]) -> Result<()> {
        self.require_word_area(area)?;
        let count = self.item_count(data.len())?;
        self.check_request_size(count, 2)?;
        let order = self.session.byte_order();
        let mut payload = Vec::with_capacity(data.len() * 2);
        for word in data {
            payload.extend_from_slice(&order.encode_u16(*word));
        }
        let command = command::write_command(MemoryAddress::word(area, address), count, &payload);
        self.transact(&command).await.map(drop)
    }

    /// Writes raw bytes to a word-addressed memory area.
    ///
    /// The length must be even and non-zero.
    pub async fn write_bytes(&self, area: MemoryArea, address: u16, data: &[u8]) -> Result<()> {
        self.require_word_area(area)?;
        if data.len() % 2 != 0 {
            return Err(Error::invalid_argument(
                "odd length: data for a word area must be a whole number of words",
            ));
        }
        let count = self.item_count(data.len() / 2)?;
        self.check_request_size(count, 2)?;
        let command = command::write_command(MemoryAddress::word(area, address), count, data);
        self.transact(&command).await.map(drop)
    }

    /// Writes a string to a word-addressed memory area.
    ///
    /// Odd-length strings are padded with one NUL byte for word alignment.
    pub async fn write_string(&self, area: MemoryArea, address: u16, value: &str) -> Result<()> {
        let mut data = value.as_bytes().to_vec();
        if data.len() % 2 != 0 {
            data.push(0x00);
        }
        self.write_bytes(area, address, &data).await
    }

    /// Writes bits to a bit-addressed memory area.
    pub async fn write_bits(
        &self,
        area: MemoryArea,
        address: u16,
        bit_offset: u8,
        values: &[bool],
    ) -> Result<()> {
        self.require_bit_area(area)?;
        let count = self.item_count(values.len())?;
        self.check_request_size(count, 1)?;
        let memory = MemoryAddress::bit(area, address, bit_offset)?;
        let payload: Vec<u8> = values.iter().map(|v| u8::from(*v)).collect();
        let command = command::write_command(memory, count, &payload);
        self.transact(&command).await.map(drop)
    }

    /// Sets a single bit.
    pub async fn set_bit(&self, area: MemoryArea, address: u16, bit_offset: u8) -> Result<()> {
        self.write_single_bit(area, address, bit_offset, 0x01).await
    }

    /// Resets a single bit.
    pub async fn reset_bit(&self, area: MemoryArea, address: u16, bit_offset: u8) -> Result<()> {
        self.write_single_bit(area, address, bit_offset, 0x00).await
    }

    /// Toggles a single bit.
    ///
    /// This is a read followed by a write of the inverse; the protocol has
    /// no atomic toggle, so a concurrent writer to the same bit can
    /// interleave between the two commands.
    pub async fn toggle_bit(&self, area: MemoryArea, address: u16, bit_offset: u8) -> Result<()> {
        let current = self.read_bits(area, address, bit_offset, 1).await?;
        let inverse = if current[0] { 0x00 } else { 0x01 };
        self.write_single_bit(area, address, bit_offset, inverse).await
    }

    async fn write_single_bit(
        &self,
        area: MemoryArea,
        address: u16,
        bit_offset: u8,
        value: u8,
    ) -> Result<()> {
        self.require_bit_area(area)?;
        let memory = MemoryAddress::bit(area, address, bit_offset)?;
        let command = command::write_command(memory, 1, &[value]);
        self.transact(&command).await.map(drop)
    }

    /// Reads the PLC clock.
    pub async fn read_clock(&self) -> Result<chrono::NaiveDateTime> {
        let response = self.transact(&command::clock_read_command()).await?;
        response.clock()
    }

    /// Reads the PLC operating status.
    pub async fn read_status(&self) -> Result<PlcStatus> {
        let response = self.transact(&command::status_read_command()).await?;
        PlcStatus::from_response(&response)
    }

    /// Probes the PLC for liveness with a clock read.
    pub async fn ping(&self) -> Result<()> {
        self.read_clock().await.map(drop)
    }

    /// Sets the response timeout in milliseconds; 0 means no deadline.
    pub fn set_timeout_ms(&self, timeout_ms: u64) {
        self.session
            .set_response_timeout(Duration::from_millis(timeout_ms));
    }

    /// Sets the byte order used for word payloads.
    pub fn set_byte_order(&self, order: ByteOrder) {
        self.session.set_byte_order(order);
    }

    /// Enables TCP keepalive with the given period, or disables it with
    /// `None`. This changes a socket option only; protocol behavior is
    /// unaffected.
    pub fn set_keepalive(&self, period: Option<Duration>) -> Result<()> {
        self.session.set_keepalive(period)
    }

    /// Closes the client.
    ///
    /// Idempotent. Callers awaiting a response observe
    /// [`Error::ChannelClosed`]; later operations fail with
    /// [`Error::NotConnected`].
    pub async fn close(&self) {
        self.session.close().await;
    }

    /// Returns whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    /// Re-establishes the connection after a failure.
    ///
    /// Closes the current session and redials with backoff (1 s, 2 s, 5 s,
    /// 10 s between attempts). The library never reconnects on its own;
    /// this is the explicit recovery path.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.session.close().await;
        let mut last_error = Error::NotConnected;
        for backoff in RECONNECT_BACKOFF {
            tokio::time::sleep(backoff).await;
            match Session::connect(&self.local, &self.plc, &self.config).await {
                Ok(session) => {
                    self.session = session;
                    return Ok(());
                }
                Err(err) => {
                    warn!("reconnect attempt failed: {err}");
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }

    /// Returns the local (source) node address granted by the PLC.
    pub fn local_node(&self) -> NodeAddress {
        self.session.local_node()
    }

    /// Returns the PLC (destination) node address.
    pub fn remote_node(&self) -> NodeAddress {
        self.session.remote_node()
    }

    async fn transact(&self, command: &[u8]) -> Result<Response> {
        let response = self.session.send_command(command).await?;
        response.check_end_code()?;
        Ok(response)
    }

    fn require_word_area(&self, area: MemoryArea) -> Result<()> {
        if area.is_word() {
            Ok(())
        } else {
            Err(Error::IncompatibleMemoryArea(area.code()))
        }
    }

    fn require_bit_area(&self, area: MemoryArea) -> Result<()> {
        if area.is_bit() {
            Ok(())
        } else {
            Err(Error::IncompatibleMemoryArea(area.code()))
        }
    }

    fn item_count(&self, len: usize) -> Result<u16> {
        if len == 0 {
            return Err(Error::invalid_argument("data must not be empty"));
        }
        u16::try_from(len).map_err(|_| Error::invalid_argument("data exceeds 65535 items"))
    }

    fn check_request_size(&self, count: u16, item_size: usize) -> Result<()> {
        if count == 0 {
            return Err(Error::invalid_argument("count must be greater than 0"));
        }
        let bytes = usize::from(count) * item_size;
        if bytes > self.session.max_packet_size() {
            return Err(Error::invalid_argument(format!(
                "request of {} bytes exceeds the {}-byte packet bound",
                bytes,
                self.session.max_packet_size()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("local", &self.local)
            .field("plc", &self.plc)
            .field("closed", &self.session.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_order_codec() {
        assert_eq!(ByteOrder::BigEndian.decode_u16([0x12, 0x34]), 0x1234);
        assert_eq!(ByteOrder::LittleEndian.decode_u16([0x12, 0x34]), 0x3412);
        assert_eq!(ByteOrder::BigEndian.encode_u16(0x1234), [0x12, 0x34]);
        assert_eq!(ByteOrder::LittleEndian.encode_u16(0x1234), [0x34, 0x12]);
    }

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::new();
        assert_eq!(config.response_timeout, Duration::from_secs(10));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.byte_order, ByteOrder::BigEndian);
        assert_eq!(config.keepalive, None);
        assert_eq!(config.max_packet_size, 2048);
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::new()
            .with_response_timeout(Duration::from_millis(50))
            .with_connect_timeout(Duration::from_secs(1))
            .with_byte_order(ByteOrder::LittleEndian)
            .with_keepalive(Duration::from_secs(30))
            .with_max_packet_size(4096);

        assert_eq!(config.response_timeout, Duration::from_millis(50));
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.byte_order, ByteOrder::LittleEndian);
        assert_eq!(config.keepalive, Some(Duration::from_secs(30)));
        assert_eq!(config.max_packet_size, 4096);
    }
}
