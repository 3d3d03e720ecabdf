//! # Omron FINS/TCP Protocol Library
//!
//! A Rust library for communicating with Omron PLCs over FINS/TCP
//! (Factory Interface Network Service), plus an in-process PLC simulator
//! for testing without hardware.
//!
//! The library is **protocol-only**: no polling, schedulers, caching, or
//! application logic. One call produces one request and one response. The
//! single deliberate exception is [`Client::reconnect`], an explicit
//! recovery path with a fixed backoff sequence; nothing reconnects
//! automatically.
//!
//! ## Features
//!
//! - **Long-lived sessions** — one TCP connection per PLC with the FINS/TCP
//!   handshake and node negotiation handled at connect
//! - **Concurrent callers** — any number of tasks can issue operations on
//!   one client; responses are correlated by service ID, not arrival order
//! - **Typed memory access** — memory areas as enums with word/bit classes
//!   checked before the wire is touched
//! - **Self-healing framing** — the stream parser resynchronizes on the
//!   `"FINS"` marker after corrupt input
//! - **No panics** — all errors are returned as [`Result<T, Error>`]
//! - **Test double included** — [`Simulator`] speaks the same framing and
//!   services DM word/bit memory against in-memory arenas
//!
//! ## Quick Start
//!
//! ```no_run
//! use fins_tcp::{Client, Endpoint, MemoryArea};
//!
//! #[tokio::main]
//! async fn main() -> fins_tcp::Result<()> {
//!     // This client is FINS node 2; the PLC at 192.168.1.250 is node 10.
//!     let local = Endpoint::new("192.168.1.5", 9600, 0, 2, 0)?;
//!     let plc = Endpoint::new("192.168.1.250", 9600, 0, 10, 0)?;
//!     let client = Client::connect(&local, &plc).await?;
//!
//!     // Read 10 words from DM100
//!     let data = client.read_words(MemoryArea::DmWord, 100, 10).await?;
//!     println!("DM100-109: {data:?}");
//!
//!     // Write values to DM200
//!     client.write_words(MemoryArea::DmWord, 200, &[0x1234, 0x5678]).await?;
//!
//!     // Work with individual bits
//!     client.set_bit(MemoryArea::WrBit, 0, 5).await?;
//!     let bits = client.read_bits(MemoryArea::WrBit, 0, 5, 1).await?;
//!     println!("WR 0.05 = {}", bits[0]);
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Memory Areas
//!
//! | Area | Description | Word code | Bit code |
//! |------|-------------|:---------:|:--------:|
//! | [`MemoryArea::DmWord`] / [`MemoryArea::DmBit`] | Data Memory | 0x82 | 0x02 |
//! | [`MemoryArea::ArWord`] / [`MemoryArea::ArBit`] | Auxiliary Relay | 0xB3 | 0x33 |
//! | [`MemoryArea::HrWord`] / [`MemoryArea::HrBit`] | Holding area | 0xB2 | 0x32 |
//! | [`MemoryArea::WrWord`] / [`MemoryArea::WrBit`] | Work area | 0xB1 | 0x31 |
//!
//! Word and byte operations require a word-addressed area; bit operations a
//! bit-addressed one. Mixing the two fails with
//! [`Error::IncompatibleMemoryArea`] before anything is sent.
//!
//! ## Testing Against the Simulator
//!
//! ```no_run
//! use fins_tcp::{Client, Endpoint, MemoryArea, Simulator};
//!
//! # async fn demo() -> fins_tcp::Result<()> {
//! // Bind to an ephemeral port and dial whatever was assigned.
//! let simulator = Simulator::start(&Endpoint::new("127.0.0.1", 0, 0, 10, 0)?).await?;
//! let local = Endpoint::new("127.0.0.1", 9600, 0, 2, 0)?;
//! let plc = Endpoint::from_socket_addr(simulator.local_addr(), 0, 10, 0);
//!
//! let client = Client::connect(&local, &plc).await?;
//! client.write_words(MemoryArea::DmWord, 100, &[1, 2, 3, 4, 5]).await?;
//! assert_eq!(
//!     client.read_words(MemoryArea::DmWord, 100, 5).await?,
//!     vec![1, 2, 3, 4, 5]
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`]. PLC-reported failures keep
//! their numeric end code; [`end_code_description`] maps the documented
//! codes to text.
//!
//! ```no_run
//! use fins_tcp::{Client, Error, MemoryArea};
//!
//! # async fn demo(client: Client) {
//! match client.read_words(MemoryArea::DmWord, 100, 10).await {
//!     Ok(data) => println!("data: {data:?}"),
//!     Err(Error::ResponseTimeout(d)) => eprintln!("PLC silent for {d:?}"),
//!     Err(Error::EndCodeNonNormal(code)) => eprintln!("PLC end code 0x{code:04X}"),
//!     Err(e) => eprintln!("error: {e}"),
//! }
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```
//! use fins_tcp::{ByteOrder, ClientConfig};
//! use std::time::Duration;
//!
//! let config = ClientConfig::new()
//!     .with_response_timeout(Duration::from_secs(2)) // default 10 s, zero = no deadline
//!     .with_connect_timeout(Duration::from_secs(1))  // default 5 s
//!     .with_byte_order(ByteOrder::LittleEndian)      // default big-endian
//!     .with_keepalive(Duration::from_secs(30))       // default disabled
//!     .with_max_packet_size(4096);                   // default 2048
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod address;
mod client;
mod command;
mod error;
mod frame;
mod header;
mod memory;
mod response;
mod session;
mod simulator;
mod status;

// Public re-exports
pub use address::{Endpoint, MemoryAddress, NodeAddress, MEMORY_ADDRESS_SIZE};
pub use client::{
    ByteOrder, Client, ClientConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_RESPONSE_TIMEOUT,
};
pub use command::{
    Request, COMMAND_CLOCK_READ, COMMAND_MEMORY_AREA_READ, COMMAND_MEMORY_AREA_WRITE,
    COMMAND_PLC_STATUS_READ,
};
pub use error::{end_code_description, Error, Result};
pub use frame::{FrameParser, DEFAULT_MAX_PACKET_SIZE};
pub use header::{Header, HEADER_SIZE};
pub use memory::MemoryArea;
pub use response::{
    decode_bcd, Response, END_CODE_ADDRESS_RANGE_EXCEEDED, END_CODE_NORMAL_COMPLETION,
    END_CODE_NOT_SUPPORTED,
};
pub use simulator::{Simulator, DM_AREA_SIZE};
pub use status::{FatalErrorFlags, ModeCode, PlcStatus, StatusCode};
