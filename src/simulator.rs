//! In-process PLC simulator.
//!
//! A soft PLC speaking the FINS/TCP framing, intended as a test double for
//! the client: it answers the handshake, services Memory Area Read/Write
//! against two flat 32 KiB byte arenas (DM words and DM bits), and rejects
//! everything else with the appropriate end code. It is not a faithful
//! controller model; it exists so protocol behavior can be exercised
//! without hardware.
//!
//! # Example
//!
//! ```no_run
//! use fins_tcp::{Client, Endpoint, MemoryArea, Simulator};
//!
//! # async fn demo() -> fins_tcp::Result<()> {
//! let plc = Endpoint::new("127.0.0.1", 0, 0, 10, 0)?;
//! let simulator = Simulator::start(&plc).await?;
//!
//! let local = Endpoint::new("127.0.0.1", 9600, 0, 2, 0)?;
//! let plc = Endpoint::from_socket_addr(simulator.local_addr(), 0, 10, 0);
//! let client = Client::connect(&local, &plc).await?;
//! client.write_words(MemoryArea::DmWord, 100, &[1, 2, 3]).await?;
//!
//! client.close().await;
//! simulator.close();
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::address::{Endpoint, MemoryAddress};
use crate::command::{Request, COMMAND_MEMORY_AREA_READ, COMMAND_MEMORY_AREA_WRITE};
use crate::error::Result;
use crate::frame::{
    self, FrameParser, ENVELOPE_SIZE, SELECTOR_DATA, SELECTOR_HANDSHAKE,
};
use crate::memory::MemoryArea;
use crate::response::{
    Response, END_CODE_ADDRESS_RANGE_EXCEEDED, END_CODE_NORMAL_COMPLETION, END_CODE_NOT_SUPPORTED,
};

/// Size of each simulated memory arena in bytes.
pub const DM_AREA_SIZE: usize = 32 * 1024;

/// Payload bound accepted by the simulator.
const SIMULATOR_MAX_PACKET_SIZE: usize = 4096;

/// Client node granted when the handshake requests auto-assignment.
const AUTO_ASSIGNED_NODE: u8 = 1;

/// The simulated memory, shared by every connection.
struct Arenas {
    words: Mutex<Vec<u8>>,
    bits: Mutex<Vec<u8>>,
}

/// An in-process FINS/TCP PLC simulator.
///
/// Binding to port 0 picks an ephemeral port; [`local_addr`](Self::local_addr)
/// reports the actual address for clients to dial.
pub struct Simulator {
    local_addr: SocketAddr,
    closed: Arc<AtomicBool>,
    accept_task: AbortHandle,
}

impl Simulator {
    /// Binds the listener and starts accepting connections.
    ///
    /// The endpoint's node number is reported as the server node in
    /// handshake replies.
    pub async fn start(endpoint: &Endpoint) -> Result<Self> {
        let listener = TcpListener::bind(endpoint.socket_addr()).await?;
        let local_addr = listener.local_addr()?;
        let server_node = endpoint.node().node;
        let closed = Arc::new(AtomicBool::new(false));
        let arenas = Arc::new(Arenas {
            words: Mutex::new(vec![0; DM_AREA_SIZE]),
            bits: Mutex::new(vec![0; DM_AREA_SIZE]),
        });

        debug!(%local_addr, "simulator listening");
        let accept_closed = Arc::clone(&closed);
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!(%peer, "simulator accepted connection");
                        let arenas = Arc::clone(&arenas);
                        tokio::spawn(async move {
                            if let Err(err) = handle_connection(stream, arenas, server_node).await {
                                debug!("simulator connection ended: {err}");
                            }
                        });
                    }
                    Err(err) => {
                        if accept_closed.load(Ordering::Relaxed) {
                            return;
                        }
                        warn!("simulator accept failed: {err}");
                    }
                }
            }
        })
        .abort_handle();

        Ok(Self {
            local_addr,
            closed,
            accept_task,
        })
    }

    /// Returns the address the simulator is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and closes the listener.
    ///
    /// Connections already established keep running until their peer
    /// disconnects.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.accept_task.abort();
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.close();
    }
}

/// Serves one client connection: handshake first, then data frames.
async fn handle_connection(
    mut stream: TcpStream,
    arenas: Arc<Arenas>,
    server_node: u8,
) -> std::io::Result<()> {
    let parser = FrameParser::new(SIMULATOR_MAX_PACKET_SIZE);
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        if stream.read_buf(&mut buf).await? == 0 {
            return Ok(());
        }
        while let Some(received) = parser.next_frame(&mut buf) {
            match frame::selector(&received) {
                Some(SELECTOR_HANDSHAKE) => {
                    let requested = received.get(19).copied().unwrap_or(0);
                    let granted = if requested == 0 {
                        AUTO_ASSIGNED_NODE
                    } else {
                        requested
                    };
                    debug!(granted, server_node, "simulator answering handshake");
                    stream
                        .write_all(&frame::handshake_reply_frame(granted, server_node))
                        .await?;
                }
                Some(SELECTOR_DATA) => {
                    if received.len() < ENVELOPE_SIZE {
                        warn!(len = received.len(), "data frame shorter than its envelope");
                        continue;
                    }
                    let request = match Request::from_bytes(&received[ENVELOPE_SIZE..]) {
                        Ok(request) => request,
                        Err(err) => {
                            warn!("simulator failed to decode request: {err}");
                            continue;
                        }
                    };
                    let response = dispatch(&request, &arenas);
                    stream
                        .write_all(&frame::data_frame(&response.to_bytes()))
                        .await?;
                }
                other => {
                    debug!(selector = ?other, "simulator ignoring frame");
                }
            }
        }
    }
}

/// Services one request against the arenas.
fn dispatch(request: &Request, arenas: &Arenas) -> Response {
    if request.data.len() < 6 {
        return Response::for_request(request, END_CODE_NOT_SUPPORTED, vec![]);
    }
    let memory = match MemoryAddress::from_bytes(&request.data[..4]) {
        Ok(memory) => memory,
        Err(_) => return Response::for_request(request, END_CODE_NOT_SUPPORTED, vec![]),
    };
    let item_count = u16::from_be_bytes([request.data[4], request.data[5]]);
    let is_read = match request.command_code {
        COMMAND_MEMORY_AREA_READ => true,
        COMMAND_MEMORY_AREA_WRITE => false,
        _ => return Response::for_request(request, END_CODE_NOT_SUPPORTED, vec![]),
    };

    let (end_code, data) = match memory.area {
        MemoryArea::DmWord => serve_area(
            &arenas.words,
            usize::from(memory.word),
            usize::from(item_count) * 2,
            is_read,
            &request.data[6..],
        ),
        MemoryArea::DmBit => serve_area(
            &arenas.bits,
            usize::from(memory.word) + usize::from(memory.bit),
            usize::from(item_count),
            is_read,
            &request.data[6..],
        ),
        _ => (END_CODE_NOT_SUPPORTED, vec![]),
    };
    Response::for_request(request, end_code, data)
}

/// Reads or writes `byte_count` bytes at `start` in one arena.
fn serve_area(
    arena: &Mutex<Vec<u8>>,
    start: usize,
    byte_count: usize,
    is_read: bool,
    payload: &[u8],
) -> (u16, Vec<u8>) {
    let Some(end) = start.checked_add(byte_count).filter(|end| *end <= DM_AREA_SIZE) else {
        return (END_CODE_ADDRESS_RANGE_EXCEEDED, vec![]);
    };
    if is_read {
        let arena = arena.lock();
        (END_CODE_NORMAL_COMPLETION, arena[start..end].to_vec())
    } else {
        if payload.len() < byte_count {
            return (END_CODE_NOT_SUPPORTED, vec![]);
        }
        let mut arena = arena.lock();
        arena[start..end].copy_from_slice(&payload[..byte_count]);
        (END_CODE_NORMAL_COMPLETION, vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::NodeAddress;
    use crate::header::Header;

    fn request(command_code: u16, data: Vec<u8>) -> Request {
        Request {
            header: Header::command(NodeAddress::new(0, 2, 0), NodeAddress::new(0, 10, 0), 0x11),
            command_code,
            data,
        }
    }

    fn arenas() -> Arenas {
        Arenas {
            words: Mutex::new(vec![0; DM_AREA_SIZE]),
            bits: Mutex::new(vec![0; DM_AREA_SIZE]),
        }
    }

    fn read_request(area: MemoryArea, word: u16, count: u16) -> Request {
        let mut data = MemoryAddress::word(area, word).to_bytes().to_vec();
        data.extend_from_slice(&count.to_be_bytes());
        request(COMMAND_MEMORY_AREA_READ, data)
    }

    #[test]
    fn test_dispatch_write_then_read_words() {
        let arenas = arenas();

        let mut data = MemoryAddress::word(MemoryArea::DmWord, 100).to_bytes().to_vec();
        data.extend_from_slice(&2u16.to_be_bytes());
        data.extend_from_slice(&[0x12, 0x34, 0x56, 0x78]);
        let response = dispatch(&request(COMMAND_MEMORY_AREA_WRITE, data), &arenas);
        assert_eq!(response.end_code, END_CODE_NORMAL_COMPLETION);

        let response = dispatch(&read_request(MemoryArea::DmWord, 100, 2), &arenas);
        assert_eq!(response.end_code, END_CODE_NORMAL_COMPLETION);
        assert_eq!(response.data, vec![0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    fn test_dispatch_reply_header_is_swapped() {
        let arenas = arenas();
        let req = read_request(MemoryArea::DmWord, 0, 1);
        let response = dispatch(&req, &arenas);
        assert_eq!(response.header.destination(), req.header.source());
        assert_eq!(response.header.source(), req.header.destination());
        assert_eq!(response.header.sid, req.header.sid);
        assert!(!response.header.is_response_required());
    }

    #[test]
    fn test_dispatch_out_of_range_read() {
        let arenas = arenas();
        let response = dispatch(&read_request(MemoryArea::DmWord, 0x7FFF, 2), &arenas);
        assert_eq!(response.end_code, END_CODE_ADDRESS_RANGE_EXCEEDED);
    }

    #[test]
    fn test_dispatch_bit_offset_counts_toward_bounds() {
        let arenas = arenas();
        let mut data = MemoryAddress::bit(MemoryArea::DmBit, 0x7FFF, 15)
            .unwrap()
            .to_bytes()
            .to_vec();
        data.extend_from_slice(&1u16.to_be_bytes());
        let response = dispatch(&request(COMMAND_MEMORY_AREA_READ, data), &arenas);
        assert_eq!(response.end_code, END_CODE_ADDRESS_RANGE_EXCEEDED);
    }

    #[test]
    fn test_dispatch_short_write_body() {
        let arenas = arenas();
        let mut data = MemoryAddress::word(MemoryArea::DmWord, 10).to_bytes().to_vec();
        data.extend_from_slice(&3u16.to_be_bytes());
        data.extend_from_slice(&[0xAA, 0xBB]); // 3 words promised, 2 bytes sent
        let response = dispatch(&request(COMMAND_MEMORY_AREA_WRITE, data), &arenas);
        assert_eq!(response.end_code, END_CODE_NOT_SUPPORTED);
    }

    #[test]
    fn test_dispatch_unsupported_area_and_command() {
        let arenas = arenas();

        let response = dispatch(&read_request(MemoryArea::HrWord, 0, 1), &arenas);
        assert_eq!(response.end_code, END_CODE_NOT_SUPPORTED);

        let mut data = MemoryAddress::word(MemoryArea::DmWord, 0).to_bytes().to_vec();
        data.extend_from_slice(&1u16.to_be_bytes());
        let response = dispatch(&request(0x0701, data), &arenas);
        assert_eq!(response.end_code, END_CODE_NOT_SUPPORTED);
    }

    #[test]
    fn test_dispatch_short_request_data() {
        let arenas = arenas();
        let response = dispatch(&request(COMMAND_MEMORY_AREA_READ, vec![0x82, 0x00]), &arenas);
        assert_eq!(response.end_code, END_CODE_NOT_SUPPORTED);
    }
}
