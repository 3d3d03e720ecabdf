//! TCP session lifecycle and request multiplexing.
//!
//! A [`Session`] owns the connection to one PLC: it dials with a bounded
//! timeout, performs the FINS/TCP handshake, and then serves any number of
//! concurrent callers over the single socket. Outgoing commands are tagged
//! with a fresh service ID (SID); a dedicated listener task reads the
//! socket, parses frames, and hands each response to the caller waiting on
//! that SID through a single-use channel slot.
//!
//! Locking is deliberately narrow: the session lock covers the SID counter
//! and the closed flag, a separate registry lock covers the SID → slot map,
//! and neither is ever held across I/O. The only lock spanning an await is
//! the writer lock, which serializes whole frames onto the socket because
//! the runtime does not guarantee atomic writes.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, error, warn};

use crate::address::{Endpoint, NodeAddress};
use crate::client::{ByteOrder, ClientConfig};
use crate::error::{Error, Result};
use crate::frame::{self, FrameParser, ENVELOPE_SIZE, SELECTOR_DATA};
use crate::header::{Header, HEADER_SIZE};
use crate::response::Response;

/// Mutable session state guarded by the session lock.
struct SessionState {
    /// Last allocated service ID; 0 is the unset sentinel, never issued.
    sid: u8,
    closed: bool,
    response_timeout: Duration,
    byte_order: ByteOrder,
}

/// State shared between callers and the listener task.
struct Shared {
    state: Mutex<SessionState>,
    /// Registry of in-flight requests. An entry exists exactly while one
    /// request awaits the SID; it is removed on delivery, timeout, write
    /// failure, or close.
    pending: Mutex<HashMap<u8, oneshot::Sender<Response>>>,
}

impl Shared {
    /// Allocates the next free SID and snapshots the response timeout.
    ///
    /// Skips 0 and SIDs with an in-flight request. After a full revolution
    /// with no free SID the current candidate is reused under a warning;
    /// the session is degraded but not stuck.
    fn allocate_sid(&self) -> Result<(u8, Duration)> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::NotConnected);
        }

        let first = next_sid(state.sid);
        state.sid = first;
        loop {
            if !self.pending.lock().contains_key(&state.sid) {
                break;
            }
            let next = next_sid(state.sid);
            if next == first {
                warn!(sid = state.sid, "all service IDs are in flight, reusing one");
                break;
            }
            state.sid = next;
        }
        Ok((state.sid, state.response_timeout))
    }
}

fn next_sid(sid: u8) -> u8 {
    match sid.wrapping_add(1) {
        0 => 1,
        next => next,
    }
}

/// A live FINS/TCP session with a PLC.
pub(crate) struct Session {
    shared: Arc<Shared>,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    /// Duplicated handle onto the same socket, kept for option changes
    /// after the tokio stream has been split.
    sock: std::net::TcpStream,
    local: NodeAddress,
    remote: NodeAddress,
    max_packet_size: usize,
    listener: AbortHandle,
}

impl Session {
    /// Dials the PLC, performs the handshake, and spawns the listener.
    pub(crate) async fn connect(
        local: &Endpoint,
        plc: &Endpoint,
        config: &ClientConfig,
    ) -> Result<Session> {
        let stream = tokio::time::timeout(
            config.connect_timeout,
            TcpStream::connect(plc.socket_addr()),
        )
        .await
        .map_err(|_| Error::DialTimeout)??;
        stream.set_nodelay(true)?;

        let std_stream = stream.into_std()?;
        let sock = std_stream.try_clone()?;
        if let Some(period) = config.keepalive {
            set_keepalive_on(&sock, Some(period))?;
        }
        let mut stream = TcpStream::from_std(std_stream)?;

        // Request our configured node number; the PLC answers with the
        // node it actually granted plus its own.
        stream
            .write_all(&frame::handshake_frame(local.node().node))
            .await?;
        let mut reply = [0u8; frame::HANDSHAKE_REPLY_SIZE];
        match tokio::time::timeout(config.connect_timeout, stream.read_exact(&mut reply)).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(Error::handshake_invalid("connection closed during handshake"));
            }
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => {
                return Err(Error::handshake_invalid("timed out waiting for handshake reply"));
            }
        }
        let (client_node, server_node) = frame::parse_handshake_reply(&reply)?;

        let mut src = local.node();
        src.node = client_node;
        let mut dst = plc.node();
        dst.node = server_node;
        debug!(%src, %dst, "FINS/TCP handshake complete");

        let (reader, writer) = stream.into_split();
        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState {
                sid: 0,
                closed: false,
                response_timeout: config.response_timeout,
                byte_order: config.byte_order,
            }),
            pending: Mutex::new(HashMap::new()),
        });

        let listener = tokio::spawn(listen_loop(
            reader,
            Arc::clone(&shared),
            FrameParser::new(config.max_packet_size),
        ));
        let abort = listener.abort_handle();
        // The listener itself must never bring the process down; a panic
        // is observed here and logged. Abort on close is not a panic and
        // stays silent.
        tokio::spawn(async move {
            if let Err(err) = listener.await {
                if err.is_panic() {
                    error!("listener task panicked: {err}");
                }
            }
        });

        Ok(Session {
            shared,
            writer: tokio::sync::Mutex::new(writer),
            sock,
            local: src,
            remote: dst,
            max_packet_size: config.max_packet_size,
            listener: abort,
        })
    }

    /// Sends one FINS command (code + body) and awaits its response.
    pub(crate) async fn send_command(&self, command: &[u8]) -> Result<Response> {
        let (sid, timeout) = self.shared.allocate_sid()?;

        let header = Header::command(self.local, self.remote, sid);
        let mut message = Vec::with_capacity(HEADER_SIZE + command.len());
        message.extend_from_slice(&header.to_bytes());
        message.extend_from_slice(command);
        let frame = frame::data_frame(&message);

        // Register the slot before the frame hits the wire; a response can
        // arrive faster than this task is rescheduled.
        let (slot, response) = oneshot::channel();
        self.shared.pending.lock().insert(sid, slot);

        {
            let mut writer = self.writer.lock().await;
            if let Err(err) = writer.write_all(&frame).await {
                self.shared.pending.lock().remove(&sid);
                return Err(err.into());
            }
        }

        let outcome = if timeout.is_zero() {
            response.await.map_err(|_| Error::ChannelClosed)
        } else {
            match tokio::time::timeout(timeout, response).await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(_)) => Err(Error::ChannelClosed),
                Err(_) => Err(Error::ResponseTimeout(timeout)),
            }
        };
        if outcome.is_err() {
            // Delivery removes the entry; timeout and closure must too, so
            // the SID frees up and a late response is discarded.
            self.shared.pending.lock().remove(&sid);
        }
        outcome
    }

    /// Idempotently closes the session.
    ///
    /// Pending callers observe [`Error::ChannelClosed`]; the listener task
    /// is stopped and the socket shut down.
    pub(crate) async fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.shared.pending.lock().clear();
        self.listener.abort();
        let mut writer = self.writer.lock().await;
        if let Err(err) = writer.shutdown().await {
            debug!("socket shutdown on close failed: {err}");
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    pub(crate) fn set_response_timeout(&self, timeout: Duration) {
        self.shared.state.lock().response_timeout = timeout;
    }

    pub(crate) fn set_byte_order(&self, order: ByteOrder) {
        self.shared.state.lock().byte_order = order;
    }

    pub(crate) fn byte_order(&self) -> ByteOrder {
        self.shared.state.lock().byte_order
    }

    pub(crate) fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    pub(crate) fn local_node(&self) -> NodeAddress {
        self.local
    }

    pub(crate) fn remote_node(&self) -> NodeAddress {
        self.remote
    }

    /// Enables TCP keepalive with the given period, or disables it.
    pub(crate) fn set_keepalive(&self, period: Option<Duration>) -> Result<()> {
        set_keepalive_on(&self.sock, period)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.state.lock().closed = true;
        self.shared.pending.lock().clear();
        self.listener.abort();
    }
}

fn set_keepalive_on(sock: &std::net::TcpStream, period: Option<Duration>) -> Result<()> {
    let sock = SockRef::from(sock);
    match period {
        Some(period) => {
            sock.set_keepalive(true)?;
            sock.set_tcp_keepalive(&TcpKeepalive::new().with_time(period))?;
        }
        None => sock.set_keepalive(false)?,
    }
    Ok(())
}

/// Listener task: reads the socket for the session's lifetime.
///
/// Framing and codec faults are logged and the offending input skipped; a
/// read error or peer close releases every slot and ends the task.
async fn listen_loop(mut reader: OwnedReadHalf, shared: Arc<Shared>, parser: FrameParser) {
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        if shared.state.lock().closed {
            break;
        }
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                debug!("connection closed by peer");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                if !shared.state.lock().closed {
                    warn!("socket read failed: {err}");
                }
                break;
            }
        }
        while let Some(frame) = parser.next_frame(&mut buf) {
            handle_frame(&shared, &frame);
        }
    }
    shutdown(&shared);
}

fn handle_frame(shared: &Shared, frame: &[u8]) {
    if frame::selector(frame) != Some(SELECTOR_DATA) {
        debug!("ignoring non-data frame");
        return;
    }
    if frame.len() < ENVELOPE_SIZE {
        warn!(len = frame.len(), "data frame shorter than its envelope");
        return;
    }
    match Response::from_bytes(&frame[ENVELOPE_SIZE..]) {
        Ok(response) => deliver(shared, response),
        Err(err) => warn!("failed to decode response: {err}"),
    }
}

/// Hands a response to whoever awaits its SID.
///
/// Delivery never blocks: the slot is single-use and removed here, so a
/// duplicate response for the same SID finds no slot and is discarded.
fn deliver(shared: &Shared, response: Response) {
    let sid = response.header.sid;
    let Some(slot) = shared.pending.lock().remove(&sid) else {
        debug!(sid, "no pending request for response, discarding");
        return;
    };
    if slot.send(response).is_err() {
        debug!(sid, "caller gave up before the response arrived");
    }
}

/// Marks the session closed and releases every registered slot.
fn shutdown(shared: &Shared) {
    shared.state.lock().closed = true;
    let released = shared.pending.lock().len();
    shared.pending.lock().clear();
    if released > 0 {
        debug!(pending = released, "released response slots on listener exit");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_shared() -> Shared {
        Shared {
            state: Mutex::new(SessionState {
                sid: 0,
                closed: false,
                response_timeout: Duration::from_secs(10),
                byte_order: ByteOrder::BigEndian,
            }),
            pending: Mutex::new(HashMap::new()),
        }
    }

    #[test]
    fn test_sid_allocation_is_sequential_and_skips_zero() {
        let shared = test_shared();
        assert_eq!(shared.allocate_sid().unwrap().0, 1);
        assert_eq!(shared.allocate_sid().unwrap().0, 2);

        shared.state.lock().sid = 255;
        assert_eq!(shared.allocate_sid().unwrap().0, 1);
    }

    #[test]
    fn test_sid_allocation_skips_in_flight_requests() {
        let shared = test_shared();
        let (slot, _keep) = oneshot::channel();
        shared.pending.lock().insert(1, slot);
        assert_eq!(shared.allocate_sid().unwrap().0, 2);
    }

    #[test]
    fn test_sid_allocation_degrades_after_full_revolution() {
        let shared = test_shared();
        let mut keep = Vec::new();
        {
            let mut pending = shared.pending.lock();
            for sid in 1..=255u8 {
                let (slot, rx) = oneshot::channel::<Response>();
                pending.insert(sid, slot);
                keep.push(rx);
            }
        }
        // every SID is taken; allocation still hands one out
        let (sid, _) = shared.allocate_sid().unwrap();
        assert!(sid != 0);
    }

    #[test]
    fn test_sid_allocation_fails_when_closed() {
        let shared = test_shared();
        shared.state.lock().closed = true;
        assert!(matches!(shared.allocate_sid(), Err(Error::NotConnected)));
    }

    #[test]
    fn test_deliver_removes_slot_and_discards_duplicates() {
        let shared = test_shared();
        let (slot, mut response_rx) = oneshot::channel();
        shared.pending.lock().insert(7, slot);

        let response = Response {
            header: Header::command(NodeAddress::new(0, 10, 0), NodeAddress::new(0, 2, 0), 7),
            command_code: 0x0101,
            end_code: 0,
            data: vec![],
        };
        deliver(&shared, response.clone());
        assert_eq!(response_rx.try_recv().unwrap(), response);
        assert!(shared.pending.lock().is_empty());

        // second delivery for the same SID finds no slot and is a no-op
        deliver(&shared, response);
    }

    #[test]
    fn test_shutdown_releases_slots() {
        let shared = test_shared();
        let (slot, mut response_rx) = oneshot::channel::<Response>();
        shared.pending.lock().insert(3, slot);

        shutdown(&shared);
        assert!(shared.state.lock().closed);
        assert!(response_rx.try_recv().is_err());
    }
}
