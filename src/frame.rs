//! FINS/TCP envelope codec and stream framing.
//!
//! Every message on the wire travels inside the FINS/TCP envelope:
//!
//! ```text
//! offset 0..3   ASCII "FINS"
//! offset 4..7   u32-BE payload length (bytes following this field)
//! offset 8..11  u32-BE command selector (0 = handshake, 1 = handshake
//!               reply, 2 = FINS data frame)
//! offset 12..15 u32-BE error code (0 on success)
//! ```
//!
//! The handshake request carries one extra field, the requested client node
//! (0 = auto-assign); the reply carries the granted client node and the
//! server node. Data frames carry a complete FINS message (10-byte header,
//! 2-byte command code, body).
//!
//! The length field is always derived from the frame being sent: 12 for the
//! handshake request, 16 for the reply, and `8 + message length` for data
//! frames.
//!
//! [`FrameParser`] is the receiving half: an incremental parser over a
//! [`BytesMut`] that seeks the `"FINS"` marker byte-wise when the stream is
//! misaligned, discards envelopes with insane length fields, and emits one
//! complete frame at a time.

use bytes::{Buf, BytesMut};
use tracing::debug;

use crate::error::{Error, Result};

/// The four-byte frame marker.
pub const FRAME_MARKER: [u8; 4] = *b"FINS";

/// Size of the marker plus length field.
pub const FRAME_HEAD_SIZE: usize = 8;

/// Size of the full envelope (marker, length, selector, error code).
pub const ENVELOPE_SIZE: usize = 16;

/// Selector value of a client handshake request.
pub const SELECTOR_HANDSHAKE: u32 = 0;
/// Selector value of a handshake reply.
pub const SELECTOR_HANDSHAKE_REPLY: u32 = 1;
/// Selector value of a FINS data frame.
pub const SELECTOR_DATA: u32 = 2;

/// Total size of a handshake request frame.
pub const HANDSHAKE_FRAME_SIZE: usize = 20;
/// Total size of a handshake reply frame.
pub const HANDSHAKE_REPLY_SIZE: usize = 24;

/// Default upper bound on a frame's payload length field.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 2048;

/// Encodes a handshake request asking for `requested_node` (0 = auto).
pub fn handshake_frame(requested_node: u8) -> [u8; HANDSHAKE_FRAME_SIZE] {
    let mut frame = [0u8; HANDSHAKE_FRAME_SIZE];
    frame[0..4].copy_from_slice(&FRAME_MARKER);
    frame[4..8].copy_from_slice(&12u32.to_be_bytes());
    frame[8..12].copy_from_slice(&SELECTOR_HANDSHAKE.to_be_bytes());
    // error code stays zero
    frame[16..20].copy_from_slice(&u32::from(requested_node).to_be_bytes());
    frame
}

/// Encodes the handshake reply granting `client_node`, naming `server_node`.
pub fn handshake_reply_frame(client_node: u8, server_node: u8) -> [u8; HANDSHAKE_REPLY_SIZE] {
    let mut frame = [0u8; HANDSHAKE_REPLY_SIZE];
    frame[0..4].copy_from_slice(&FRAME_MARKER);
    frame[4..8].copy_from_slice(&16u32.to_be_bytes());
    frame[8..12].copy_from_slice(&SELECTOR_HANDSHAKE_REPLY.to_be_bytes());
    frame[16..20].copy_from_slice(&u32::from(client_node).to_be_bytes());
    frame[20..24].copy_from_slice(&u32::from(server_node).to_be_bytes());
    frame
}

/// Wraps a FINS message (header + command code + body) in a data envelope.
pub fn data_frame(message: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(ENVELOPE_SIZE + message.len());
    frame.extend_from_slice(&FRAME_MARKER);
    frame.extend_from_slice(&((FRAME_HEAD_SIZE + message.len()) as u32).to_be_bytes());
    frame.extend_from_slice(&SELECTOR_DATA.to_be_bytes());
    frame.extend_from_slice(&0u32.to_be_bytes());
    frame.extend_from_slice(message);
    frame
}

/// Reads the selector field of a complete frame.
pub fn selector(frame: &[u8]) -> Option<u32> {
    if frame.len() < 12 {
        return None;
    }
    Some(u32::from_be_bytes([frame[8], frame[9], frame[10], frame[11]]))
}

/// Validates a handshake reply and extracts the granted node numbers.
///
/// Returns `(client_node, server_node)`.
///
/// # Errors
///
/// Returns [`Error::HandshakeInvalid`] on a bad marker, implausible length
/// field, wrong selector, or non-zero error code.
pub fn parse_handshake_reply(frame: &[u8]) -> Result<(u8, u8)> {
    if frame.len() < HANDSHAKE_REPLY_SIZE {
        return Err(Error::handshake_invalid(format!(
            "short handshake reply: {} bytes",
            frame.len()
        )));
    }
    if frame[0..4] != FRAME_MARKER {
        return Err(Error::handshake_invalid("missing FINS marker"));
    }
    let length = u32::from_be_bytes([frame[4], frame[5], frame[6], frame[7]]);
    if length != 16 {
        return Err(Error::handshake_invalid(format!(
            "implausible handshake length field: {length}"
        )));
    }
    let sel = u32::from_be_bytes([frame[8], frame[9], frame[10], frame[11]]);
    if sel != SELECTOR_HANDSHAKE_REPLY {
        return Err(Error::handshake_invalid(format!(
            "unexpected selector {sel} in handshake reply"
        )));
    }
    let error_code = u32::from_be_bytes([frame[12], frame[13], frame[14], frame[15]]);
    if error_code != 0 {
        return Err(Error::handshake_invalid(format!(
            "peer reported handshake error {error_code}"
        )));
    }
    // node numbers are the low bytes of the two u32 fields
    Ok((frame[19], frame[23]))
}

/// Incremental parser for the inbound FINS/TCP byte stream.
///
/// Feed raw socket reads into a [`BytesMut`] and call
/// [`next_frame`](FrameParser::next_frame) until it returns `None`; each
/// `Some` is one complete frame (envelope included). Corrupt input is
/// skipped: the parser searches for the next `"FINS"` marker byte-wise and
/// drops envelope heads whose length field is zero or exceeds the
/// configured bound.
#[derive(Debug, Clone)]
pub struct FrameParser {
    max_packet_size: usize,
}

impl FrameParser {
    /// Creates a parser enforcing the given payload length bound.
    pub fn new(max_packet_size: usize) -> Self {
        Self { max_packet_size }
    }

    /// Extracts the next complete frame, if the buffer holds one.
    ///
    /// Returns `None` when more bytes are needed; corrupted input is
    /// discarded internally and parsing resumes at the next marker.
    pub fn next_frame(&self, buf: &mut BytesMut) -> Option<BytesMut> {
        loop {
            if !seek_marker(buf) {
                return None;
            }
            if buf.len() < FRAME_HEAD_SIZE {
                return None;
            }

            let length = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
            if length == 0 || length > self.max_packet_size {
                debug!(length, max = self.max_packet_size, "discarding envelope with invalid length");
                buf.advance(FRAME_HEAD_SIZE);
                continue;
            }

            let total = FRAME_HEAD_SIZE + length;
            if buf.len() < total {
                return None;
            }
            return Some(buf.split_to(total));
        }
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PACKET_SIZE)
    }
}

/// Advances `buf` to the next `"FINS"` marker.
///
/// Returns true when the buffer now starts with the marker. When no marker
/// is present, all but the last three bytes are discarded (a marker may
/// still be arriving split across reads) and false is returned.
fn seek_marker(buf: &mut BytesMut) -> bool {
    if buf.len() < FRAME_MARKER.len() {
        return false;
    }
    if buf[..4] == FRAME_MARKER {
        return true;
    }
    match buf.windows(4).position(|window| window == FRAME_MARKER) {
        Some(pos) => {
            debug!(skipped = pos, "resynchronizing to FINS marker");
            buf.advance(pos);
            true
        }
        None => {
            let drop = buf.len() - (FRAME_MARKER.len() - 1);
            debug!(skipped = drop, "no FINS marker in buffer");
            buf.advance(drop);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf_from(bytes: &[u8]) -> BytesMut {
        BytesMut::from(bytes)
    }

    #[test]
    fn test_handshake_frame_layout() {
        let frame = handshake_frame(0);
        assert_eq!(&frame[0..4], b"FINS");
        assert_eq!(&frame[4..8], &12u32.to_be_bytes());
        assert_eq!(&frame[8..12], &0u32.to_be_bytes());
        assert_eq!(&frame[12..20], &[0u8; 8]);
    }

    #[test]
    fn test_handshake_reply_roundtrip() {
        let frame = handshake_reply_frame(2, 10);
        let (client, server) = parse_handshake_reply(&frame).unwrap();
        assert_eq!(client, 2);
        assert_eq!(server, 10);
    }

    #[test]
    fn test_parse_handshake_reply_rejects_bad_marker() {
        let mut frame = handshake_reply_frame(2, 10);
        frame[0] = b'X';
        assert!(matches!(
            parse_handshake_reply(&frame),
            Err(Error::HandshakeInvalid { .. })
        ));
    }

    #[test]
    fn test_parse_handshake_reply_rejects_error_code() {
        let mut frame = handshake_reply_frame(2, 10);
        frame[15] = 3;
        assert!(parse_handshake_reply(&frame).is_err());
    }

    #[test]
    fn test_parse_handshake_reply_rejects_short_input() {
        assert!(parse_handshake_reply(b"FINS").is_err());
    }

    #[test]
    fn test_data_frame_length_is_derived() {
        let message = [0xAAu8; 17]; // header(10) + code(2) + 5 body bytes
        let frame = data_frame(&message);
        assert_eq!(frame.len(), ENVELOPE_SIZE + message.len());
        assert_eq!(&frame[4..8], &(8 + 17u32).to_be_bytes());
        assert_eq!(selector(&frame), Some(SELECTOR_DATA));
        assert_eq!(&frame[ENVELOPE_SIZE..], &message);
    }

    #[test]
    fn test_parser_emits_clean_frame() {
        let frame = data_frame(&[1, 2, 3]);
        let mut buf = buf_from(&frame);
        let parsed = FrameParser::default().next_frame(&mut buf).unwrap();
        assert_eq!(&parsed[..], &frame[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_parser_waits_for_full_frame() {
        let frame = data_frame(&[1, 2, 3, 4]);
        let parser = FrameParser::default();

        let mut buf = buf_from(&frame[..10]);
        assert!(parser.next_frame(&mut buf).is_none());

        buf.extend_from_slice(&frame[10..]);
        let parsed = parser.next_frame(&mut buf).unwrap();
        assert_eq!(&parsed[..], &frame[..]);
    }

    #[test]
    fn test_parser_resyncs_past_garbage() {
        let frame = data_frame(&[9, 9]);
        let mut stream = b"some garbage bytes".to_vec();
        stream.extend_from_slice(&frame);

        let mut buf = buf_from(&stream);
        let parsed = FrameParser::default().next_frame(&mut buf).unwrap();
        assert_eq!(&parsed[..], &frame[..]);
    }

    #[test]
    fn test_parser_keeps_partial_marker_tail() {
        let parser = FrameParser::default();
        let mut buf = buf_from(b"xxxxxFIN");
        assert!(parser.next_frame(&mut buf).is_none());

        // the tail "FIN" must have been kept so the marker completes
        let frame = data_frame(&[7]);
        buf.extend_from_slice(&frame[3..]); // 'S' + rest of the frame
        let parsed = parser.next_frame(&mut buf).unwrap();
        assert_eq!(&parsed[..], &frame[..]);
    }

    #[test]
    fn test_parser_discards_invalid_length() {
        let good = data_frame(&[5, 5, 5]);

        // zero length
        let mut stream = Vec::new();
        stream.extend_from_slice(b"FINS");
        stream.extend_from_slice(&0u32.to_be_bytes());
        stream.extend_from_slice(&good);
        let mut buf = buf_from(&stream);
        let parsed = FrameParser::default().next_frame(&mut buf).unwrap();
        assert_eq!(&parsed[..], &good[..]);

        // oversize length
        let mut stream = Vec::new();
        stream.extend_from_slice(b"FINS");
        stream.extend_from_slice(&u32::MAX.to_be_bytes());
        stream.extend_from_slice(&good);
        let mut buf = buf_from(&stream);
        let parsed = FrameParser::default().next_frame(&mut buf).unwrap();
        assert_eq!(&parsed[..], &good[..]);
    }

    #[test]
    fn test_parser_emits_back_to_back_frames() {
        let first = data_frame(&[1]);
        let second = data_frame(&[2, 2]);
        let mut stream = first.clone();
        stream.extend_from_slice(&second);

        let parser = FrameParser::default();
        let mut buf = buf_from(&stream);
        assert_eq!(&parser.next_frame(&mut buf).unwrap()[..], &first[..]);
        assert_eq!(&parser.next_frame(&mut buf).unwrap()[..], &second[..]);
        assert!(parser.next_frame(&mut buf).is_none());
    }
}
