//! Incremental frame decoder
//!
//! [`FrameDecoder::feed`] accepts an arbitrary chunk of the byte stream. The
//! chunk may hold zero, one or many frames, or a fraction of one. Bytes that
//! do not yet form a complete frame stay in the connection's receive buffer
//! until the next call; an incomplete frame is never an error.
//!
//! Decoding a frame:
//! 1. Parse the 2-byte base header, the extended length and the masking key,
//!    validating as soon as the relevant bytes are present.
//! 2. Wait until header and payload are fully buffered.
//! 3. Unmask the payload and dispatch it by opcode: control frames are
//!    reported immediately, data frames are reassembled into messages.
//!
//! A malformed frame is terminal: a close frame with the matching code is
//! queued on the connection and it moves to `Closed`.

use bytes::{Buf, Bytes};
use tracing::{debug, trace, warn};

use crate::{Config, MAX_CONTROL_PAYLOAD};
use crate::connection::{Connection, ConnectionState};
use crate::error::{CloseReason, Error, Result};
use crate::frame::{FrameHeader, Message, OpCode, parse_close_payload};
use crate::mask::apply_mask;

/// Something the decoder observed on a connection
#[derive(Debug)]
pub enum FrameEvent {
    /// A complete data message
    Message(Message),
    /// A control frame (close, ping or pong) and its payload
    ControlReceived(OpCode, Bytes),
    /// The stream violated the protocol; the connection is now closed
    ProtocolError(Error),
}

/// Outcome of one decoding step
enum Step {
    /// More bytes are needed
    Wait,
    /// A frame was consumed, possibly producing an event
    Consumed(Option<FrameEvent>),
}

/// Stateless decoder; all per-stream state lives in [`Connection`]
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    /// Maximum payload length of a single frame
    max_frame_size: usize,
    /// Maximum length of a reassembled message
    max_message_size: usize,
}

impl FrameDecoder {
    /// Create a server-side decoder with the limits from `config`
    pub fn new(config: &Config) -> Self {
        Self::with_limits(config.max_frame_size, config.max_message_size)
    }

    /// Create a server-side decoder with explicit limits
    pub fn with_limits(max_frame_size: usize, max_message_size: usize) -> Self {
        Self {
            max_frame_size,
            max_message_size,
        }
    }

    /// Feed bytes received on `conn` and return what they completed
    ///
    /// Nothing is buffered while the connection is not accepting frames.
    pub fn feed(&self, conn: &mut Connection, data: &[u8]) -> Vec<FrameEvent> {
        let mut events = Vec::new();

        if !conn.state.accepts_frames() {
            trace!(conn = %conn.id(), state = ?conn.state, len = data.len(), "ignoring bytes");
            return events;
        }

        conn.recv_buf.extend_from_slice(data);

        while conn.state.accepts_frames() {
            match self.step(conn) {
                Ok(Step::Wait) => break,
                Ok(Step::Consumed(event)) => events.extend(event),
                Err(err) => {
                    warn!(conn = %conn.id(), error = %err, "protocol error");
                    conn.fail(&err);
                    events.push(FrameEvent::ProtocolError(err));
                    break;
                }
            }
        }

        events
    }

    /// Parse a frame header from the front of `buf`
    ///
    /// Returns `Ok(None)` while the header is incomplete. Violations that are
    /// visible in the bytes already present are reported without waiting for
    /// the rest.
    pub fn parse_header(&self, buf: &[u8]) -> Result<Option<FrameHeader>> {
        if buf.len() < 2 {
            return Ok(None);
        }

        let b0 = buf[0];
        let b1 = buf[1];

        if b0 & 0x70 != 0 {
            return Err(Error::Protocol("reserved bits must be 0"));
        }

        let fin = b0 & 0x80 != 0;
        let opcode = OpCode::from_u8(b0 & 0x0F).ok_or(Error::Protocol("reserved opcode"))?;

        if opcode.is_control() && !fin {
            return Err(Error::Protocol("control frame must not be fragmented"));
        }

        let masked = b1 & 0x80 != 0;
        if !masked {
            return Err(Error::Protocol("client frames must be masked"));
        }

        let len_byte = b1 & 0x7F;
        if opcode.is_control() && len_byte as usize > MAX_CONTROL_PAYLOAD {
            return Err(Error::Protocol("control frame too large"));
        }

        let (payload_len, mut header_len) = match len_byte {
            126 => {
                if buf.len() < 4 {
                    return Ok(None);
                }
                let len = u16::from_be_bytes([buf[2], buf[3]]) as u64;
                if len < 126 {
                    return Err(Error::Protocol("payload length not minimal"));
                }
                (len, 4)
            }
            127 => {
                if buf.len() < 10 {
                    return Ok(None);
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&buf[2..10]);
                let len = u64::from_be_bytes(raw);
                if len >> 63 != 0 {
                    return Err(Error::Protocol("payload length MSB must be 0"));
                }
                if len <= 0xFFFF {
                    return Err(Error::Protocol("payload length not minimal"));
                }
                (len, 10)
            }
            small => (small as u64, 2),
        };

        if payload_len > self.max_frame_size as u64 {
            return Err(Error::FrameTooLarge);
        }

        let mask = if masked {
            if buf.len() < header_len + 4 {
                return Ok(None);
            }
            let key = [
                buf[header_len],
                buf[header_len + 1],
                buf[header_len + 2],
                buf[header_len + 3],
            ];
            header_len += 4;
            Some(key)
        } else {
            None
        };

        Ok(Some(FrameHeader {
            fin,
            opcode,
            masked,
            payload_len,
            mask,
            header_len,
        }))
    }

    fn step(&self, conn: &mut Connection) -> Result<Step> {
        let Some(header) = self.parse_header(&conn.recv_buf)? else {
            return Ok(Step::Wait);
        };

        // Bounded by max_frame_size, which is a usize
        let payload_len = header.payload_len as usize;
        self.check_message_size(conn, &header, payload_len)?;

        // The buffer grows only as payload bytes actually arrive
        let total = header
            .header_len
            .checked_add(payload_len)
            .ok_or(Error::FrameTooLarge)?;
        if conn.recv_buf.len() < total {
            return Ok(Step::Wait);
        }

        let mut frame = conn.recv_buf.split_to(total);
        frame.advance(header.header_len);
        if let Some(mask) = header.mask {
            apply_mask(&mut frame, mask);
        }
        let payload = frame.freeze();

        trace!(
            conn = %conn.id(),
            opcode = ?header.opcode,
            fin = header.fin,
            len = payload_len,
            "frame"
        );

        let event = match header.opcode {
            OpCode::Text | OpCode::Binary => self.handle_data(conn, &header, payload)?,
            OpCode::Continuation => self.handle_continuation(conn, &header, payload)?,
            OpCode::Close => Some(self.handle_close(conn, payload)?),
            OpCode::Ping | OpCode::Pong => {
                Some(FrameEvent::ControlReceived(header.opcode, payload))
            }
        };

        Ok(Step::Consumed(event))
    }

    /// Reject messages that would exceed the limit before buffering them
    fn check_message_size(
        &self,
        conn: &Connection,
        header: &FrameHeader,
        payload_len: usize,
    ) -> Result<()> {
        let total = match header.opcode {
            OpCode::Continuation => conn.fragment_buf.len().saturating_add(payload_len),
            OpCode::Text | OpCode::Binary => payload_len,
            _ => return Ok(()),
        };
        if total > self.max_message_size {
            return Err(Error::MessageTooLarge);
        }
        Ok(())
    }

    fn handle_data(
        &self,
        conn: &mut Connection,
        header: &FrameHeader,
        payload: Bytes,
    ) -> Result<Option<FrameEvent>> {
        if conn.fragment_opcode.is_some() {
            return Err(Error::Protocol("expected continuation frame"));
        }

        if header.fin {
            return finish_message(header.opcode, payload).map(Some);
        }

        conn.fragment_opcode = Some(header.opcode);
        conn.fragment_buf.clear();
        conn.fragment_buf.extend_from_slice(&payload);
        Ok(None)
    }

    fn handle_continuation(
        &self,
        conn: &mut Connection,
        header: &FrameHeader,
        payload: Bytes,
    ) -> Result<Option<FrameEvent>> {
        let opcode = conn
            .fragment_opcode
            .ok_or(Error::Protocol("unexpected continuation frame"))?;

        conn.fragment_buf.extend_from_slice(&payload);

        if !header.fin {
            return Ok(None);
        }

        conn.fragment_opcode = None;
        let data = conn.fragment_buf.split().freeze();
        finish_message(opcode, data).map(Some)
    }

    fn handle_close(&self, conn: &mut Connection, payload: Bytes) -> Result<FrameEvent> {
        let reason = parse_close_payload(&payload)?;
        let code = reason.as_ref().map_or(CloseReason::NO_STATUS, |r| r.code);
        conn.close_code.get_or_insert(code);

        match conn.state {
            ConnectionState::ClosingLocal => {
                debug!(conn = %conn.id(), "close acknowledged by peer");
            }
            _ => {
                conn.state = ConnectionState::ClosingRemote;
                // Echo the status code only
                let echo = if payload.len() >= 2 { &payload[..2] } else { &[][..] };
                conn.encoder().encode_into(&mut conn.outbound, OpCode::Close, echo)?;
                debug!(conn = %conn.id(), code, "close echoed");
            }
        }

        conn.discard_input();
        conn.state = ConnectionState::Closed;
        Ok(FrameEvent::ControlReceived(OpCode::Close, payload))
    }
}

fn finish_message(opcode: OpCode, payload: Bytes) -> Result<FrameEvent> {
    match opcode {
        OpCode::Text => {
            if std::str::from_utf8(&payload).is_err() {
                return Err(Error::InvalidUtf8);
            }
            Ok(FrameEvent::Message(Message::Text(payload)))
        }
        OpCode::Binary => Ok(FrameEvent::Message(Message::Binary(payload))),
        _ => Err(Error::Protocol("invalid message opcode")),
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::connection::ConnectionId;
    use crate::frame::{FrameEncoder, encode_frame};

    const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

    fn decoder() -> FrameDecoder {
        FrameDecoder::with_limits(16 * 1024 * 1024, 64 * 1024 * 1024)
    }

    fn open() -> Connection {
        let mut conn = Connection::new(ConnectionId(7));
        conn.complete_handshake().unwrap();
        conn
    }

    fn client_frame(opcode: OpCode, payload: &[u8], fin: bool) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(&mut buf, opcode, payload, fin, Some(MASK));
        buf
    }

    fn single_message(events: Vec<FrameEvent>) -> Message {
        assert_eq!(events.len(), 1, "expected one event, got {:?}", events);
        match events.into_iter().next() {
            Some(FrameEvent::Message(msg)) => msg,
            other => panic!("expected message, got {:?}", other),
        }
    }

    fn assert_protocol_error(events: &[FrameEvent]) {
        assert!(
            matches!(events.last(), Some(FrameEvent::ProtocolError(_))),
            "expected protocol error, got {:?}",
            events
        );
    }

    #[test]
    fn test_rfc_masked_hello() {
        let mut conn = open();
        let bytes = [
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ];
        let msg = single_message(decoder().feed(&mut conn, &bytes));
        assert_eq!(msg, Message::text("Hello"));
        assert_eq!(conn.recv_buffer_len(), 0);
    }

    #[test]
    fn test_round_trip_sizes() {
        let dec = decoder();
        for len in [0usize, 1, 125, 126, 65535, 65536, 5_000_000] {
            let payload: Vec<u8> = (0..len).map(|i| b'a' + (i % 26) as u8).collect();

            // Server encoding is unmasked; mask it the way a client would.
            let server = FrameEncoder::new().encode(OpCode::Text, &payload).unwrap();
            let header_len = server.len() - len;
            let mut wire = BytesMut::new();
            wire.extend_from_slice(&[server[0], server[1] | 0x80]);
            wire.extend_from_slice(&server[2..header_len]);
            wire.extend_from_slice(&MASK);
            let start = wire.len();
            wire.extend_from_slice(&payload);
            apply_mask(&mut wire[start..], MASK);

            let mut conn = open();
            let msg = single_message(dec.feed(&mut conn, &wire));
            assert_eq!(msg.opcode(), OpCode::Text, "len {}", len);
            assert_eq!(msg.as_bytes(), &payload[..], "len {}", len);
        }
    }

    #[test]
    fn test_one_byte_chunks() {
        let dec = decoder();
        let wire = client_frame(OpCode::Binary, &[0xAB; 300], true);

        let mut whole = open();
        let expected = single_message(dec.feed(&mut whole, &wire));

        let mut conn = open();
        let mut events = Vec::new();
        for byte in wire.iter() {
            events.extend(dec.feed(&mut conn, std::slice::from_ref(byte)));
        }
        assert_eq!(single_message(events), expected);
        assert_eq!(conn.recv_buffer_len(), 0);
    }

    #[test]
    fn test_header_split_is_not_an_error() {
        let dec = decoder();
        let mut conn = open();
        let wire = client_frame(OpCode::Text, b"split", true);

        assert!(dec.feed(&mut conn, &wire[..1]).is_empty());
        assert!(dec.feed(&mut conn, &wire[1..4]).is_empty());
        assert_eq!(conn.recv_buffer_len(), 4);
        let msg = single_message(dec.feed(&mut conn, &wire[4..]));
        assert_eq!(msg.as_text(), Some("split"));
    }

    #[test]
    fn test_many_frames_one_chunk() {
        let dec = decoder();
        let mut conn = open();
        let mut wire = client_frame(OpCode::Text, b"one", true);
        wire.extend_from_slice(&client_frame(OpCode::Ping, b"p", true));
        wire.extend_from_slice(&client_frame(OpCode::Text, b"two", true));
        let partial = client_frame(OpCode::Text, b"three", true);
        wire.extend_from_slice(&partial[..3]);

        let events = dec.feed(&mut conn, &wire);
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], FrameEvent::Message(m) if m.as_text() == Some("one")));
        assert!(matches!(&events[1], FrameEvent::ControlReceived(OpCode::Ping, p) if p.as_ref() == b"p"));
        assert!(matches!(&events[2], FrameEvent::Message(m) if m.as_text() == Some("two")));
        assert_eq!(conn.recv_buffer_len(), 3);

        let msg = single_message(dec.feed(&mut conn, &partial[3..]));
        assert_eq!(msg.as_text(), Some("three"));
    }

    #[test]
    fn test_fragmented_message() {
        let dec = decoder();
        let mut conn = open();

        assert!(dec.feed(&mut conn, &client_frame(OpCode::Text, b"Hel", false)).is_empty());
        assert!(conn.has_pending_fragment());
        assert!(
            dec.feed(&mut conn, &client_frame(OpCode::Continuation, b"lo ", false))
                .is_empty()
        );
        let msg = single_message(
            dec.feed(&mut conn, &client_frame(OpCode::Continuation, b"World", true)),
        );
        assert_eq!(msg, Message::text("Hello World"));
        assert!(!conn.has_pending_fragment());
    }

    #[test]
    fn test_control_between_fragments() {
        let dec = decoder();
        let mut conn = open();
        let mut wire = client_frame(OpCode::Binary, b"ab", false);
        wire.extend_from_slice(&client_frame(OpCode::Ping, b"", true));
        wire.extend_from_slice(&client_frame(OpCode::Continuation, b"cd", true));

        let events = dec.feed(&mut conn, &wire);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], FrameEvent::ControlReceived(OpCode::Ping, _)));
        assert!(matches!(&events[1], FrameEvent::Message(Message::Binary(b)) if b.as_ref() == b"abcd"));
    }

    #[test]
    fn test_continuation_without_start() {
        let mut conn = open();
        let events = decoder().feed(&mut conn, &client_frame(OpCode::Continuation, b"x", true));
        assert_protocol_error(&events);
        assert!(conn.is_closed());
        assert_eq!(conn.close_code(), Some(1002));
        assert_eq!(&conn.take_outbound()[..], &[0x88, 0x02, 0x03, 0xea]);
    }

    #[test]
    fn test_new_message_during_fragment() {
        let dec = decoder();
        let mut conn = open();
        dec.feed(&mut conn, &client_frame(OpCode::Text, b"a", false));
        let events = dec.feed(&mut conn, &client_frame(OpCode::Text, b"b", false));
        assert_protocol_error(&events);
        assert!(conn.is_closed());
    }

    #[test]
    fn test_control_length_126_rejected() {
        let mut conn = open();
        // Ping declaring a 16-bit extended length; rejected from the header alone
        let events = decoder().feed(&mut conn, &[0x89, 0xFE]);
        assert_protocol_error(&events);
        assert!(conn.is_closed());
    }

    #[test]
    fn test_fragmented_control_rejected() {
        let mut conn = open();
        let events = decoder().feed(&mut conn, &client_frame(OpCode::Ping, b"", false));
        assert_protocol_error(&events);
    }

    #[test]
    fn test_unmasked_rejected() {
        let mut conn = open();
        let events = decoder().feed(&mut conn, &[0x81, 0x02, b'h', b'i']);
        assert_protocol_error(&events);
    }

    #[test]
    fn test_reserved_bits_and_opcodes_rejected() {
        let dec = decoder();

        let mut conn = open();
        assert_protocol_error(&dec.feed(&mut conn, &[0xC1, 0x80]));

        for opcode in [0x3u8, 0x7, 0xB, 0xF] {
            let mut conn = open();
            assert_protocol_error(&dec.feed(&mut conn, &[0x80 | opcode, 0x80]));
        }
    }

    #[test]
    fn test_non_minimal_length_rejected() {
        let mut conn = open();
        let events = decoder().feed(&mut conn, &[0x82, 0xFE, 0x00, 0x05]);
        assert_protocol_error(&events);

        let mut conn = open();
        let mut wire = vec![0x82, 0xFF];
        wire.extend_from_slice(&100u64.to_be_bytes());
        assert_protocol_error(&decoder().feed(&mut conn, &wire));
    }

    #[test]
    fn test_length_msb_rejected() {
        let mut conn = open();
        let mut wire = vec![0x82, 0xFF];
        wire.extend_from_slice(&(1u64 << 63).to_be_bytes());
        let events = FrameDecoder::with_limits(usize::MAX, usize::MAX).feed(&mut conn, &wire);
        assert_protocol_error(&events);
    }

    #[test]
    fn test_oversized_frame() {
        let dec = FrameDecoder::with_limits(1024, 4096);
        let mut conn = open();
        // Header alone is enough to reject
        let wire = client_frame(OpCode::Binary, &[0u8; 2048], true);
        let events = dec.feed(&mut conn, &wire[..8]);
        match events.last() {
            Some(FrameEvent::ProtocolError(Error::FrameTooLarge)) => {}
            other => panic!("expected FrameTooLarge, got {:?}", other),
        }
        assert_eq!(conn.close_code(), Some(CloseReason::TOO_BIG));
    }

    fn header_only(declared: u64) -> Vec<u8> {
        let mut wire = vec![0x82, 0xFF];
        wire.extend_from_slice(&declared.to_be_bytes());
        wire.extend_from_slice(&MASK);
        wire
    }

    #[test]
    fn test_declared_length_does_not_allocate() {
        let mut conn = open();
        let declared = 16 * 1024 * 1024;
        let events = decoder().feed(&mut conn, &header_only(declared));
        assert!(events.is_empty());
        assert!(conn.is_open());
        assert_eq!(conn.recv_buffer_len(), 14);
        assert!(conn.recv_buf.capacity() < 64 * 1024, "capacity {}", conn.recv_buf.capacity());

        // Payload bytes still grow the buffer as they arrive
        assert!(decoder().feed(&mut conn, &[0u8; 4096]).is_empty());
        assert_eq!(conn.recv_buffer_len(), 14 + 4096);
        assert!(conn.recv_buf.capacity() < 1024 * 1024);
    }

    #[test]
    fn test_huge_declared_length_with_unlimited_config() {
        let mut conn = open();
        let dec = FrameDecoder::with_limits(usize::MAX, usize::MAX);
        let events = dec.feed(&mut conn, &header_only(1 << 62));
        assert!(events.is_empty());
        assert!(conn.recv_buf.capacity() < 64 * 1024);
    }

    #[test]
    fn test_oversized_reassembled_message() {
        let dec = FrameDecoder::with_limits(1024, 1500);
        let mut conn = open();
        assert!(dec.feed(&mut conn, &client_frame(OpCode::Binary, &[1; 1000], false)).is_empty());
        let events = dec.feed(&mut conn, &client_frame(OpCode::Continuation, &[2; 1000], true));
        match events.last() {
            Some(FrameEvent::ProtocolError(Error::MessageTooLarge)) => {}
            other => panic!("expected MessageTooLarge, got {:?}", other),
        }
        assert_eq!(conn.close_code(), Some(1009));
    }

    #[test]
    fn test_invalid_utf8_text() {
        let mut conn = open();
        let events = decoder().feed(&mut conn, &client_frame(OpCode::Text, &[0xff, 0xfe], true));
        assert!(matches!(events.last(), Some(FrameEvent::ProtocolError(Error::InvalidUtf8))));
        assert_eq!(conn.close_code(), Some(1007));

        // Binary payloads are opaque
        let mut conn = open();
        let msg = single_message(
            decoder().feed(&mut conn, &client_frame(OpCode::Binary, &[0xff, 0xfe], true)),
        );
        assert_eq!(msg.as_bytes(), &[0xff, 0xfe]);
    }

    #[test]
    fn test_unsolicited_close_echoed_once() {
        let mut conn = open();
        let payload = crate::frame::close_payload(1000, "done");
        let events = decoder().feed(&mut conn, &client_frame(OpCode::Close, &payload, true));

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], FrameEvent::ControlReceived(OpCode::Close, p) if p == &payload));
        assert!(conn.is_closed());
        assert_eq!(conn.close_code(), Some(1000));

        let out = conn.take_outbound();
        assert_eq!(&out[..], &[0x88, 0x02, 0x03, 0xe8]);
    }

    #[test]
    fn test_close_after_local_close() {
        let mut conn = open();
        conn.close(1001, "").unwrap();
        let sent = conn.take_outbound();
        assert_eq!(sent[0], 0x88);

        let payload = crate::frame::close_payload(1001, "");
        let events = decoder().feed(&mut conn, &client_frame(OpCode::Close, &payload, true));
        assert_eq!(events.len(), 1);
        assert!(conn.is_closed());
        assert!(!conn.has_outbound());
    }

    #[test]
    fn test_empty_close_echoes_empty() {
        let mut conn = open();
        decoder().feed(&mut conn, &client_frame(OpCode::Close, b"", true));
        assert_eq!(&conn.take_outbound()[..], &[0x88, 0x00]);
        assert_eq!(conn.close_code(), Some(CloseReason::NO_STATUS));
    }

    #[test]
    fn test_bytes_after_close_are_dropped() {
        let dec = decoder();
        let mut conn = open();
        let mut wire = client_frame(OpCode::Close, b"", true);
        wire.extend_from_slice(&client_frame(OpCode::Text, b"late", true));

        let events = dec.feed(&mut conn, &wire);
        assert_eq!(events.len(), 1);
        assert_eq!(conn.recv_buffer_len(), 0);
        assert!(dec.feed(&mut conn, b"more").is_empty());
    }

    #[test]
    fn test_invalid_close_payloads() {
        let dec = decoder();

        let mut conn = open();
        assert_protocol_error(&dec.feed(&mut conn, &client_frame(OpCode::Close, &[0x03], true)));

        let mut conn = open();
        let events = dec.feed(&mut conn, &client_frame(OpCode::Close, &1006u16.to_be_bytes(), true));
        assert_protocol_error(&events);
        assert_eq!(conn.close_code(), Some(1002));
    }

    #[test]
    fn test_handshaking_connection_ignores_bytes() {
        let mut conn = Connection::new(ConnectionId(1));
        let events = decoder().feed(&mut conn, &client_frame(OpCode::Text, b"x", true));
        assert!(events.is_empty());
        assert_eq!(conn.recv_buffer_len(), 0);
    }

    #[test]
    fn test_data_while_closing_local() {
        let mut conn = open();
        conn.close(1000, "").unwrap();
        let msg = single_message(decoder().feed(&mut conn, &client_frame(OpCode::Text, b"in flight", true)));
        assert_eq!(msg.as_text(), Some("in flight"));
    }
}
