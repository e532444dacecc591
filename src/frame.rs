//! WebSocket frame model and serialization
//!
//! This module holds the RFC 6455 frame vocabulary shared by the decoder and
//! encoder:
//! - [`OpCode`] and [`FrameHeader`]
//! - [`Message`], the application-level unit after reassembly
//! - [`FrameEncoder`], the server-side (unmasked, unfragmented) serializer
//! - [`encode_frame`], the low-level writer that can also produce masked
//!   client frames

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CloseReason, Error, Result};
use crate::mask::apply_mask;
use crate::{
    MAX_CONTROL_PAYLOAD, MAX_FRAME_HEADER_SIZE, MEDIUM_MESSAGE_THRESHOLD, SMALL_MESSAGE_THRESHOLD,
};

/// WebSocket opcode
///
/// Values 0x3-0x7 and 0xB-0xF are reserved; [`OpCode::from_u8`] returns
/// `None` for them and the decoder treats them as a protocol error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Continuation frame
    Continuation = 0x0,
    /// Text frame
    Text = 0x1,
    /// Binary frame
    Binary = 0x2,
    /// Connection close
    Close = 0x8,
    /// Ping
    Ping = 0x9,
    /// Pong
    Pong = 0xA,
}

impl OpCode {
    /// Parse opcode from the low nibble of the first header byte
    #[inline]
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(OpCode::Continuation),
            0x1 => Some(OpCode::Text),
            0x2 => Some(OpCode::Binary),
            0x8 => Some(OpCode::Close),
            0x9 => Some(OpCode::Ping),
            0xA => Some(OpCode::Pong),
            _ => None,
        }
    }

    /// Check if this is a control frame
    #[inline]
    pub fn is_control(&self) -> bool {
        (*self as u8) >= 0x8
    }

    /// Check if this is a data frame (including continuation)
    #[inline]
    pub fn is_data(&self) -> bool {
        (*self as u8) <= 0x2
    }
}

/// A parsed WebSocket frame header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment flag
    pub fin: bool,
    /// Frame opcode
    pub opcode: OpCode,
    /// Mask flag (must be true for client->server)
    pub masked: bool,
    /// Payload length
    pub payload_len: u64,
    /// Masking key (if masked)
    pub mask: Option<[u8; 4]>,
    /// Number of bytes the header occupies on the wire
    pub header_len: usize,
}

impl FrameHeader {
    /// Total wire size of header plus payload
    #[inline]
    pub fn frame_len(&self) -> u64 {
        self.header_len as u64 + self.payload_len
    }
}

/// Wire size of a header for a payload of `payload_len` bytes
#[inline]
pub fn header_size(payload_len: usize, masked: bool) -> usize {
    let ext = if payload_len > MEDIUM_MESSAGE_THRESHOLD {
        8
    } else if payload_len > SMALL_MESSAGE_THRESHOLD {
        2
    } else {
        0
    };
    2 + ext + if masked { 4 } else { 0 }
}

/// WebSocket data message, assembled from one or more frames
///
/// Text payloads are UTF-8 validated by the decoder before a `Message::Text`
/// is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Text message
    Text(Bytes),
    /// Binary message
    Binary(Bytes),
}

impl Message {
    /// Create a text message from a string
    #[inline]
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(Bytes::from(s.into()))
    }

    /// Create a binary message
    #[inline]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Message::Binary(data.into())
    }

    /// Opcode of the frame that initiated this message
    #[inline]
    pub fn opcode(&self) -> OpCode {
        match self {
            Message::Text(_) => OpCode::Text,
            Message::Binary(_) => OpCode::Binary,
        }
    }

    /// Check if this is a text message
    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self, Message::Text(_))
    }

    /// Get message as text (returns None for binary messages)
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(b) => std::str::from_utf8(b).ok(),
            Message::Binary(_) => None,
        }
    }

    /// Get message payload
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Text(b) | Message::Binary(b) => b,
        }
    }

    /// Convert into the payload
    pub fn into_bytes(self) -> Bytes {
        match self {
            Message::Text(b) | Message::Binary(b) => b,
        }
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::Text(Bytes::from(s))
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message::Text(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<Vec<u8>> for Message {
    fn from(v: Vec<u8>) -> Self {
        Message::Binary(Bytes::from(v))
    }
}

impl From<Bytes> for Message {
    fn from(b: Bytes) -> Self {
        Message::Binary(b)
    }
}

/// Build a close frame payload: 2-byte big-endian code followed by the reason
pub fn close_payload(code: u16, reason: &str) -> Bytes {
    let mut payload = BytesMut::with_capacity(2 + reason.len());
    payload.put_u16(code);
    payload.put_slice(reason.as_bytes());
    payload.freeze()
}

/// Parse a close frame payload
///
/// An empty payload carries no status. Returns an error for a 1-byte payload,
/// a code that may not appear on the wire, or a reason that is not UTF-8.
pub fn parse_close_payload(payload: &[u8]) -> Result<Option<CloseReason>> {
    match payload.len() {
        0 => Ok(None),
        1 => Err(Error::Protocol("close payload must be empty or at least 2 bytes")),
        _ => {
            let code = u16::from_be_bytes([payload[0], payload[1]]);
            if !CloseReason::is_valid_code(code) {
                return Err(Error::InvalidCloseCode(code));
            }
            let reason = std::str::from_utf8(&payload[2..]).map_err(|_| Error::InvalidUtf8)?;
            Ok(Some(CloseReason::new(code, reason)))
        }
    }
}

/// Encode a frame into a buffer
///
/// When `mask` is given the payload is copied and masked (client frames).
/// Server frames pass `None`.
#[inline]
pub fn encode_frame(
    buf: &mut BytesMut,
    opcode: OpCode,
    payload: &[u8],
    fin: bool,
    mask: Option<[u8; 4]>,
) {
    let payload_len = payload.len();
    buf.reserve(header_size(payload_len, mask.is_some()) + payload_len);

    let mut b0 = opcode as u8;
    if fin {
        b0 |= 0x80;
    }
    buf.put_u8(b0);

    let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
    if payload_len <= SMALL_MESSAGE_THRESHOLD {
        buf.put_u8(mask_bit | payload_len as u8);
    } else if payload_len <= MEDIUM_MESSAGE_THRESHOLD {
        buf.put_u8(mask_bit | 126);
        buf.put_u16(payload_len as u16);
    } else {
        buf.put_u8(mask_bit | 127);
        buf.put_u64(payload_len as u64);
    }

    if let Some(m) = mask {
        buf.put_slice(&m);
        let start = buf.len();
        buf.put_slice(payload);
        apply_mask(&mut buf[start..], m);
    } else {
        buf.put_slice(payload);
    }
}

/// Server-side frame serializer
///
/// Every frame it produces is a single, complete, unmasked frame with FIN
/// set. Control payloads longer than 125 bytes and the continuation opcode
/// are refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameEncoder;

impl FrameEncoder {
    /// Create an encoder
    pub fn new() -> Self {
        FrameEncoder
    }

    /// Encode one frame into a fresh buffer
    pub fn encode(&self, opcode: OpCode, payload: &[u8]) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(MAX_FRAME_HEADER_SIZE + payload.len());
        self.encode_into(&mut buf, opcode, payload)?;
        Ok(buf.freeze())
    }

    /// Append one frame to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut, opcode: OpCode, payload: &[u8]) -> Result<()> {
        if opcode == OpCode::Continuation {
            return Err(Error::Protocol("server frames are never fragmented"));
        }
        if opcode.is_control() && payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(Error::Protocol("control frame payload exceeds 125 bytes"));
        }
        encode_frame(buf, opcode, payload, true, None);
        Ok(())
    }

    /// Encode a data message
    pub fn encode_message(&self, msg: &Message) -> Result<Bytes> {
        self.encode(msg.opcode(), msg.as_bytes())
    }

    /// Append a close frame carrying `code` and `reason`
    pub fn encode_close(&self, buf: &mut BytesMut, code: u16, reason: &str) -> Result<()> {
        self.encode_into(buf, OpCode::Close, &close_payload(code, reason))
    }
}
