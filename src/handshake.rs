//! WebSocket upgrade handshake
//!
//! Parses the client's HTTP/1.1 upgrade request, validates it, and builds
//! either the `101 Switching Protocols` response or a `400 Bad Request`
//! rejection. No subprotocol or extension negotiation is performed.

use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};
use sha1::{Digest, Sha1};

use crate::WS_GUID;
use crate::error::{Error, Result};

/// Default limit on the size of an upgrade request head
pub const MAX_HEADER_SIZE: usize = 8192;

/// Maximum number of request headers parsed
const MAX_HEADERS: usize = 64;

/// Response sent when an upgrade request is rejected
const BAD_REQUEST: &[u8] =
    b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";

/// WebSocket upgrade request
#[derive(Debug)]
pub struct HandshakeRequest<'a> {
    /// The request path
    pub path: &'a str,
    /// The Host header
    pub host: Option<&'a str>,
    /// The Upgrade header
    pub upgrade: Option<&'a str>,
    /// The Connection header
    pub connection: Option<&'a str>,
    /// The Sec-WebSocket-Key header
    pub key: Option<&'a str>,
    /// The Sec-WebSocket-Version header
    pub version: Option<&'a str>,
    /// The Origin header
    pub origin: Option<&'a str>,
}

impl<'a> HandshakeRequest<'a> {
    /// Collect the headers relevant to the upgrade
    ///
    /// Header names are matched case-insensitively; for repeated headers the
    /// first occurrence wins.
    pub fn from_headers<I>(path: &'a str, headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut req = HandshakeRequest {
            path,
            host: None,
            upgrade: None,
            connection: None,
            key: None,
            version: None,
            origin: None,
        };

        for (name, value) in headers {
            let slot = if name.eq_ignore_ascii_case("host") {
                &mut req.host
            } else if name.eq_ignore_ascii_case("upgrade") {
                &mut req.upgrade
            } else if name.eq_ignore_ascii_case("connection") {
                &mut req.connection
            } else if name.eq_ignore_ascii_case("sec-websocket-key") {
                &mut req.key
            } else if name.eq_ignore_ascii_case("sec-websocket-version") {
                &mut req.version
            } else if name.eq_ignore_ascii_case("origin") {
                &mut req.origin
            } else {
                continue;
            };
            slot.get_or_insert(value.trim());
        }

        req
    }
}

/// Successful negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The computed Sec-WebSocket-Accept value
    pub accept_key: String,
    /// The complete `101 Switching Protocols` response
    pub response: Bytes,
}

/// Parse an HTTP/1.1 upgrade request
///
/// Returns the parsed request and the number of bytes it occupied, or
/// `Ok(None)` while the request head is still incomplete.
pub fn parse_request(buf: &[u8]) -> Result<Option<(HandshakeRequest<'_>, usize)>> {
    parse_request_with_limit(buf, MAX_HEADER_SIZE)
}

/// Parse an HTTP/1.1 upgrade request with an explicit size limit
pub fn parse_request_with_limit(
    buf: &[u8],
    max_size: usize,
) -> Result<Option<(HandshakeRequest<'_>, usize)>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    match req.parse(buf) {
        Ok(httparse::Status::Complete(len)) => {
            if len > max_size {
                return Err(Error::InvalidHttp("request too large"));
            }
            if req.method != Some("GET") {
                return Err(Error::InvalidHttp("method must be GET"));
            }

            let mut fields = Vec::with_capacity(req.headers.len());
            for header in req.headers.iter() {
                let value = std::str::from_utf8(header.value)
                    .map_err(|_| Error::InvalidHttp("invalid header value"))?;
                fields.push((header.name, value));
            }

            let path = req.path.unwrap_or("/");
            Ok(Some((HandshakeRequest::from_headers(path, fields), len)))
        }
        Ok(httparse::Status::Partial) => {
            if buf.len() > max_size {
                return Err(Error::InvalidHttp("request too large"));
            }
            Ok(None)
        }
        Err(httparse::Error::TooManyHeaders) => Err(Error::InvalidHttp("too many headers")),
        Err(_) => Err(Error::InvalidHttp("failed to parse HTTP request")),
    }
}

/// Validate an upgrade request and build the switching-protocols response
///
/// Fails with [`Error::Handshake`] if `Upgrade` is not `websocket`
/// (case-insensitive), if `Sec-WebSocket-Key` is missing or not the base64
/// encoding of 16 bytes, or if a `Sec-WebSocket-Version` other than 13 is
/// announced.
pub fn negotiate(req: &HandshakeRequest<'_>) -> Result<HandshakeResponse> {
    let upgrade = req
        .upgrade
        .ok_or(Error::Handshake("missing Upgrade header"))?;
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(Error::Handshake("Upgrade header is not websocket"));
    }

    let key = req
        .key
        .ok_or(Error::Handshake("missing Sec-WebSocket-Key"))?;
    if !is_valid_key(key) {
        return Err(Error::Handshake("Sec-WebSocket-Key is not 16 bytes of base64"));
    }

    if let Some(version) = req.version {
        if version != "13" {
            return Err(Error::Handshake("unsupported WebSocket version"));
        }
    }

    let accept_key = generate_accept_key(key);
    let response = build_response(&accept_key);
    Ok(HandshakeResponse {
        accept_key,
        response,
    })
}

/// Check that a client key decodes to exactly 16 bytes
pub fn is_valid_key(key: &str) -> bool {
    matches!(
        base64::engine::general_purpose::STANDARD.decode(key),
        Ok(bytes) if bytes.len() == 16
    )
}

/// Generate the Sec-WebSocket-Accept key
///
/// This computes: Base64(SHA-1(key + GUID))
#[inline]
pub fn generate_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(hash)
}

/// Build a WebSocket upgrade response
pub fn build_response(accept_key: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(160);

    buf.put_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
    buf.put_slice(b"Upgrade: websocket\r\n");
    buf.put_slice(b"Connection: Upgrade\r\n");
    buf.put_slice(b"Sec-WebSocket-Accept: ");
    buf.put_slice(accept_key.as_bytes());
    buf.put_slice(b"\r\n\r\n");

    buf.freeze()
}

/// Build the response for a rejected upgrade
pub fn build_rejection() -> Bytes {
    Bytes::from_static(BAD_REQUEST)
}
