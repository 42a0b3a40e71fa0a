//! RFC 6455 opening handshake, server side.
//!
//! The caller buffers raw bytes from the start of the connection and
//! asks [`find_header_end`] whether the HTTP header block is complete
//! yet. Once it is, [`extract_websocket_key`] + [`accept_token`] +
//! [`upgrade_response`] produce the 101 response. Bytes after the blank
//! line belong to frame processing and are never touched here.

use crate::base64;
use crate::sha1::sha1;

/// Fixed GUID appended to the client key before hashing (RFC 6455 §1.3).
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const KEY_HEADER: &str = "Sec-WebSocket-Key:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// No `Sec-WebSocket-Key` header line in the request block.
    MissingKeyHeader,
    /// The key header was present but its value was empty.
    EmptyKey,
}

impl core::fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HandshakeError::MissingKeyHeader => write!(f, "missing Sec-WebSocket-Key header"),
            HandshakeError::EmptyKey => write!(f, "empty Sec-WebSocket-Key value"),
        }
    }
}

impl std::error::Error for HandshakeError {}

/// Find the end of the HTTP header block (`\r\n\r\n`).
///
/// Returns the index one past the terminator, i.e. the number of bytes
/// the handshake consumes. `None` means the block is still incomplete
/// and the caller should wait for more data (subject to its own buffer
/// capacity limit).
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Extract the client nonce from a buffered request block.
///
/// Header-name matching is case-insensitive and anchored at the start
/// of a line; leading whitespace in the value is trimmed.
pub fn extract_websocket_key(request: &[u8]) -> Result<String, HandshakeError> {
    for line in request.split(|&b| b == b'\n') {
        let line = match line.strip_suffix(b"\r") {
            Some(stripped) => stripped,
            None => line,
        };
        if line.len() <= KEY_HEADER.len() {
            continue;
        }

        let (name, value) = line.split_at(KEY_HEADER.len());
        if !name.eq_ignore_ascii_case(KEY_HEADER.as_bytes()) {
            continue;
        }

        let value = String::from_utf8_lossy(value);
        let value = value.trim_start_matches([' ', '\t']).trim_end();
        if value.is_empty() {
            return Err(HandshakeError::EmptyKey);
        }
        return Ok(value.to_string());
    }

    Err(HandshakeError::MissingKeyHeader)
}

/// Derive `Sec-WebSocket-Accept` from the client key.
pub fn accept_token(client_key: &str) -> String {
    let mut combined = String::with_capacity(client_key.len() + WEBSOCKET_GUID.len());
    combined.push_str(client_key);
    combined.push_str(WEBSOCKET_GUID);
    base64::encode(&sha1(combined.as_bytes()))
}

/// Render the fixed 101 upgrade response for `token`.
pub fn upgrade_response(token: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {token}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_REQUEST: &[u8] = b"GET /console HTTP/1.1\r\n\
        Host: 192.168.0.10:8082\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\
        \r\n";

    #[test]
    fn rfc6455_accept_vector() {
        // §1.3 of the RFC pins this exact derivation.
        assert_eq!(
            accept_token("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn header_end_detection() {
        assert_eq!(find_header_end(b""), None);
        assert_eq!(find_header_end(b"GET / HTTP/1.1\r\n"), None);
        assert_eq!(find_header_end(SAMPLE_REQUEST), Some(SAMPLE_REQUEST.len()));

        let mut with_trailer = SAMPLE_REQUEST.to_vec();
        with_trailer.extend_from_slice(&[0x81, 0x80]);
        assert_eq!(find_header_end(&with_trailer), Some(SAMPLE_REQUEST.len()));
    }

    #[test]
    fn extracts_key_case_insensitively() {
        assert_eq!(
            extract_websocket_key(SAMPLE_REQUEST).unwrap(),
            "dGhlIHNhbXBsZSBub25jZQ=="
        );

        let lower = SAMPLE_REQUEST
            .to_vec()
            .iter()
            .map(|b| b.to_ascii_lowercase())
            .collect::<Vec<_>>();
        assert_eq!(
            extract_websocket_key(&lower).unwrap(),
            "dghlihnhbxbszsbub25jzq=="
        );
    }

    #[test]
    fn trims_leading_whitespace_in_value() {
        let request = b"GET / HTTP/1.1\r\nSec-WebSocket-Key: \t  abc123==\r\n\r\n";
        assert_eq!(extract_websocket_key(request).unwrap(), "abc123==");
    }

    #[test]
    fn missing_or_empty_key_is_an_error() {
        let request = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        assert_eq!(
            extract_websocket_key(request),
            Err(HandshakeError::MissingKeyHeader)
        );

        let request = b"GET / HTTP/1.1\r\nSec-WebSocket-Key:   \r\n\r\n";
        assert_eq!(extract_websocket_key(request), Err(HandshakeError::EmptyKey));
    }

    #[test]
    fn upgrade_response_contains_token_and_terminator() {
        let response = upgrade_response("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(response.ends_with("\r\n\r\n"));
    }
}
