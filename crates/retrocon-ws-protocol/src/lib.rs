#![forbid(unsafe_code)]

//! WebSocket wire layer for the retrocon console gateway.
//!
//! Implements the subset of RFC 6455 the gateway speaks: the opening
//! handshake (SHA-1 + base64 accept token, no crypto crates) and
//! unextended, unfragmented framing with 7-bit and 16-bit payload
//! lengths. 64-bit lengths, fragmentation, and extensions are rejected
//! as protocol violations.
//!
//! Everything here is pure: callers own the buffers and the transport.

pub mod base64;
pub mod frame;
pub mod handshake;
pub mod sha1;

pub use frame::{
    decode_frame, encode_masked_frame, encode_text_frame, DecodeError, DecodedFrame, EncodeError,
    Opcode, MAX_TEXT_FRAME_PAYLOAD,
};
pub use handshake::{
    accept_token, extract_websocket_key, find_header_end, upgrade_response, HandshakeError,
    WEBSOCKET_GUID,
};
