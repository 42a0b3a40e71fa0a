//! Pinned wire vectors: exact bytes in, exact bytes out.

use retrocon_ws_protocol::{
    accept_token, decode_frame, encode_text_frame, upgrade_response, Opcode,
};

#[test]
fn rfc6455_handshake_vector() {
    assert_eq!(
        accept_token("dGhlIHNhbXBsZSBub25jZQ=="),
        "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
    );
}

#[test]
fn upgrade_response_wire_bytes() {
    assert_eq!(
        upgrade_response("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="),
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    );
}

#[test]
fn known_masked_frame_decodes() {
    // "Hello" masked with 37 fa 21 3d, as in RFC 6455 §5.7.
    let wire = [
        0x81u8, 0x85, 0x37, 0xFA, 0x21, 0x3D, 0x7F, 0x9F, 0x4D, 0x51, 0x58,
    ];
    let frame = decode_frame(&wire).unwrap().unwrap();
    assert_eq!(frame.opcode, Opcode::Text);
    assert_eq!(frame.payload, b"Hello");
    assert_eq!(frame.consumed, wire.len());
}

#[test]
fn server_text_frame_wire_bytes() {
    assert_eq!(
        encode_text_frame(b"Hello").unwrap(),
        [0x81, 0x05, b'H', b'e', b'l', b'l', b'o']
    );
}
