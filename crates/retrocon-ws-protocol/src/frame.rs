//! WebSocket frame codec (RFC 6455 §5, unextended and unfragmented).
//!
//! Decode never assumes the caller has a complete frame: `Ok(None)`
//! means "wait for more transport bytes, keep the buffer". Anything the
//! gateway does not support — fragmentation, 64-bit payload lengths,
//! unmasked client frames — is a hard [`DecodeError`] and the caller
//! must close the connection rather than resynchronize mid-stream.

/// Largest payload the server-side encoder will place in one frame.
///
/// The send path never uses extended lengths; callers feed at most this
/// many bytes per [`encode_text_frame`] call.
pub const MAX_TEXT_FRAME_PAYLOAD: usize = 125;

const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;
const OPCODE_MASK: u8 = 0x0F;
const LEN7_MASK: u8 = 0x7F;
const LEN16_MARKER: u8 = 126;
const LEN64_MARKER: u8 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    /// Reserved opcode values are carried through and ignored upstream.
    Reserved(u8),
}

impl Opcode {
    pub fn from_bits(bits: u8) -> Self {
        match bits & OPCODE_MASK {
            0x0 => Opcode::Continuation,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            other => Opcode::Reserved(other),
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
            Opcode::Reserved(bits) => bits & OPCODE_MASK,
        }
    }
}

/// One complete frame lifted off the receive buffer.
///
/// `consumed` is the total wire size (header + mask + payload); the
/// caller drops that many bytes from the front of its buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub opcode: Opcode,
    pub payload: Vec<u8>,
    pub consumed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Client frames must carry the mask bit per RFC 6455 §5.1.
    UnmaskedClientFrame,
    /// 64-bit extended payload lengths are not supported.
    UnsupportedExtendedLength,
    /// `fin == false`: fragmentation is not supported.
    FragmentedFrame,
}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DecodeError::UnmaskedClientFrame => write!(f, "client frame is not masked"),
            DecodeError::UnsupportedExtendedLength => {
                write!(f, "64-bit extended payload length is not supported")
            }
            DecodeError::FragmentedFrame => write!(f, "fragmented frame (fin clear)"),
        }
    }
}

impl std::error::Error for DecodeError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    PayloadTooLarge { len: usize, max: usize },
}

impl core::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EncodeError::PayloadTooLarge { len, max } => {
                write!(f, "payload too large for one frame: {len} > {max}")
            }
        }
    }
}

impl std::error::Error for EncodeError {}

/// Attempt to decode one client frame from the front of `buf`.
///
/// Returns `Ok(None)` while the buffer does not yet hold the complete
/// header plus payload; the caller must keep the buffer intact and
/// retry after the next transport delivery.
pub fn decode_frame(buf: &[u8]) -> Result<Option<DecodedFrame>, DecodeError> {
    if buf.len() < 2 {
        return Ok(None);
    }

    let fin = buf[0] & FIN_BIT != 0;
    let opcode = Opcode::from_bits(buf[0]);
    let masked = buf[1] & MASK_BIT != 0;

    if !masked {
        return Err(DecodeError::UnmaskedClientFrame);
    }

    let len7 = buf[1] & LEN7_MASK;
    let (payload_len, mut header_len) = match len7 {
        LEN64_MARKER => return Err(DecodeError::UnsupportedExtendedLength),
        LEN16_MARKER => {
            if buf.len() < 4 {
                return Ok(None);
            }
            (u16::from_be_bytes([buf[2], buf[3]]) as usize, 4usize)
        }
        n => (n as usize, 2usize),
    };

    if buf.len() < header_len + 4 {
        return Ok(None);
    }
    let mask: [u8; 4] = [
        buf[header_len],
        buf[header_len + 1],
        buf[header_len + 2],
        buf[header_len + 3],
    ];
    header_len += 4;

    if buf.len() < header_len + payload_len {
        return Ok(None);
    }

    if !fin {
        return Err(DecodeError::FragmentedFrame);
    }

    let payload = buf[header_len..header_len + payload_len]
        .iter()
        .enumerate()
        .map(|(i, b)| b ^ mask[i % 4])
        .collect();

    Ok(Some(DecodedFrame {
        opcode,
        payload,
        consumed: header_len + payload_len,
    }))
}

/// Encode a server→client text frame: fin set, unmasked, 7-bit length.
pub fn encode_text_frame(payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
    if payload.len() > MAX_TEXT_FRAME_PAYLOAD {
        return Err(EncodeError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_TEXT_FRAME_PAYLOAD,
        });
    }

    let mut out = Vec::with_capacity(2 + payload.len());
    out.push(FIN_BIT | Opcode::Text.bits());
    out.push(payload.len() as u8);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Encode a client→server masked frame (7-bit or 16-bit length).
///
/// The production gateway only decodes these; the encoder exists for
/// test clients exercising the server end to end.
pub fn encode_masked_frame(opcode: Opcode, mask: [u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.push(FIN_BIT | opcode.bits());

    if payload.len() <= 125 {
        out.push(MASK_BIT | payload.len() as u8);
    } else {
        out.push(MASK_BIT | LEN16_MARKER);
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    }

    out.extend_from_slice(&mask);
    out.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
    out
}
