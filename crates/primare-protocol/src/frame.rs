//! Primare RS232 framing
//!
//! # Frame Format
//! ```text
//! request:  STX CMD VARIABLE [OPERAND...] DLE ETX
//! reply:    STX VARIABLE [DATA...] DLE ETX
//! ```
//!
//! - `STX` (0x02): start of frame
//! - `CMD`: `W` (0x57) for write, `R` (0x52) for read; absent in replies
//! - `DLE ETX` (0x10 0x03): terminator
//!
//! Any `0x10` between `STX` and the terminator is sent twice. The terminator
//! is therefore only a `DLE` that is immediately followed by `ETX` and is not
//! the second half of a doubled `DLE`.

use crate::error::FrameError;

/// Start of frame
pub const STX: u8 = 0x02;
/// End of frame (follows `DLE`)
pub const ETX: u8 = 0x03;
/// Escape byte; doubled inside a frame, `DLE ETX` terminates it
pub const DLE: u8 = 0x10;

/// Shortest possible frame: `STX VAR DLE ETX`
pub const MIN_FRAME_LEN: usize = 4;

/// Raw bytes scanned without a terminator before the frame is dropped
pub const MAX_FRAME_LEN: usize = 64;

/// Request direction byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CommandType {
    /// `W`, change a variable
    Write,
    /// `R`, read a variable
    Read,
}

impl CommandType {
    /// Wire byte for this command type
    pub fn byte(self) -> u8 {
        match self {
            CommandType::Write => b'W',
            CommandType::Read => b'R',
        }
    }

    /// Parse a wire byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'W' => Some(CommandType::Write),
            b'R' => Some(CommandType::Read),
            _ => None,
        }
    }
}

/// A decoded frame with escaping already removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// First byte after `STX`
    pub variable: u8,
    /// Remaining bytes before the terminator
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame
    pub fn new(variable: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            variable,
            payload: payload.into(),
        }
    }

    /// First data byte, used by single-value replies (volume, mute, ...)
    pub fn value(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    /// Payload interpreted as text, as sent for names and versions
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload)
            .trim_matches(|c: char| c == '\0' || c.is_whitespace())
            .to_string()
    }

    /// Interpret the frame as a request sent to the amplifier
    ///
    /// Requests carry the command type where replies carry the variable, so
    /// the variable byte of a request frame is the first payload byte.
    pub fn as_request(&self) -> Option<Request> {
        let command_type = CommandType::from_byte(self.variable)?;
        let (&variable, operand) = self.payload.split_first()?;
        Some(Request {
            command_type,
            variable,
            operand: operand.to_vec(),
        })
    }
}

/// A request frame as seen by the amplifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Read or write
    pub command_type: CommandType,
    /// Target variable
    pub variable: u8,
    /// Operand bytes (usually zero or one)
    pub operand: Vec<u8>,
}

/// Append `body` to `out`, doubling every `DLE`
pub fn escape_into(body: &[u8], out: &mut Vec<u8>) {
    for &byte in body {
        out.push(byte);
        if byte == DLE {
            out.push(DLE);
        }
    }
}

fn terminate(mut frame: Vec<u8>) -> Vec<u8> {
    frame.push(DLE);
    frame.push(ETX);
    frame
}

/// Encode a request: `STX CMD body DLE ETX`
pub fn encode_request(command_type: CommandType, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(body.len() * 2 + 4);
    frame.push(STX);
    frame.push(command_type.byte());
    escape_into(body, &mut frame);
    terminate(frame)
}

/// Encode a reply: `STX VARIABLE data DLE ETX`
pub fn encode_reply(variable: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(data.len() * 2 + 5);
    frame.push(STX);
    escape_into(&[variable], &mut frame);
    escape_into(data, &mut frame);
    terminate(frame)
}

/// Result of one decode attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame together with the raw bytes it was decoded from
    Frame { frame: Frame, raw: Vec<u8> },
    /// More bytes are needed
    Incomplete,
    /// Garbage was discarded; decoding can continue
    Malformed(FrameError),
}

/// Streaming frame decoder
///
/// Owns the accumulation buffer; bytes are pushed as they arrive and frames
/// are pulled out one at a time.
#[derive(Debug, Default)]
pub struct FrameCodec {
    buffer: Vec<u8>,
}

impl FrameCodec {
    /// Create an empty codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_FRAME_LEN),
        }
    }

    /// Push raw bytes into the buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of bytes waiting to be decoded
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Try to decode one frame from the front of the buffer
    pub fn decode(&mut self) -> Decoded {
        if self.buffer.is_empty() {
            return Decoded::Incomplete;
        }

        if self.buffer[0] != STX {
            let discarded = self
                .buffer
                .iter()
                .position(|&b| b == STX)
                .unwrap_or(self.buffer.len());
            self.buffer.drain(..discarded);
            return Decoded::Malformed(FrameError::MissingStx { discarded });
        }

        let mut body = Vec::new();
        let mut i = 1;
        while i < self.buffer.len() {
            if i >= MAX_FRAME_LEN {
                self.resync();
                return Decoded::Malformed(FrameError::Oversized { len: i });
            }

            let byte = self.buffer[i];
            if byte != DLE {
                body.push(byte);
                i += 1;
                continue;
            }

            let Some(&next) = self.buffer.get(i + 1) else {
                // Lone DLE at the end: either half of an escape or of the terminator
                break;
            };
            match next {
                DLE => {
                    body.push(DLE);
                    i += 2;
                }
                ETX => {
                    let raw: Vec<u8> = self.buffer.drain(..i + 2).collect();
                    if body.is_empty() {
                        return Decoded::Malformed(FrameError::EmptyFrame);
                    }
                    let variable = body.remove(0);
                    return Decoded::Frame {
                        frame: Frame::new(variable, body),
                        raw,
                    };
                }
                other => {
                    self.resync();
                    return Decoded::Malformed(FrameError::StrayEscape { byte: other });
                }
            }
        }

        Decoded::Incomplete
    }

    /// Try to extract the next complete frame, skipping malformed data
    pub fn next_frame(&mut self) -> Option<Frame> {
        self.next_frame_with_bytes().map(|(frame, _)| frame)
    }

    /// Try to extract the next complete frame along with its raw bytes
    pub fn next_frame_with_bytes(&mut self) -> Option<(Frame, Vec<u8>)> {
        loop {
            match self.decode() {
                Decoded::Frame { frame, raw } => return Some((frame, raw)),
                Decoded::Incomplete => return None,
                Decoded::Malformed(e) => {
                    tracing::warn!("Discarding malformed Primare data: {}", e);
                }
            }
        }
    }

    /// Drop the frame start at the front of the buffer and everything up to
    /// the next `STX`
    fn resync(&mut self) {
        let next = self.buffer[1..]
            .iter()
            .position(|&b| b == STX)
            .map(|p| p + 1)
            .unwrap_or(self.buffer.len());
        self.buffer.drain(..next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decode_all(bytes: &[u8]) -> Vec<Frame> {
        let mut codec = FrameCodec::new();
        codec.push_bytes(bytes);
        std::iter::from_fn(|| codec.next_frame()).collect()
    }

    #[test]
    fn test_encode_verbose_write() {
        // Example from the vendor documentation: write variable 0x0D, value 0
        assert_eq!(
            encode_request(CommandType::Write, &[0x0D, 0x00]),
            vec![0x02, 0x57, 0x0D, 0x00, 0x10, 0x03]
        );
    }

    #[test]
    fn test_encode_escapes_dle_operand() {
        // Volume 16 == 0x10 must be doubled
        assert_eq!(
            encode_request(CommandType::Write, &[0x83, 0x10]),
            vec![0x02, 0x57, 0x83, 0x10, 0x10, 0x10, 0x03]
        );
    }

    #[test]
    fn test_decode_reply() {
        let frames = decode_all(&[0x02, 0x03, 0x28, 0x10, 0x03]);
        assert_eq!(frames, vec![Frame::new(0x03, vec![0x28])]);
        assert_eq!(frames[0].value(), Some(40));
    }

    #[test]
    fn test_incomplete_until_terminator() {
        let mut codec = FrameCodec::new();
        codec.push_bytes(&[0x02, 0x09]);
        assert_eq!(codec.decode(), Decoded::Incomplete);
        codec.push_bytes(&[0x01, 0x10]);
        assert_eq!(codec.decode(), Decoded::Incomplete);
        codec.push_bytes(&[0x03]);
        assert!(matches!(codec.decode(), Decoded::Frame { frame, .. } if frame == Frame::new(0x09, vec![0x01])));
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_escaped_dle_then_literal_etx_is_not_terminator() {
        // payload [0x10, 0x03]: doubled DLE followed by a literal ETX byte
        let wire = [0x02, 0x04, 0x10, 0x10, 0x03, 0x10, 0x03];
        let frames = decode_all(&wire);
        assert_eq!(frames, vec![Frame::new(0x04, vec![0x10, 0x03])]);
    }

    #[test]
    fn test_true_terminator_after_plain_byte() {
        let wire = [0x02, 0x04, 0x10, 0x03];
        let frames = decode_all(&wire);
        assert_eq!(frames, vec![Frame::new(0x04, vec![])]);
    }

    #[test]
    fn test_split_escape_across_pushes() {
        let mut codec = FrameCodec::new();
        codec.push_bytes(&[0x02, 0x03, 0x10]);
        assert_eq!(codec.decode(), Decoded::Incomplete);
        codec.push_bytes(&[0x10]);
        assert_eq!(codec.decode(), Decoded::Incomplete);
        codec.push_bytes(&[0x10, 0x03]);
        assert_eq!(codec.next_frame(), Some(Frame::new(0x03, vec![0x10])));
    }

    #[test]
    fn test_garbage_then_frame_resynchronizes() {
        let mut codec = FrameCodec::new();
        codec.push_bytes(&[0xAA, 0xBB, 0xCC]);
        codec.push_bytes(&encode_reply(0x01, &[0x01]));

        assert_eq!(
            codec.decode(),
            Decoded::Malformed(FrameError::MissingStx { discarded: 3 })
        );
        assert_eq!(codec.next_frame(), Some(Frame::new(0x01, vec![0x01])));
        assert_eq!(codec.next_frame(), None);
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_only_garbage_yields_nothing() {
        let frames = decode_all(&[0xFF, 0x00, 0x42]);
        assert!(frames.is_empty());
    }

    #[test]
    fn test_oversized_frame_dropped() {
        let mut bytes = vec![STX];
        bytes.extend(std::iter::repeat(0x41).take(MAX_FRAME_LEN + 8));
        bytes.extend(encode_reply(0x09, &[0x00]));

        let mut codec = FrameCodec::new();
        codec.push_bytes(&bytes);
        assert!(matches!(
            codec.decode(),
            Decoded::Malformed(FrameError::Oversized { .. })
        ));
        assert_eq!(codec.next_frame(), Some(Frame::new(0x09, vec![0x00])));
    }

    #[test]
    fn test_stray_escape_resynchronizes() {
        let mut bytes = vec![STX, 0x03, DLE, 0x05];
        bytes.extend(encode_reply(0x03, &[0x20]));
        let mut codec = FrameCodec::new();
        codec.push_bytes(&bytes);
        assert_eq!(
            codec.decode(),
            Decoded::Malformed(FrameError::StrayEscape { byte: 0x05 })
        );
        assert_eq!(codec.next_frame(), Some(Frame::new(0x03, vec![0x20])));
    }

    #[test]
    fn test_empty_frame_is_malformed() {
        let mut codec = FrameCodec::new();
        codec.push_bytes(&[STX, DLE, ETX]);
        assert_eq!(codec.decode(), Decoded::Malformed(FrameError::EmptyFrame));
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_request_frame_view() {
        let wire = encode_request(CommandType::Read, &[0x15, 0x00]);
        let frame = decode_all(&wire).remove(0);
        let request = frame.as_request().unwrap();
        assert_eq!(request.command_type, CommandType::Read);
        assert_eq!(request.variable, 0x15);
        assert_eq!(request.operand, vec![0x00]);
    }

    #[test]
    fn test_text_payload() {
        let frame = Frame::new(0x15, b"Primare\0".to_vec());
        assert_eq!(frame.text(), "Primare");
    }

    proptest! {
        #[test]
        fn prop_reply_roundtrip(variable in any::<u8>(), data in proptest::collection::vec(any::<u8>(), 0..24)) {
            let wire = encode_reply(variable, &data);
            let frames = decode_all(&wire);
            prop_assert_eq!(frames, vec![Frame::new(variable, data)]);
        }

        #[test]
        fn prop_escaping_doubles_each_dle(data in proptest::collection::vec(any::<u8>(), 1..24)) {
            let k = data.iter().filter(|&&b| b == DLE).count();
            let wire = encode_request(CommandType::Write, &data);
            let escaped = &wire[2..wire.len() - 2];
            prop_assert_eq!(escaped.iter().filter(|&&b| b == DLE).count(), 2 * k);

            let frame = decode_all(&wire).remove(0);
            let request = frame.as_request().unwrap();
            let mut restored = vec![request.variable];
            restored.extend(request.operand);
            prop_assert_eq!(restored.iter().filter(|&&b| b == DLE).count(), k);
            prop_assert_eq!(restored, data);
        }

        #[test]
        fn prop_garbage_prefix_never_corrupts_next_frame(
            garbage in proptest::collection::vec(any::<u8>().prop_filter("no STX", |b| *b != STX), 0..32),
            value in any::<u8>(),
        ) {
            let mut bytes = garbage;
            bytes.extend(encode_reply(0x03, &[value]));
            prop_assert_eq!(decode_all(&bytes), vec![Frame::new(0x03, vec![value])]);
        }
    }
}
