//! Streaming frame decoder for accumulating partial reads.
//!
//! msgpack values are self-delimiting, so framing is a matter of knowing
//! where one value ends. The buffer accumulates raw bytes from transport
//! reads in a single `BytesMut` and peels complete values off the front: one
//! read may carry several concatenated frames, or end mid-frame, in which
//! case the incomplete tail stays buffered until a later read completes it.
//!
//! # Example
//!
//! ```ignore
//! use nvim_rpc_client::protocol::DecodeBuffer;
//!
//! let mut buffer = DecodeBuffer::new();
//!
//! // Data arrives in chunks from the socket
//! let frames = buffer.push(&chunk)?;
//! for frame in frames {
//!     println!("decoded value: {frame}");
//! }
//! ```

use std::io::{self, Cursor};

use bytes::BytesMut;
use rmpv::Value;

use crate::error::{ClientError, Result};

/// Default cap on the size of a single buffered frame (64 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct DecodeBuffer {
    /// Accumulated bytes from transport reads.
    buffer: BytesMut,
    /// Maximum allowed size of one buffered frame.
    max_frame_size: usize,
}

impl DecodeBuffer {
    /// Create a new decode buffer with the default frame size cap.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new decode buffer with a custom frame size cap.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            max_frame_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Returns the decoded values in the byte order they appeared. An
    /// incomplete trailing frame is kept for the next push; the returned
    /// vector may be empty.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the stream is undecodable or an
    /// incomplete frame grows past the size cap. The buffer is not usable
    /// for further decoding after an error.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Value>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Try to extract a single frame from the front of the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(value))` if a complete value was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on a protocol violation
    fn try_extract_one(&mut self) -> Result<Option<Value>> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let mut cursor = Cursor::new(&self.buffer[..]);
        match rmpv::decode::read_value(&mut cursor) {
            Ok(value) => {
                let consumed = cursor.position() as usize;
                let _ = self.buffer.split_to(consumed);
                Ok(Some(value))
            }
            Err(ref err) if is_incomplete(err) => {
                if self.buffer.len() > self.max_frame_size {
                    return Err(ClientError::Protocol(format!(
                        "incomplete frame exceeds maximum size {} ({} bytes buffered)",
                        self.max_frame_size,
                        self.buffer.len()
                    )));
                }
                Ok(None)
            }
            Err(err) => Err(ClientError::Protocol(format!("undecodable frame: {err}"))),
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard all buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for DecodeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// A truncated value reads as an unexpected EOF; that means "wait for more
/// bytes", not a protocol violation.
fn is_incomplete(err: &rmpv::decode::Error) -> bool {
    match err {
        rmpv::decode::Error::InvalidMarkerRead(io_err)
        | rmpv::decode::Error::InvalidDataRead(io_err) => {
            io_err.kind() == io::ErrorKind::UnexpectedEof
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_bytes(value: &Value) -> Vec<u8> {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, value).unwrap();
        buf
    }

    fn sample_frame(id: u64, result: &str) -> Value {
        Value::Array(vec![
            Value::from(1u64),
            Value::from(id),
            Value::Nil,
            Value::from(result),
        ])
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = DecodeBuffer::new();
        let frame = sample_frame(0, "pong");

        let frames = buffer.push(&frame_bytes(&frame)).unwrap();

        assert_eq!(frames, vec![frame]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = DecodeBuffer::new();
        let first = sample_frame(1, "first");
        let second = sample_frame(2, "second");
        let third = sample_frame(3, "third");

        let mut combined = frame_bytes(&first);
        combined.extend(frame_bytes(&second));
        combined.extend(frame_bytes(&third));

        let frames = buffer.push(&combined).unwrap();

        assert_eq!(frames, vec![first, second, third]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_incomplete_frame_is_retained() {
        let mut buffer = DecodeBuffer::new();
        let frame = sample_frame(7, "split across reads");
        let bytes = frame_bytes(&frame);

        let frames = buffer.push(&bytes[..bytes.len() / 2]).unwrap();
        assert!(frames.is_empty());
        assert!(!buffer.is_empty());

        let frames = buffer.push(&bytes[bytes.len() / 2..]).unwrap();
        assert_eq!(frames, vec![frame]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_complete_frame_followed_by_partial() {
        let mut buffer = DecodeBuffer::new();
        let first = sample_frame(1, "whole");
        let second = sample_frame(2, "tail");

        let mut data = frame_bytes(&first);
        let second_bytes = frame_bytes(&second);
        data.extend_from_slice(&second_bytes[..4]);

        let frames = buffer.push(&data).unwrap();
        assert_eq!(frames, vec![first]);
        assert_eq!(buffer.len(), 4);

        let frames = buffer.push(&second_bytes[4..]).unwrap();
        assert_eq!(frames, vec![second]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = DecodeBuffer::new();
        let frame = sample_frame(42, "hi");
        let bytes = frame_bytes(&frame);

        let mut all_frames = Vec::new();
        for byte in &bytes {
            all_frames.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all_frames, vec![frame]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_empty_push_yields_nothing() {
        let mut buffer = DecodeBuffer::new();
        assert!(buffer.push(&[]).unwrap().is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_oversized_incomplete_frame_rejected() {
        let mut buffer = DecodeBuffer::with_max_frame_size(16);

        // bin32 header claiming a payload far beyond the cap.
        let mut data = vec![0xc6, 0x00, 0x10, 0x00, 0x00];
        data.extend_from_slice(&[0xAB; 20]);

        let result = buffer.push(&data);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("exceeds maximum size"));
    }

    #[test]
    fn test_clear_discards_partial_tail() {
        let mut buffer = DecodeBuffer::new();
        let bytes = frame_bytes(&sample_frame(1, "discard me"));

        buffer.push(&bytes[..3]).unwrap();
        assert!(!buffer.is_empty());

        buffer.clear();
        assert!(buffer.is_empty());

        // A fresh frame decodes normally after the reset.
        let frame = sample_frame(2, "fresh");
        assert_eq!(buffer.push(&frame_bytes(&frame)).unwrap(), vec![frame]);
    }
}
