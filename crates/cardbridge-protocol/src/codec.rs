//! Tokio codec that frames the serial byte stream into text lines.
//!
//! # Overview
//!
//! `SerialLineCodec` implements [`Decoder`] for the reader's newline
//! delimited protocol:
//!
//! ```text
//! b"UID:RF001234\r\nPIN:12" -> "UID:RF001234", then waits for more bytes
//! ```
//!
//! - Lines end with `\n`; a trailing `\r` is tolerated.
//! - Surrounding whitespace is trimmed and blank lines are skipped.
//! - A line that is not valid UTF-8 is consumed and reported as
//!   [`Error::Decode`], so the next call continues with the following line.
//! - A line longer than the maximum is consumed (or discarded up to the next
//!   newline) and reported as [`Error::LineTooLong`].
//!
//! Decode errors are per line, never fatal. Callers that drive the decoder
//! by hand (the serial reader thread does) keep decoding after an error.
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use tokio_util::codec::Decoder;
//! use cardbridge_protocol::SerialLineCodec;
//!
//! let mut codec = SerialLineCodec::new();
//! let mut buf = BytesMut::from(&b"SYSTEM READY\r\nUID:RF0"[..]);
//!
//! assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("SYSTEM READY"));
//! assert_eq!(codec.decode(&mut buf).unwrap(), None);
//!
//! buf.extend_from_slice(b"01234\n");
//! assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("UID:RF001234"));
//! ```

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use cardbridge_core::constants::MAX_LINE_LENGTH;
use cardbridge_core::{Error, Result};

/// Newline-delimited line decoder for the serial device.
#[derive(Debug)]
pub struct SerialLineCodec {
    /// Maximum allowed line length in bytes, excluding the terminator.
    max_line_length: usize,

    /// Bytes already scanned for a newline, so a partial line is not
    /// rescanned from the start on every call.
    next_index: usize,

    /// Set after an over-long line: drop bytes until the next newline.
    discarding: bool,
}

impl SerialLineCodec {
    /// Create a codec with the default maximum line length.
    pub fn new() -> Self {
        Self::with_max_line_length(MAX_LINE_LENGTH)
    }

    /// Create a codec with a custom maximum line length.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            max_line_length,
            next_index: 0,
            discarding: false,
        }
    }

    /// Get the current maximum line length.
    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    fn finish_line(&self, raw: &[u8]) -> Result<Option<String>> {
        let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);

        if raw.len() > self.max_line_length {
            return Err(Error::LineTooLong {
                size: raw.len(),
                max_size: self.max_line_length,
            });
        }

        let text = std::str::from_utf8(raw).map_err(|e| Error::Decode(e.to_string()))?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(trimmed.to_string()))
        }
    }
}

impl Default for SerialLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for SerialLineCodec {
    type Item = String;
    type Error = Error;

    /// Extract the next non-empty line from the buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(line))` - a complete, trimmed, non-empty line
    /// - `Ok(None)` - need more bytes
    /// - `Err(Error)` - the offending line was consumed and dropped
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        loop {
            let start = self.next_index.min(src.len());
            let newline = src[start..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| start + offset);

            match (self.discarding, newline) {
                (true, Some(pos)) => {
                    src.advance(pos + 1);
                    self.next_index = 0;
                    self.discarding = false;
                }
                (true, None) => {
                    src.clear();
                    self.next_index = 0;
                    return Ok(None);
                }
                (false, Some(pos)) => {
                    let line = src.split_to(pos + 1);
                    self.next_index = 0;
                    if let Some(text) = self.finish_line(&line)? {
                        return Ok(Some(text));
                    }
                }
                (false, None) => {
                    // The `\r` of a split `\r\n` is not part of the line.
                    let pending = src.len() - usize::from(src.last() == Some(&b'\r'));
                    if pending > self.max_line_length {
                        let size = src.len();
                        src.clear();
                        self.next_index = 0;
                        self.discarding = true;
                        return Err(Error::LineTooLong {
                            size,
                            max_size: self.max_line_length,
                        });
                    }
                    self.next_index = src.len();
                    return Ok(None);
                }
            }
        }
    }

    /// Flush a final unterminated line when the stream ends.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() || self.discarding {
            src.clear();
            self.discarding = false;
            self.next_index = 0;
            return Ok(None);
        }
        let rest = src.split();
        self.next_index = 0;
        self.finish_line(&rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn decode_all(codec: &mut SerialLineCodec, buf: &mut BytesMut) -> Vec<Result<String>> {
        let mut out = Vec::new();
        loop {
            match codec.decode(buf) {
                Ok(Some(line)) => out.push(Ok(line)),
                Ok(None) => break,
                Err(e) => out.push(Err(e)),
            }
        }
        out
    }

    #[test]
    fn test_codec_default() {
        assert_eq!(SerialLineCodec::default().max_line_length(), MAX_LINE_LENGTH);
    }

    #[rstest]
    #[case(b"UID:RF001234\n")]
    #[case(b"UID:RF001234\r\n")]
    #[case(b"  UID:RF001234  \r\n")]
    fn test_decode_single_line(#[case] input: &[u8]) {
        let mut codec = SerialLineCodec::new();
        let mut buf = BytesMut::from(input);
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("UID:RF001234"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_partial_then_complete() {
        let mut codec = SerialLineCodec::new();
        let mut buf = BytesMut::from(&b"PIN:12"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"3456\r");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("PIN:123456"));
    }

    #[test]
    fn test_decode_multiple_lines_in_buffer() {
        let mut codec = SerialLineCodec::new();
        let mut buf = BytesMut::from(&b"SYSTEM READY\nUID:A\nPIN:1\nPIN_CLEARED\n"[..]);
        let lines: Vec<String> = decode_all(&mut codec, &mut buf)
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(lines, vec!["SYSTEM READY", "UID:A", "PIN:1", "PIN_CLEARED"]);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let mut codec = SerialLineCodec::new();
        let mut buf = BytesMut::from(&b"\r\n\n   \nUID:A\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("UID:A"));
    }

    #[test]
    fn test_invalid_utf8_drops_only_that_line() {
        let mut codec = SerialLineCodec::new();
        let mut buf = BytesMut::from(&b"UID:\xff\xfe\nPIN:1234\n"[..]);

        assert!(matches!(codec.decode(&mut buf), Err(Error::Decode(_))));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("PIN:1234"));
    }

    #[test]
    fn test_terminated_line_too_long() {
        let mut codec = SerialLineCodec::with_max_line_length(8);
        let mut buf = BytesMut::from(&b"UID:0123456789\nPIN:1\n"[..]);

        match codec.decode(&mut buf) {
            Err(Error::LineTooLong { size, max_size }) => {
                assert_eq!(size, 14);
                assert_eq!(max_size, 8);
            }
            other => panic!("expected LineTooLong, got {other:?}"),
        }
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("PIN:1"));
    }

    #[test]
    fn test_max_length_line_with_split_terminator() {
        let mut codec = SerialLineCodec::with_max_line_length(8);
        let mut buf = BytesMut::from(&b"UID:1234\r"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("UID:1234"));
    }

    #[test]
    fn test_unterminated_line_one_past_max_with_cr_rejected() {
        let mut codec = SerialLineCodec::with_max_line_length(8);
        let mut buf = BytesMut::from(&b"UID:12345\r"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::LineTooLong { size: 10, max_size: 8 })
        ));
    }

    #[test]
    fn test_unterminated_line_too_long_discards_until_newline() {
        let mut codec = SerialLineCodec::with_max_line_length(8);
        let mut buf = BytesMut::from(&b"XXXXXXXXXXXX"[..]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::LineTooLong { .. })
        ));
        assert!(buf.is_empty());

        buf.extend_from_slice(b"YYYY\nUID:A\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("UID:A"));
    }

    #[test]
    fn test_decode_eof_flushes_last_line() {
        let mut codec = SerialLineCodec::new();
        let mut buf = BytesMut::from(&b"UID:A\nPIN_CLEARED"[..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap().as_deref(), Some("UID:A"));
        assert_eq!(
            codec.decode_eof(&mut buf).unwrap().as_deref(),
            Some("PIN_CLEARED")
        );
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }
}
