//! Decoder for chunked transfer coding ([RFC 9112 section 7.1](https://www.rfc-editor.org/rfc/rfc9112#section-7.1)).
//!
//! The decoder keeps its position in the framing between calls, so a size line, a
//! chunk or the final `0\r\n\r\n` terminator may be split across any number of
//! receives. End of body is reported only once the last byte of the terminator
//! (including any trailer section) has been consumed.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{ParseError, PayloadItem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    phase: Phase,
    /// bytes left in the current chunk, or the size being accumulated
    remaining: u64,
    size_digits: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// hex digits of the chunk size
    Size,
    /// whitespace after the size
    SizeLws,
    /// `;name=value` chunk extensions, ignored
    Extension,
    /// LF ending the size line
    SizeLf,
    Data,
    DataCr,
    DataLf,
    /// start of a trailer field or of the final CRLF
    LineStart,
    Trailer,
    TrailerLf,
    EndLf,
    Done,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { phase: Phase::Size, remaining: 0, size_digits: 0 }
    }

    /// Whether the terminating zero-size chunk and trailer section were fully read.
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    fn accept(&mut self, byte: u8) -> Result<Phase, ParseError> {
        let next = match (self.phase, byte) {
            (Phase::Size, b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F') => {
                // ascii hex digit checked by the pattern above
                let digit = u64::from(char::from(byte).to_digit(16).unwrap_or_default());
                self.remaining = self
                    .remaining
                    .checked_mul(16)
                    .and_then(|size| size.checked_add(digit))
                    .ok_or_else(|| ParseError::invalid_body("chunk size overflow"))?;
                self.size_digits = self.size_digits.saturating_add(1);
                Phase::Size
            }
            (Phase::Size, _) if self.size_digits == 0 => return Err(ParseError::invalid_body("chunk size line without size")),
            (Phase::Size | Phase::SizeLws, b'\t' | b' ') => Phase::SizeLws,
            (Phase::Size | Phase::SizeLws, b';') => Phase::Extension,
            (Phase::Size | Phase::SizeLws | Phase::Extension, b'\r') => Phase::SizeLf,
            (Phase::Extension, b'\n') => return Err(ParseError::invalid_body("chunk extension contains newline")),
            (Phase::Extension, _) => Phase::Extension,
            (Phase::SizeLf, b'\n') => {
                self.size_digits = 0;
                if self.remaining == 0 { Phase::LineStart } else { Phase::Data }
            }
            (Phase::DataCr, b'\r') => Phase::DataLf,
            (Phase::DataLf, b'\n') => Phase::Size,
            (Phase::LineStart, b'\r') => Phase::EndLf,
            (Phase::Trailer, b'\r') => Phase::TrailerLf,
            (Phase::LineStart | Phase::Trailer, _) => Phase::Trailer,
            (Phase::TrailerLf, b'\n') => Phase::LineStart,
            (Phase::EndLf, b'\n') => Phase::Done,
            (phase, byte) => {
                return Err(ParseError::invalid_body(format!("unexpected byte {byte:#04x} in chunked body while in {phase:?}")));
            }
        };
        Ok(next)
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.phase {
                Phase::Done => {
                    trace!("finished reading chunked data");
                    return Ok(Some(PayloadItem::Eof));
                }

                _ if src.is_empty() => return Ok(None),

                Phase::Data => {
                    let take = usize::try_from(self.remaining).map_or(src.len(), |remaining| remaining.min(src.len()));
                    self.remaining -= take as u64;
                    if self.remaining == 0 {
                        self.phase = Phase::DataCr;
                    }

                    let bytes = src.split_to(take).freeze();
                    trace!(len = bytes.len(), "read chunked bytes");
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }

                _ => {
                    let byte = src.get_u8();
                    self.phase = self.accept(byte)?;
                }
            }
        }
    }
}
