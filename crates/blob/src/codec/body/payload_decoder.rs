//! Decoder for response bodies.
//!
//! Picks the framing strategy from the [`PayloadSize`] derived from the response head:
//! - Content-Length delimited bodies
//! - chunked transfer coding
//! - bodies delimited by the server closing the connection
//! - no body at all

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::protocol::{ParseError, PayloadItem, PayloadSize};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
    /// every byte until end of stream belongs to the body
    UntilClose,
    NoBody,
}

impl PayloadDecoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    pub fn until_close() -> Self {
        Self { kind: Kind::UntilClose }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    /// Body bytes still expected, when the framing announces them up front.
    pub fn remaining(&self) -> Option<u64> {
        match &self.kind {
            Kind::Length(decoder) => Some(decoder.remaining()),
            Kind::NoBody => Some(0),
            Kind::Chunked(_) | Kind::UntilClose => None,
        }
    }

    /// Whether the whole body has been consumed.
    ///
    /// A close-delimited body is never complete from the bytes alone; the caller decides
    /// once the peer closes.
    pub fn is_complete(&self) -> bool {
        match &self.kind {
            Kind::Length(decoder) => decoder.remaining() == 0,
            Kind::Chunked(decoder) => decoder.is_done(),
            Kind::UntilClose => false,
            Kind::NoBody => true,
        }
    }
}

impl From<PayloadSize> for PayloadDecoder {
    fn from(size: PayloadSize) -> Self {
        match size {
            PayloadSize::Length(0) | PayloadSize::Empty => Self::empty(),
            PayloadSize::Length(n) => Self::fix_length(n),
            PayloadSize::Chunked => Self::chunked(),
            PayloadSize::UntilClose => Self::until_close(),
        }
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(length_decoder) => length_decoder.decode(src),
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode(src),
            Kind::UntilClose if src.is_empty() => Ok(None),
            Kind::UntilClose => Ok(Some(PayloadItem::Chunk(src.split().freeze()))),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }

        match &self.kind {
            Kind::UntilClose => Ok(Some(PayloadItem::Eof)),
            Kind::Length(decoder) => {
                Err(ParseError::invalid_body(format!("connection closed with {} body bytes outstanding", decoder.remaining())))
            }
            Kind::Chunked(_) => Err(ParseError::invalid_body("connection closed inside chunked body")),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }
}
