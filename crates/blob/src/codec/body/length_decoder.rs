//! Decoder for bodies delimited by `Content-Length`
//! ([RFC 9112 section 6.2](https://www.rfc-editor.org/rfc/rfc9112#section-6.2)).

use std::cmp;

use crate::protocol::{ParseError, PayloadItem};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Hands out body bytes until the announced length has been consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    remaining: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { remaining: length }
    }

    /// Body bytes still expected.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.remaining == 0 {
            return Ok(Some(PayloadItem::Eof));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let len = cmp::min(self.remaining, src.len() as u64);
        let bytes = src.split_to(len as usize).freeze();

        self.remaining -= bytes.len() as u64;
        Ok(Some(PayloadItem::Chunk(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_at_content_length() {
        let mut buffer = BytesMut::from(&b"1012345678 trailing"[..]);

        let mut decoder = LengthDecoder::new(10);
        let payload = decoder.decode(&mut buffer).unwrap().unwrap();

        assert_eq!(payload.as_bytes().unwrap().as_ref(), b"1012345678");
        assert_eq!(&buffer[..], b" trailing");
        assert_eq!(decoder.remaining(), 0);
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn waits_for_more_bytes() {
        let mut buffer = BytesMut::from(&b"abc"[..]);
        let mut decoder = LengthDecoder::new(5);

        assert_eq!(decoder.decode(&mut buffer).unwrap().unwrap().as_bytes().unwrap().as_ref(), b"abc");
        assert_eq!(decoder.remaining(), 2);
        assert!(decoder.decode(&mut buffer).unwrap().is_none());
    }
}
