//! Streaming response decoder.
//!
//! Decoding happens in two phases:
//! 1. the response head, through [`HeaderDecoder`]
//! 2. the body, through a [`PayloadDecoder`] chosen from the head's framing
//!
//! Bytes may be fed in arbitrarily small pieces; the decoder returns `Ok(None)` until it
//! can make progress.

use std::io;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{Message, ParseError, PayloadSize, ResponseHead};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Items produced by [`ResponseDecoder`]: one head, then body chunks, then `Eof`.
pub type ResponseMessage = Message<(ResponseHead, PayloadSize)>;

/// A decoder for one HTTP response.
///
/// The `payload_decoder` field doubles as the phase marker:
/// - `None`: still parsing the head
/// - `Some(PayloadDecoder)`: parsing the body
#[derive(Debug, Default)]
pub struct ResponseDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl ResponseDecoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Decoder for the response to a `HEAD` request; its body is always empty.
    pub fn for_head_request() -> Self {
        Self { header_decoder: HeaderDecoder::for_head_request(), payload_decoder: None }
    }

    pub fn is_head_parsed(&self) -> bool {
        self.payload_decoder.is_some()
    }

    /// Whether the body has been fully decoded. Close-delimited bodies never are.
    pub fn is_complete(&self) -> bool {
        self.payload_decoder.as_ref().is_some_and(PayloadDecoder::is_complete)
    }
}

impl Decoder for ResponseDecoder {
    type Item = ResponseMessage;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            return Ok(payload_decoder.decode(src)?.map(Message::Payload));
        }

        let message = match self.header_decoder.decode(src)? {
            Some((head, payload_size)) => {
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Header((head, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.payload_decoder {
            Some(payload_decoder) => Ok(payload_decoder.decode_eof(src)?.map(Message::Payload)),
            None => match self.decode(src)? {
                Some(message) => Ok(Some(message)),
                None if src.is_empty() => Ok(None),
                None => Err(ParseError::io(io::ErrorKind::UnexpectedEof)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PayloadItem;
    use http::StatusCode;
    use indoc::indoc;

    fn decode_all(decoder: &mut ResponseDecoder, src: &mut BytesMut) -> Vec<ResponseMessage> {
        let mut messages = vec![];
        while let Some(message) = decoder.decode(src).unwrap() {
            let eof = matches!(message, Message::Payload(PayloadItem::Eof));
            messages.push(message);
            if eof {
                break;
            }
        }
        messages
    }

    #[test]
    fn length_response_in_one_buffer() {
        let str = indoc! {r##"
        HTTP/1.1 200 OK
        Content-Length: 5
        Content-Type: application/octet-stream

        hello"##};

        let mut decoder = ResponseDecoder::new();
        let mut buffer = BytesMut::from(str);
        let messages = decode_all(&mut decoder, &mut buffer);

        assert_eq!(messages.len(), 3);
        let (head, size) = messages.into_iter().next().and_then(Message::into_header).unwrap();
        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(size, PayloadSize::Length(5));
        assert!(decoder.is_complete());
    }

    #[test]
    fn head_arrives_in_pieces() {
        let mut decoder = ResponseDecoder::new();
        let mut buffer = BytesMut::from(&b"HTTP/1.1 404 Not Found\r\nContent-"[..]);
        assert!(decoder.decode(&mut buffer).unwrap().is_none());
        assert!(!decoder.is_head_parsed());

        buffer.extend_from_slice(b"Length: 0\r\n\r\n");
        let message = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(message.is_header());
        assert!(decoder.is_complete());
    }

    #[test]
    fn chunked_response() {
        let mut decoder = ResponseDecoder::new();
        let mut buffer = BytesMut::from(&b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n"[..]);

        let messages = decode_all(&mut decoder, &mut buffer);
        assert_eq!(messages.len(), 3);
        assert!(decoder.is_complete());
    }

    #[test]
    fn close_delimited_response_needs_eof() {
        let mut decoder = ResponseDecoder::new();
        let mut buffer = BytesMut::from(&b"HTTP/1.0 200 OK\r\n\r\nbody"[..]);

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_header());
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_payload());
        assert!(!decoder.is_complete());

        let last = decoder.decode_eof(&mut buffer).unwrap().unwrap();
        assert!(matches!(last, Message::Payload(PayloadItem::Eof)));
    }

    #[test]
    fn eof_inside_head_is_an_error() {
        let mut decoder = ResponseDecoder::new();
        let mut buffer = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Le"[..]);
        assert!(decoder.decode_eof(&mut buffer).is_err());
    }
}
