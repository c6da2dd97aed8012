//! Request head encoder.
//!
//! Serialises the request line and header fields of an outgoing request. The framing
//! header (`Content-Length` or `Transfer-Encoding`) is derived from the [`PayloadSize`]
//! rather than trusted from the head, and a `Host` header is filled in from the URI
//! authority when the head does not carry one.

use crate::protocol::{PayloadSize, RequestHead, SendError};

use bytes::{BufMut, Bytes, BytesMut};

use http::{HeaderValue, Version, header};
use std::io;
use std::io::{ErrorKind, Write};
use tokio_util::codec::Encoder;
use tracing::error;

/// Initial buffer size allocated for head serialization
const INIT_HEADER_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestEncoder;

impl RequestEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<(RequestHead, PayloadSize)> for RequestEncoder {
    type Error = SendError;

    /// Writes `METHOD target HTTP/1.1`, the header fields and the blank line into `dst`.
    ///
    /// Only HTTP/1.1 heads are accepted. A close-delimited payload cannot be expressed in
    /// a request and is rejected.
    fn encode(&mut self, item: (RequestHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        if head.version() != Version::HTTP_11 {
            error!(http_version = ?head.version(), "unsupported http version");
            return Err(io::Error::from(ErrorKind::Unsupported).into());
        }

        let target = head.uri().path_and_query().map_or("/", |path| path.as_str());

        dst.reserve(INIT_HEADER_SIZE);
        write!(FastWrite(dst), "{} {} HTTP/1.1\r\n", head.method().as_str(), target)?;

        if !head.headers().contains_key(header::HOST) {
            let authority = head.uri().authority().ok_or_else(|| SendError::invalid_head("request has neither a host header nor an authority"))?;
            let host = HeaderValue::from_str(authority.as_str()).map_err(SendError::invalid_head)?;
            head.headers_mut().insert(header::HOST, host);
        }

        match payload_size {
            PayloadSize::Length(n) => {
                head.headers_mut().remove(header::TRANSFER_ENCODING);
                head.headers_mut().insert(header::CONTENT_LENGTH, n.into());
            }
            PayloadSize::Chunked => {
                head.headers_mut().remove(header::CONTENT_LENGTH);
                head.headers_mut().insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
            }
            PayloadSize::Empty => {}
            PayloadSize::UntilClose => return Err(SendError::invalid_head("a request body cannot be delimited by connection close")),
        }

        for (header_name, header_value) in head.headers().iter() {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Encodes `head` followed by a small inline `body` into one send buffer.
///
/// Large uploads should instead be attached to the message as put data, so the body is
/// sent from the caller's memory without copying.
pub fn encode_request(head: RequestHead, body: &[u8]) -> Result<Bytes, SendError> {
    let payload_size = if body.is_empty() { PayloadSize::Empty } else { PayloadSize::Length(body.len() as u64) };

    let mut dst = BytesMut::with_capacity(INIT_HEADER_SIZE + body.len());
    RequestEncoder.encode((head, payload_size), &mut dst)?;
    dst.put_slice(body);
    Ok(dst.freeze())
}

/// Writer over `BytesMut` for `write!`, appending without intermediate buffering.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
