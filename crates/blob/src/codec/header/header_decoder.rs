//! Response head decoder.
//!
//! Parses the status line and header fields of a response from raw bytes and works out
//! how the body that follows is framed.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum header size: 8KB
//! - HTTP/1.0 and HTTP/1.1 only
//!
//! # Implementation Details
//!
//! 1. Parse raw bytes using `httparse`
//! 2. Record header name/value byte ranges
//! 3. Split the head off the buffer and build `http::Response<()>` from shared slices
//! 4. Determine the body framing from the status code and headers
//!
//! Interim `1xx` responses (other than `101`) are consumed and skipped, so the caller
//! only ever sees the final response head.

use bytes::{Buf, BytesMut};
use http::{HeaderName, HeaderValue, Response, StatusCode, Version};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;

use crate::protocol::{ParseError, PayloadSize, ResponseHead};

/// Maximum number of headers allowed in a response
const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire header section
const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Shortest possible status line: `HTTP/1.1 200`
const MIN_STATUS_LINE: usize = 12;

/// Decoder for response heads implementing the [`Decoder`] trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderDecoder {
    head_request: bool,
}

impl HeaderDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A decoder for the response to a `HEAD` request, which never carries a body.
    pub fn for_head_request() -> Self {
        Self { head_request: true }
    }
}

impl Decoder for HeaderDecoder {
    type Item = (ResponseHead, PayloadSize);
    type Error = ParseError;

    /// Returns `Ok(None)` while the head is incomplete. On success the head bytes are
    /// split off `src`, leaving any body bytes in place.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < MIN_STATUS_LINE {
                return Ok(None);
            }

            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];
            let mut res = httparse::Response::new(&mut headers);

            let parsed_result = res.parse(src).map_err(|e| match e {
                Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
                e => ParseError::invalid_header(e.to_string()),
            });

            let body_offset = match parsed_result? {
                Status::Complete(body_offset) => body_offset,
                Status::Partial => {
                    ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                    return Ok(None);
                }
            };

            trace!(head_size = body_offset, "parsed response head");
            ensure!(body_offset <= MAX_HEADER_BYTES, ParseError::too_large_header(body_offset, MAX_HEADER_BYTES));

            let version = match res.version {
                Some(0) => Version::HTTP_10,
                Some(1) => Version::HTTP_11,
                v => return Err(ParseError::InvalidVersion(v)),
            };

            let code = res.code.ok_or(ParseError::InvalidStatus(None))?;
            let status = StatusCode::from_u16(code).map_err(|_| ParseError::InvalidStatus(Some(code)))?;

            if status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS {
                trace!(status = code, "skipping interim response");
                src.advance(body_offset);
                continue;
            }

            let header_count = res.headers.len();
            let mut header_index: [HeaderIndex; MAX_HEADER_NUM] = EMPTY_HEADER_INDEX_ARRAY;
            HeaderIndex::record(src, res.headers, &mut header_index);

            let header_bytes = src.split_to(body_offset).freeze();

            let mut builder = Response::builder().status(status).version(version);
            let header_map = builder.headers_mut().ok_or_else(|| ParseError::invalid_header("can't build response head"))?;
            header_map.reserve(header_count);

            for index in &header_index[..header_count] {
                let name = HeaderName::from_bytes(&header_bytes[index.name.0..index.name.1]).map_err(ParseError::invalid_header)?;
                let value =
                    HeaderValue::from_maybe_shared(header_bytes.slice(index.value.0..index.value.1)).map_err(ParseError::invalid_header)?;
                header_map.append(name, value);
            }

            let head = ResponseHead::from(builder.body(()).map_err(ParseError::invalid_header)?);
            let payload_size = parse_payload(&head, self.head_request)?;

            return Ok(Some((head, payload_size)));
        }
    }
}

/// Byte ranges of one header's name and value inside the head buffer.
#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

const EMPTY_HEADER_INDEX: HeaderIndex = HeaderIndex { name: (0, 0), value: (0, 0) };

const EMPTY_HEADER_INDEX_ARRAY: [HeaderIndex; MAX_HEADER_NUM] = [EMPTY_HEADER_INDEX; MAX_HEADER_NUM];

impl HeaderIndex {
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut [HeaderIndex]) {
        let bytes_ptr = bytes.as_ptr() as usize;
        for (header, indices) in headers.iter().zip(indices.iter_mut()) {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            indices.name = (name_start, name_start + header.name.len());
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            indices.value = (value_start, value_start + header.value.len());
        }
    }
}

/// Works out how the response body is framed (RFC 9112 section 6.3).
///
/// Conflicting `Transfer-Encoding`/`Content-Length` or disagreeing duplicate
/// `Content-Length` values are rejected rather than guessed at.
fn parse_payload(head: &ResponseHead, head_request: bool) -> Result<PayloadSize, ParseError> {
    if head_request || head.forbids_body() {
        return Ok(PayloadSize::Empty);
    }

    let te_header = head.headers().get(http::header::TRANSFER_ENCODING);
    let mut cl_values = head.headers().get_all(http::header::CONTENT_LENGTH).iter().peekable();

    match (te_header, cl_values.peek().is_some()) {
        (None, false) => Ok(PayloadSize::UntilClose),

        (te_value @ Some(_), false) => {
            if is_chunked(te_value) {
                Ok(PayloadSize::Chunked)
            } else {
                Ok(PayloadSize::UntilClose)
            }
        }

        (None, true) => {
            let mut length = None;
            for cl_value in cl_values {
                let cl_str = cl_value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;
                let parsed =
                    cl_str.trim().parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;
                ensure!(
                    length.is_none_or(|existing| existing == parsed),
                    ParseError::invalid_content_length("multiple content-length headers disagree")
                );
                length = Some(parsed);
            }

            Ok(length.map_or(PayloadSize::UntilClose, PayloadSize::Length))
        }

        (Some(_), true) => Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers")),
    }
}

/// Whether `chunked` is the final transfer coding.
fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    header_value
        .and_then(|value| value.as_bytes().rsplit(|b| *b == b',').next())
        .is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(CHUNKED))
}
