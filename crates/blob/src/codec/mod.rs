//! Wire format of one HTTP/1.1 exchange, seen from the client.
//!
//! - Requests:
//!   - [`RequestEncoder`]: serialises a request head, deriving the framing header
//!   - [`encode_request`]: head plus a small inline body in one buffer
//!
//! - Responses:
//!   - [`ResponseDecoder`]: incremental head and body decoding
//!   - head parsing via the `header` module, body framing via the `body` module
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use micro_blob::codec::ResponseDecoder;
//! use tokio_util::codec::Decoder;
//!
//! let mut decoder = ResponseDecoder::new();
//! let mut buffer = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok"[..]);
//! let head = decoder.decode(&mut buffer).unwrap().unwrap();
//! assert!(head.is_header());
//! ```

mod body;
mod header;
mod request_encoder;
mod response_decoder;

pub use body::{ChunkedDecoder, LengthDecoder, PayloadDecoder};
pub use header::HeaderDecoder;
pub use request_encoder::{RequestEncoder, encode_request};
pub use response_decoder::{ResponseDecoder, ResponseMessage};
