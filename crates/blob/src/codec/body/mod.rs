//! Response body decoding.
//!
//! - [`ChunkedDecoder`]: chunked transfer coding, resumable at any byte
//! - [`LengthDecoder`]: Content-Length delimited bodies
//! - [`PayloadDecoder`]: selects one of the above, or a close-delimited or empty body

mod chunked_decoder;
mod length_decoder;
mod payload_decoder;

pub use chunked_decoder::ChunkedDecoder;
pub use length_decoder::LengthDecoder;
pub use payload_decoder::PayloadDecoder;
