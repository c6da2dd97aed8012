//! Response head parsing.
//!
//! [`HeaderDecoder`] turns the status line and header fields into a `ResponseHead` and
//! derives the body framing. Limits: 64 header fields, 8 KiB of head bytes.

mod header_decoder;

pub use header_decoder::HeaderDecoder;
