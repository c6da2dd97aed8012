//! Outgoing request head.

use http::Request;

/// The request line and header fields of an outgoing request.
///
/// The body is never part of the head: small payloads are appended by the caller when
/// the message is built, uploads are attached to the descriptor as a separate view.
pub type RequestHead = Request<()>;

/// Detects a `HEAD` request from the first bytes of an encoded request line.
///
/// Responses to `HEAD` never carry a body, whatever their framing headers say.
#[inline]
pub fn is_head_request(encoded: &[u8]) -> bool {
    encoded.starts_with(b"HEAD ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_detection_reads_the_request_line() {
        assert!(is_head_request(b"HEAD /bucket/key HTTP/1.1\r\n"));
        assert!(!is_head_request(b"GET /bucket/key HTTP/1.1\r\n"));
        assert!(!is_head_request(b"HEADER"));
    }
}
