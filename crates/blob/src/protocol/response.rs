//! Parsed response head.
//!
//! Wraps `http::Response<()>` so the receive states can ask the questions they need
//! (does this response carry a body, may the connection be reused) without reaching
//! into raw header values.

use http::header::CONNECTION;
use http::response::Parts;
use http::{HeaderMap, Response, StatusCode, Version};

/// The status line and header fields of a response.
#[derive(Debug)]
pub struct ResponseHead {
    inner: Response<()>,
}

impl AsRef<Response<()>> for ResponseHead {
    fn as_ref(&self) -> &Response<()> {
        &self.inner
    }
}

impl ResponseHead {
    /// Consumes the head and returns the inner `Response<()>`.
    pub fn into_inner(self) -> Response<()> {
        self.inner
    }

    /// Attaches a body to this head, converting it into a full `Response<T>`.
    pub fn body<T>(self, body: T) -> Response<T> {
        self.inner.map(|()| body)
    }

    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Whether the status code forbids a body regardless of framing headers.
    ///
    /// 1xx, 204 and 304 responses never carry content (RFC 9112 section 6.3).
    pub fn forbids_body(&self) -> bool {
        let status = self.status();
        status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
    }

    /// Whether the server allows the connection to carry another exchange.
    ///
    /// HTTP/1.1 defaults to persistent connections unless `Connection: close` is sent;
    /// HTTP/1.0 requires an explicit `Connection: keep-alive`.
    pub fn is_keep_alive(&self) -> bool {
        let has_token = |token: &str| {
            self.headers()
                .get_all(CONNECTION)
                .iter()
                .filter_map(|value| value.to_str().ok())
                .flat_map(|value| value.split(','))
                .any(|item| item.trim().eq_ignore_ascii_case(token))
        };

        match self.version() {
            Version::HTTP_11 => !has_token("close"),
            Version::HTTP_10 => has_token("keep-alive"),
            _ => false,
        }
    }
}

impl From<Parts> for ResponseHead {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Response::from_parts(parts, ()) }
    }
}

impl From<Response<()>> for ResponseHead {
    #[inline]
    fn from(inner: Response<()>) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(version: Version, status: u16, connection: Option<&str>) -> ResponseHead {
        let mut builder = Response::builder().version(version).status(status);
        if let Some(value) = connection {
            builder = builder.header(CONNECTION, value);
        }
        builder.body(()).unwrap().into()
    }

    #[test]
    fn http11_is_persistent_unless_closed() {
        assert!(head(Version::HTTP_11, 200, None).is_keep_alive());
        assert!(!head(Version::HTTP_11, 200, Some("close")).is_keep_alive());
        assert!(!head(Version::HTTP_11, 200, Some("Upgrade, Close")).is_keep_alive());
    }

    #[test]
    fn http10_needs_explicit_keep_alive() {
        assert!(!head(Version::HTTP_10, 200, None).is_keep_alive());
        assert!(head(Version::HTTP_10, 200, Some("Keep-Alive")).is_keep_alive());
    }

    #[test]
    fn bodiless_statuses() {
        assert!(head(Version::HTTP_11, 204, None).forbids_body());
        assert!(head(Version::HTTP_11, 304, None).forbids_body());
        assert!(head(Version::HTTP_11, 100, None).forbids_body());
        assert!(!head(Version::HTTP_11, 200, None).forbids_body());
        assert!(!head(Version::HTTP_11, 404, None).forbids_body());
    }
}
