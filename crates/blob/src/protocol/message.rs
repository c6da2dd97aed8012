use bytes::{Buf, Bytes};

/// One item produced by the response decoder: either the parsed head or a piece of body.
///
/// `T` is the header type, `Data` the payload chunk type (defaults to `Bytes`).
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    /// Contains the header information of type `T`
    Header(T),
    /// Contains a chunk of payload data or EOF marker
    Payload(PayloadItem<Data>),
}

/// An item of a decoded body stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of payload data
    Chunk(Data),
    /// Marks the end of the payload stream
    Eof,
}

/// How the end of a message body is determined.
///
/// Request encoding only ever produces `Length`, `Chunked` or `Empty`. Responses may
/// additionally be delimited by the peer closing the connection (RFC 9112 section 6.3).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Payload using chunked transfer encoding
    Chunked,
    /// Empty payload (no body)
    Empty,
    /// Body runs until the server closes the connection
    UntilClose,
}

impl PayloadSize {
    /// Returns true if the payload uses chunked transfer encoding
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    /// Returns true if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty | PayloadSize::Length(0))
    }

    /// Returns true if only a connection close terminates the payload
    #[inline]
    pub fn is_close_delimited(&self) -> bool {
        matches!(self, PayloadSize::UntilClose)
    }

    /// The declared length, if the payload is length delimited.
    #[inline]
    pub fn length(&self) -> Option<u64> {
        match self {
            PayloadSize::Length(n) => Some(*n),
            PayloadSize::Empty => Some(0),
            PayloadSize::Chunked | PayloadSize::UntilClose => None,
        }
    }
}

impl<T> Message<T> {
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    /// Returns the header, or `None` for payload messages.
    pub fn into_header(self) -> Option<T> {
        match self {
            Message::Header(header) => Some(header),
            Message::Payload(_) => None,
        }
    }

    /// Returns the payload item, or `None` for header messages.
    pub fn into_payload_item(self) -> Option<PayloadItem> {
        match self {
            Message::Header(_) => None,
            Message::Payload(payload_item) => Some(payload_item),
        }
    }
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    /// Returns a reference to the contained bytes if this is a Chunk
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    /// Consumes the item and returns the contained bytes if this is a Chunk
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_counts_as_empty() {
        assert!(PayloadSize::Length(0).is_empty());
        assert!(PayloadSize::Empty.is_empty());
        assert!(!PayloadSize::Length(1).is_empty());
        assert!(!PayloadSize::Chunked.is_empty());
    }

    #[test]
    fn only_framed_sizes_declare_a_length() {
        assert_eq!(PayloadSize::Length(42).length(), Some(42));
        assert_eq!(PayloadSize::Empty.length(), Some(0));
        assert_eq!(PayloadSize::Chunked.length(), None);
        assert_eq!(PayloadSize::UntilClose.length(), None);
        assert!(PayloadSize::UntilClose.is_close_delimited());
    }
}
