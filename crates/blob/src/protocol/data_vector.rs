//! Result buffer for response bodies.
//!
//! A body is received either into a caller-supplied slice (zero-copy, the caller keeps
//! ownership) or into a growable `BytesMut`. The choice is made once when the buffer is
//! created. A borrowed buffer that turns out to be too small spills into an owned one,
//! keeping the bytes already received.

use std::fmt;

use bytes::BytesMut;
use tracing::debug;

/// A growable byte container that may start out as a borrowed slice.
pub enum DataVector<'buf> {
    Owned(BytesMut),
    Borrowed { buf: &'buf mut [u8], len: usize },
}

impl Default for DataVector<'_> {
    fn default() -> Self {
        Self::Owned(BytesMut::new())
    }
}

impl fmt::Debug for DataVector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owned(buf) => f.debug_struct("Owned").field("len", &buf.len()).field("capacity", &buf.capacity()).finish(),
            Self::Borrowed { buf, len } => f.debug_struct("Borrowed").field("len", len).field("capacity", &buf.len()).finish(),
        }
    }
}

impl<'buf> DataVector<'buf> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::Owned(BytesMut::with_capacity(capacity))
    }

    /// Receives into `buf`, starting empty.
    pub fn borrowed(buf: &'buf mut [u8]) -> Self {
        Self::Borrowed { buf, len: 0 }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Owned(buf) => buf.len(),
            Self::Borrowed { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        match self {
            Self::Owned(buf) => buf.capacity(),
            Self::Borrowed { buf, .. } => buf.len(),
        }
    }

    /// Whether the bytes still live in the caller's slice.
    pub fn is_borrowed(&self) -> bool {
        matches!(self, Self::Borrowed { .. })
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Owned(buf) => buf.as_ref(),
            Self::Borrowed { buf, len } => &buf[..*len],
        }
    }

    /// Drops the contents, keeping the storage (and the borrowed slice, if any).
    pub fn clear(&mut self) {
        match self {
            Self::Owned(buf) => buf.clear(),
            Self::Borrowed { len, .. } => *len = 0,
        }
    }

    /// Makes room for `additional` more bytes.
    ///
    /// Borrowed storage cannot grow; it spills into an owned buffer instead.
    pub fn reserve(&mut self, additional: usize) {
        match self {
            Self::Owned(buf) => buf.reserve(additional),
            Self::Borrowed { buf, len } => {
                if buf.len() - *len < additional {
                    self.spill(additional);
                }
            }
        }
    }

    pub fn extend_from_slice(&mut self, src: &[u8]) {
        self.reserve(src.len());
        match self {
            Self::Owned(buf) => buf.extend_from_slice(src),
            Self::Borrowed { buf, len } => {
                buf[*len..*len + src.len()].copy_from_slice(src);
                *len += src.len();
            }
        }
    }

    /// Hands up to `max` bytes of writable space to `fill` and commits what it wrote.
    ///
    /// `fill` returns the number of bytes it initialised (never more than the slice it
    /// was given) together with a value passed back to the caller. A borrowed buffer
    /// offers whatever space it has left and only spills once it is completely full.
    pub fn fill_with<R>(&mut self, max: usize, fill: impl FnOnce(&mut [u8]) -> (usize, R)) -> R {
        if let Self::Borrowed { buf, len } = self
            && *len == buf.len()
            && max > 0
        {
            self.spill(max);
        }

        match self {
            Self::Owned(buf) => {
                let start = buf.len();
                buf.resize(start + max, 0);
                let (written, result) = fill(&mut buf[start..]);
                buf.truncate(start + written.min(max));
                result
            }
            Self::Borrowed { buf, len } => {
                let end = buf.len().min(*len + max);
                let (written, result) = fill(&mut buf[*len..end]);
                *len += written.min(end - *len);
                result
            }
        }
    }

    /// Moves the contents into an owned buffer, copying only if they were borrowed.
    pub fn into_owned(self) -> BytesMut {
        match self {
            Self::Owned(buf) => buf,
            Self::Borrowed { buf, len } => BytesMut::from(&buf[..len]),
        }
    }

    fn spill(&mut self, additional: usize) {
        if let Self::Borrowed { buf, len } = self {
            debug!(len = *len, capacity = buf.len(), additional, "receive buffer too small, spilling into owned buffer");
            let mut owned = BytesMut::with_capacity(*len + additional);
            owned.extend_from_slice(&buf[..*len]);
            *self = Self::Owned(owned);
        }
    }
}

impl AsRef<[u8]> for DataVector<'_> {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}
