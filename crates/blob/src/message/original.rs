//! The request descriptor handed to a message task.

use std::fmt;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::message::MessageState;
use crate::protocol::{DataVector, ResponseHead};

/// Single-shot completion handler, receiving the result buffer.
pub type Callback<'buf> = Box<dyn FnOnce(Option<DataVector<'buf>>) + 'buf>;

/// Where the response body is accumulated.
#[derive(Debug, Default)]
pub enum ReceiveBuffer<'buf> {
    /// the task allocates and grows the buffer itself
    #[default]
    Owned,
    /// received in place into caller memory; spills into an owned buffer when too small
    Borrowed(&'buf mut [u8]),
}

impl<'buf> ReceiveBuffer<'buf> {
    pub fn is_borrowed(&self) -> bool {
        matches!(self, ReceiveBuffer::Borrowed(_))
    }

    pub(crate) fn into_data_vector(self) -> DataVector<'buf> {
        match self {
            ReceiveBuffer::Owned => DataVector::new(),
            ReceiveBuffer::Borrowed(buf) => DataVector::borrowed(buf),
        }
    }
}

/// One request to execute: what to send, where to, and where the answer goes.
///
/// The descriptor outlives the task that executes it. The task borrows it mutably for
/// its whole life, records the state and the parsed response head on it, and stores
/// the result there once the exchange ends.
pub struct OriginalMessage<'buf> {
    pub(crate) message: Bytes,
    pub(crate) result: Option<DataVector<'buf>>,
    hostname: String,
    port: u16,
    receive_buffer: ReceiveBuffer<'buf>,
    trace_id: Option<u64>,
    put_data: Option<&'buf [u8]>,
    pub(crate) state: MessageState,
    pub(crate) response_head: Option<ResponseHead>,
    callback: Option<Callback<'buf>>,
}

impl fmt::Debug for OriginalMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OriginalMessage")
            .field("message_len", &self.message.len())
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("state", &self.state)
            .field("trace_id", &self.trace_id)
            .field("put_data_len", &self.put_data.map(<[u8]>::len))
            .field("result", &self.result)
            .field("has_callback", &self.callback.is_some())
            .finish_non_exhaustive()
    }
}

impl<'buf> OriginalMessage<'buf> {
    /// A descriptor whose result is collected by the caller with [`take_result`](Self::take_result).
    pub fn new(message: impl Into<Bytes>, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            message: message.into(),
            result: None,
            hostname: hostname.into(),
            port,
            receive_buffer: ReceiveBuffer::Owned,
            trace_id: None,
            put_data: None,
            state: MessageState::Init,
            response_head: None,
            callback: None,
        }
    }

    /// A descriptor that hands its result to `callback` exactly once when finished.
    pub fn with_callback(
        callback: impl FnOnce(Option<DataVector<'buf>>) + 'buf,
        message: impl Into<Bytes>,
        hostname: impl Into<String>,
        port: u16,
    ) -> Self {
        let mut original = Self::new(message, hostname, port);
        original.callback = Some(Box::new(callback));
        original
    }

    /// Receive the body in place into `buf`.
    pub fn with_receive_buffer(mut self, buf: &'buf mut [u8]) -> Self {
        self.receive_buffer = ReceiveBuffer::Borrowed(buf);
        self
    }

    pub fn with_trace_id(mut self, trace_id: u64) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Attaches the upload body sent after the request message.
    ///
    /// Only the first call takes effect, and only before execution started.
    pub fn set_put_request_data(&mut self, data: &'buf [u8]) {
        debug_assert!(self.put_data.is_none(), "put data attached twice");
        if self.put_data.is_some() || self.state != MessageState::Init {
            warn!(hostname = %self.hostname, state = %self.state, "put data already attached, ignoring");
            return;
        }
        self.put_data = Some(data);
    }

    pub fn message(&self) -> &Bytes {
        &self.message
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn trace_id(&self) -> Option<u64> {
        self.trace_id
    }

    pub fn put_data(&self) -> Option<&'buf [u8]> {
        self.put_data
    }

    pub fn state(&self) -> MessageState {
        self.state
    }

    /// The parsed response head, once the headers were received.
    pub fn response_head(&self) -> Option<&ResponseHead> {
        self.response_head.as_ref()
    }

    pub fn result(&self) -> Option<&DataVector<'buf>> {
        self.result.as_ref()
    }

    /// Moves the result out, leaving the descriptor without one.
    pub fn take_result(&mut self) -> Option<DataVector<'buf>> {
        self.result.take()
    }

    /// Whether a completion handler is armed and still has to run.
    pub fn requires_finish(&self) -> bool {
        self.callback.is_some()
    }

    /// Runs the completion handler with the result.
    ///
    /// Does nothing before the exchange reached a terminal state, and nothing after the
    /// handler already ran.
    pub fn finish(&mut self) {
        if !self.state.is_terminal() {
            warn!(hostname = %self.hostname, state = %self.state, "finish called on a running message");
            return;
        }

        if let Some(callback) = self.callback.take() {
            debug!(hostname = %self.hostname, state = %self.state, "running completion handler");
            callback(self.result.take());
        }
    }

    pub(crate) fn take_receive_buffer(&mut self) -> ReceiveBuffer<'buf> {
        std::mem::take(&mut self.receive_buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn finish_runs_callback_once() {
        let calls = RefCell::new(Vec::new());
        let mut original = OriginalMessage::with_callback(
            |result| calls.borrow_mut().push(result.map(|data| data.as_slice().to_vec())),
            &b"GET / HTTP/1.1\r\n\r\n"[..],
            "localhost",
            80,
        );
        assert!(original.requires_finish());

        original.finish();
        assert!(calls.borrow().is_empty(), "handler must not run before a terminal state");

        original.state = MessageState::Finished;
        let mut data = DataVector::new();
        data.extend_from_slice(b"body");
        original.result = Some(data);

        original.finish();
        original.finish();

        assert!(!original.requires_finish());
        assert!(original.result().is_none());
        assert_eq!(*calls.borrow(), vec![Some(b"body".to_vec())]);
    }

    #[test]
    fn without_callback_result_stays() {
        let mut original = OriginalMessage::new(&b"GET / HTTP/1.1\r\n\r\n"[..], "localhost", 80);
        assert!(!original.requires_finish());

        original.state = MessageState::Aborted;
        original.result = Some(DataVector::new());
        original.finish();
        assert!(original.take_result().is_some());
    }

    #[test]
    fn borrowed_receive_buffer_is_handed_out_once() {
        let mut storage = [0_u8; 16];
        let mut original = OriginalMessage::new(Bytes::new(), "localhost", 80).with_receive_buffer(&mut storage).with_trace_id(7);

        assert_eq!(original.trace_id(), Some(7));
        assert!(original.take_receive_buffer().is_borrowed());
        assert!(!original.take_receive_buffer().is_borrowed());
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn second_put_data_is_ignored() {
        let first = b"first".to_vec();
        let second = b"second".to_vec();
        let mut original = OriginalMessage::new(Bytes::new(), "localhost", 80);
        original.set_put_request_data(&first);
        original.set_put_request_data(&second);
        assert_eq!(original.put_data(), Some(&first[..]));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "put data attached twice")]
    fn second_put_data_is_rejected() {
        let data = b"data".to_vec();
        let mut original = OriginalMessage::new(Bytes::new(), "localhost", 80);
        original.set_put_request_data(&data);
        original.set_put_request_data(&data);
    }
}
