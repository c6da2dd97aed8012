//! The task abstraction and the bookkeeping every task kind shares.

use std::fmt;

use tracing::{Span, debug, debug_span, warn};

use crate::message::{MessageState, OriginalMessage};
use crate::socket::{ConnectionId, IoRequest, Socket};

/// Failed submissions tolerated before a task gives up.
pub const FAILURES_MAX: u32 = 128;

/// The protocol a task speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Http,
}

/// Bytes moved in each direction.
///
/// `send` counts bytes of the request message followed by the upload body, `receive`
/// counts body bytes accumulated into the result. [`Progress::NOT_STARTED`] marks a
/// direction that has not begun yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub send: i64,
    pub receive: i64,
}

impl Progress {
    pub const NOT_STARTED: i64 = -1;

    pub const fn not_started() -> Self {
        Self { send: Self::NOT_STARTED, receive: Self::NOT_STARTED }
    }

    pub const fn zero() -> Self {
        Self { send: 0, receive: 0 }
    }

    pub fn send_offset(&self) -> usize {
        usize::try_from(self.send).unwrap_or(0)
    }

    pub fn receive_offset(&self) -> usize {
        usize::try_from(self.receive).unwrap_or(0)
    }

    pub(crate) fn advance_send(&mut self, n: usize) {
        self.send = advance(self.send, n);
    }

    pub(crate) fn advance_receive(&mut self, n: usize) {
        self.receive = advance(self.receive, n);
    }
}

fn advance(offset: i64, n: usize) -> i64 {
    offset.max(0).saturating_add(i64::try_from(n).unwrap_or(i64::MAX))
}

impl Default for Progress {
    fn default() -> Self {
        Self::not_started()
    }
}

/// Drives one exchange through non-blocking submissions.
///
/// Every call to [`step`](MessageTask::step) issues at most one submission and never
/// waits. Once the state is terminal, `step` returns it unchanged without touching the
/// socket.
pub trait MessageTask {
    fn step(&mut self, socket: &mut dyn Socket) -> MessageState;

    /// Puts the task back to [`MessageState::Init`], giving its connection back to the
    /// socket. With `aborted` the connection is closed and the result discarded.
    fn reset(&mut self, socket: &mut dyn Socket, aborted: bool);

    fn kind(&self) -> TaskKind;

    fn state(&self) -> MessageState;

    fn progress(&self) -> Progress;

    fn failures(&self) -> u32;

    /// Runs the descriptor's completion handler if the task is terminal and one is armed.
    /// Returns whether it ran.
    fn complete(&mut self) -> bool;
}

/// State shared by all task kinds: the descriptor, the connection and the counters.
pub struct TaskCore<'m, 'buf> {
    pub(crate) original: &'m mut OriginalMessage<'buf>,
    pub(crate) connection: Option<ConnectionId>,
    /// the most recent submission
    pub(crate) request: Option<IoRequest>,
    pub(crate) progress: Progress,
    pub(crate) kind: TaskKind,
    pub(crate) failures: u32,
    pub(crate) span: Span,
}

impl fmt::Debug for TaskCore<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCore")
            .field("kind", &self.kind)
            .field("state", &self.original.state)
            .field("connection", &self.connection)
            .field("request", &self.request)
            .field("progress", &self.progress)
            .field("failures", &self.failures)
            .finish_non_exhaustive()
    }
}

impl<'m, 'buf> TaskCore<'m, 'buf> {
    pub(crate) fn new(original: &'m mut OriginalMessage<'buf>, kind: TaskKind) -> Self {
        let span = debug_span!(
            "message",
            host = %original.hostname(),
            port = original.port(),
            trace_id = original.trace_id()
        );
        original.state = MessageState::Init;

        Self { original, connection: None, request: None, progress: Progress::not_started(), kind, failures: 0, span }
    }

    pub(crate) fn state(&self) -> MessageState {
        self.original.state
    }

    pub(crate) fn set_state(&mut self, state: MessageState) {
        if self.original.state != state {
            debug!(from = %self.original.state, to = %state, "state changed");
            self.original.state = state;
        }
    }

    /// Records a transient failure of the current state.
    ///
    /// Returns the state to continue in: unchanged while below [`FAILURES_MAX`],
    /// `Aborted` once a failure happens with the counter already at the ceiling.
    pub(crate) fn fail(&mut self, reason: impl fmt::Display) -> MessageState {
        if self.failures >= FAILURES_MAX {
            warn!(failures = self.failures, state = %self.state(), %reason, "too many failures, aborting");
            return MessageState::Aborted;
        }

        self.failures += 1;
        debug!(failures = self.failures, state = %self.state(), %reason, "submission failed, will retry");
        self.state()
    }

    /// Gives the connection back to the socket, if the task holds one.
    pub(crate) fn release(&mut self, socket: &mut dyn Socket, aborted: bool) {
        self.request = None;
        if let Some(conn) = self.connection.take() {
            socket.release(conn, aborted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_offsets() {
        let mut progress = Progress::default();
        assert_eq!(progress, Progress::not_started());
        assert_eq!(progress.send_offset(), 0);

        progress.advance_send(10);
        progress.advance_receive(3);
        assert_eq!(progress, Progress { send: 10, receive: 3 });
        assert_eq!(Progress::zero().receive_offset(), 0);
    }

    #[test]
    fn offsets_saturate() {
        let mut progress = Progress::zero();
        progress.advance_receive(usize::MAX);
        assert_eq!(progress.receive, i64::MAX);
        progress.advance_receive(1);
        assert_eq!(progress.receive, i64::MAX);
    }

    #[test]
    fn counter_stops_at_ceiling() {
        let mut original = OriginalMessage::new(bytes::Bytes::new(), "localhost", 80);
        let mut core = TaskCore::new(&mut original, TaskKind::Http);
        core.set_state(MessageState::InitSending);

        for _ in 0..FAILURES_MAX {
            assert_eq!(core.fail("connection reset"), MessageState::InitSending);
        }
        assert_eq!(core.failures, FAILURES_MAX);

        assert_eq!(core.fail("connection reset"), MessageState::Aborted);
        assert_eq!(core.failures, FAILURES_MAX);
    }
}
