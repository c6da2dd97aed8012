//! Non-blocking socket abstraction used by message tasks.
//!
//! A task never owns a connection. It asks the [`Socket`] for one, then submits sends and
//! receives by [`ConnectionId`]; every submission completes immediately with an outcome.
//! Operations that cannot make progress report `WouldBlock` and are remembered, so the
//! driving loop can wait for readiness (see [`Socket::blocked`]) before stepping again.
//!
//! [`TokioSocket`] is the implementation backed by tokio TCP streams.

use std::fmt;
use std::io;

use tokio::io::Interest;

use crate::config::TcpSettings;

mod tokio_socket;
pub use tokio_socket::TokioSocket;

/// Handle of a connection inside a socket's connection table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Result of one send submission.
#[derive(Debug)]
pub enum SendOutcome {
    /// `n` bytes were handed to the kernel; `n` may be smaller than requested.
    Written(usize),
    WouldBlock,
    Error(io::Error),
}

/// Result of one receive submission.
#[derive(Debug)]
pub enum RecvOutcome {
    /// `n > 0` bytes were written to the front of the buffer.
    Read(usize),
    WouldBlock,
    /// The peer closed its side of the connection.
    Closed,
    Error(io::Error),
}

impl RecvOutcome {
    /// Bytes received, zero for every outcome except `Read`.
    pub fn read_len(&self) -> usize {
        match self {
            RecvOutcome::Read(n) => *n,
            _ => 0,
        }
    }
}

/// Direction of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Send,
    Recv,
}

impl IoOp {
    pub fn interest(self) -> Interest {
        match self {
            IoOp::Send => Interest::WRITABLE,
            IoOp::Recv => Interest::READABLE,
        }
    }
}

/// The submission a task issued most recently.
///
/// Recreated for every submission; `offset` is where in the logical stream the
/// submission starts and `len` how many bytes it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoRequest {
    pub conn: ConnectionId,
    pub op: IoOp,
    pub offset: usize,
    pub len: usize,
}

impl IoRequest {
    pub fn send(conn: ConnectionId, offset: usize, len: usize) -> Self {
        Self { conn, op: IoOp::Send, offset, len }
    }

    pub fn recv(conn: ConnectionId, offset: usize, len: usize) -> Self {
        Self { conn, op: IoOp::Recv, offset, len }
    }
}

/// A completion-style connection table shared by all tasks of one driver.
#[cfg_attr(test, mockall::automock)]
pub trait Socket {
    /// Returns a connection to `host:port`, reusing an idle keep-alive connection when
    /// one is available. Establishing the connection may finish later; until then
    /// submissions on it report `WouldBlock`.
    fn connect(&mut self, host: &str, port: u16, settings: &TcpSettings) -> io::Result<ConnectionId>;

    /// Sends `bytes[offset..]`.
    fn submit_send(&mut self, conn: ConnectionId, bytes: &[u8], offset: usize) -> SendOutcome;

    /// Receives into the front of `buf`.
    fn submit_recv(&mut self, conn: ConnectionId, buf: &mut [u8]) -> RecvOutcome;

    /// Gives the connection back. With `aborted` it is closed, otherwise it may be kept
    /// for another exchange with the same host.
    fn release(&mut self, conn: ConnectionId, aborted: bool);

    /// Drains the submissions that reported `WouldBlock` since the last call.
    fn blocked(&mut self) -> Vec<(ConnectionId, Interest)>;
}

#[cfg(test)]
pub(crate) mod scripted {
    //! In-memory socket replaying scripted outcomes, for task tests.

    use std::collections::VecDeque;

    use super::*;

    #[derive(Debug)]
    pub(crate) enum Step {
        /// accept up to `n` bytes of the send
        Send(usize),
        Recv(Vec<u8>),
        WouldBlock,
        Closed,
        Reset,
    }

    #[derive(Debug, Default)]
    pub(crate) struct ScriptedSocket {
        script: VecDeque<Step>,
        pub(crate) sent: Vec<u8>,
        pub(crate) connects: usize,
        pub(crate) released: Vec<(ConnectionId, bool)>,
        pub(crate) submissions: usize,
        blocked: Vec<(ConnectionId, Interest)>,
    }

    impl ScriptedSocket {
        pub(crate) fn new(script: impl IntoIterator<Item = Step>) -> Self {
            Self { script: script.into_iter().collect(), ..Default::default() }
        }

        pub(crate) fn push(&mut self, step: Step) {
            self.script.push_back(step);
        }

        pub(crate) fn sent_str(&self) -> &str {
            std::str::from_utf8(&self.sent).unwrap()
        }
    }

    impl Socket for ScriptedSocket {
        fn connect(&mut self, _host: &str, _port: u16, _settings: &TcpSettings) -> io::Result<ConnectionId> {
            self.connects += 1;
            Ok(ConnectionId::new(self.connects as u64))
        }

        fn submit_send(&mut self, conn: ConnectionId, bytes: &[u8], offset: usize) -> SendOutcome {
            self.submissions += 1;
            match self.script.pop_front() {
                Some(Step::Send(n)) => {
                    let n = n.min(bytes.len() - offset);
                    self.sent.extend_from_slice(&bytes[offset..offset + n]);
                    SendOutcome::Written(n)
                }
                Some(Step::WouldBlock) | None => {
                    self.blocked.push((conn, Interest::WRITABLE));
                    SendOutcome::WouldBlock
                }
                Some(Step::Reset) => SendOutcome::Error(io::ErrorKind::ConnectionReset.into()),
                Some(step) => panic!("unexpected send, script has {step:?}"),
            }
        }

        fn submit_recv(&mut self, conn: ConnectionId, buf: &mut [u8]) -> RecvOutcome {
            self.submissions += 1;
            match self.script.pop_front() {
                Some(Step::Recv(mut bytes)) => {
                    if bytes.len() > buf.len() {
                        // hand back what does not fit on the next receive
                        let rest = bytes.split_off(buf.len());
                        self.script.push_front(Step::Recv(rest));
                    }
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    RecvOutcome::Read(bytes.len())
                }
                Some(Step::WouldBlock) | None => {
                    self.blocked.push((conn, Interest::READABLE));
                    RecvOutcome::WouldBlock
                }
                Some(Step::Closed) => RecvOutcome::Closed,
                Some(Step::Reset) => RecvOutcome::Error(io::ErrorKind::ConnectionReset.into()),
                Some(step) => panic!("unexpected recv, script has {step:?}"),
            }
        }

        fn release(&mut self, conn: ConnectionId, aborted: bool) {
            self.released.push((conn, aborted));
        }

        fn blocked(&mut self) -> Vec<(ConnectionId, Interest)> {
            std::mem::take(&mut self.blocked)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_directions() {
        let conn = ConnectionId::new(7);
        assert_eq!(IoRequest::send(conn, 0, 10).op.interest(), Interest::WRITABLE);
        assert_eq!(IoRequest::recv(conn, 4, 10).op.interest(), Interest::READABLE);
        assert_eq!(conn.to_string(), "conn-7");
    }

    #[test]
    fn read_len() {
        assert_eq!(RecvOutcome::Read(12).read_len(), 12);
        assert_eq!(RecvOutcome::Closed.read_len(), 0);
        assert_eq!(RecvOutcome::WouldBlock.read_len(), 0);
    }
}
