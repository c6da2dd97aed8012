//! Tuning knobs for message tasks and the driver.
//!
//! Protocol limits (header count and size, the retry ceiling) are constants next to the
//! code that enforces them; only settings a caller may reasonably change live here.

use std::time::Duration;

/// Default number of bytes requested per receive submission.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Socket options applied when a new connection is opened.
///
/// The task never interprets these; they are handed to the socket untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSettings {
    /// Enable TCP_NODELAY.
    pub nodelay: bool,
    /// Enable SO_KEEPALIVE.
    pub keep_alive: bool,
    /// SO_RCVBUF in bytes. `None` keeps the kernel default.
    pub recv_buffer_size: Option<u32>,
    /// SO_SNDBUF in bytes. `None` keeps the kernel default.
    pub send_buffer_size: Option<u32>,
    /// SO_LINGER timeout. `None` leaves lingering disabled.
    pub linger: Option<Duration>,
}

impl Default for TcpSettings {
    fn default() -> Self {
        Self { nodelay: true, keep_alive: true, recv_buffer_size: None, send_buffer_size: None, linger: None }
    }
}

/// Per-task configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskConfig {
    /// Upper bound on the bytes requested by one receive submission.
    pub chunk_size: usize,
    pub tcp: TcpSettings,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE, tcp: TcpSettings::default() }
    }
}

impl TaskConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        // a zero sized receive could never make progress
        self.chunk_size = chunk_size.max(1);
        self
    }
}

/// Configuration for [`Driver`](crate::driver::Driver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// How often an aborted task is reset and started over on a fresh connection.
    /// Default: 2.
    pub max_restarts: u32,
    pub task: TaskConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { max_restarts: 2, task: TaskConfig::default() }
    }
}
