//! Request descriptors and the tasks that execute them.
//!
//! - [`OriginalMessage`]: what to send, where, and where the result goes; optionally
//!   carries a completion handler that runs exactly once
//! - [`MessageTask`]: the step/reset contract every task kind implements
//! - [`HttpMessage`]: the HTTP/1.1 task
//! - [`MessageState`]: progress of one exchange
//!
//! # Failure policy
//!
//! A submission that would block leaves the task where it is; the driver steps it again
//! once the socket reports readiness. A connection that fails before any response byte
//! arrived (error, premature close, refused connect) counts as a failure and the exchange
//! starts over from `Init` on a fresh connection. A failure with the counter already at
//! [`FAILURES_MAX`] aborts the task. A response cut short and a malformed response abort
//! at once and are never retried.

mod http_message;
mod original;
mod state;
mod task;

pub use http_message::{HttpMessage, ResponseInfo};
pub use original::{Callback, OriginalMessage, ReceiveBuffer};
pub use state::MessageState;
pub use task::{FAILURES_MAX, MessageTask, Progress, TaskCore, TaskKind};
