//! Cooperative event loop executing a batch of messages over one [`TokioSocket`].
//!
//! Each round steps every live task that is not waiting on its connection. A task whose
//! submission would block is parked until the socket reports that connection ready; once
//! every live task is parked, the driver waits on the socket. An aborted task is reset
//! and started over on a fresh connection, a bounded number of times; terminal tasks run
//! their completion handlers.

use futures::FutureExt;
use thiserror::Error;
use tokio::io::Interest;
use tracing::{debug, trace};

use crate::config::DriverConfig;
use crate::ensure;
use crate::message::{HttpMessage, MessageState, MessageTask, OriginalMessage};
use crate::socket::{ConnectionId, Socket, TokioSocket};

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("invalid driver config: {reason}")]
    InvalidConfig { reason: String },
}

impl DriverError {
    pub fn invalid_config<S: ToString>(str: S) -> Self {
        Self::InvalidConfig { reason: str.to_string() }
    }
}

/// Outcome counts of one [`Driver::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub finished: usize,
    pub aborted: usize,
    /// how often aborted tasks were started over
    pub restarts: usize,
}

struct Slot<'a> {
    task: Box<dyn MessageTask + 'a>,
    restarts: u32,
    done: bool,
    /// the submission that would block, until its connection is ready
    waiting: Option<(ConnectionId, Interest)>,
}

impl Slot<'_> {
    fn is_runnable(&self) -> bool {
        !self.done && self.waiting.is_none()
    }
}

/// Lets the tasks waiting on one of the `ready` connections run again.
fn wake(slots: &mut [Slot<'_>], ready: &[ConnectionId]) {
    for slot in slots {
        if slot.waiting.is_some_and(|(conn, _)| ready.contains(&conn)) {
            slot.waiting = None;
        }
    }
}

#[derive(Debug, Default)]
pub struct Driver {
    socket: TokioSocket,
    config: DriverConfig,
}

impl Driver {
    pub fn new(config: DriverConfig) -> Self {
        Self::with_socket(TokioSocket::new(), config)
    }

    /// A driver reusing the connections already parked in `socket`.
    pub fn with_socket(socket: TokioSocket, config: DriverConfig) -> Self {
        Self { socket, config }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn socket(&self) -> &TokioSocket {
        &self.socket
    }

    pub fn into_socket(self) -> TokioSocket {
        self.socket
    }

    /// Executes all `messages` to a terminal state.
    ///
    /// The outcome of each message is recorded on the descriptor itself: its state, the
    /// response head and the result, or the completion handler's argument.
    pub async fn run(&mut self, messages: &mut [OriginalMessage<'_>]) -> Result<RunSummary, DriverError> {
        ensure!(self.config.task.chunk_size > 0, DriverError::invalid_config("chunk size must be at least one byte"));

        let mut slots: Vec<Slot<'_>> = messages
            .iter_mut()
            .map(|original| Slot {
                task: Box::new(HttpMessage::new(original, self.config.task.clone())),
                restarts: 0,
                done: false,
                waiting: None,
            })
            .collect();

        let mut summary = RunSummary::default();
        let mut live = slots.len();
        let mut rounds = 0_u64;

        while live > 0 {
            rounds += 1;
            let mut progressed = false;

            for (index, slot) in slots.iter_mut().enumerate().filter(|(_, slot)| slot.is_runnable()) {
                let before = (slot.task.state(), slot.task.progress());
                let state = slot.task.step(&mut self.socket);
                slot.waiting = self.socket.blocked().pop();
                progressed |= (state, slot.task.progress()) != before;

                match state {
                    MessageState::Aborted if slot.restarts < self.config.max_restarts => {
                        slot.restarts += 1;
                        summary.restarts += 1;
                        debug!(index, restarts = slot.restarts, "message aborted, starting over");
                        slot.task.reset(&mut self.socket, true);
                        slot.waiting = None;
                        progressed = true;
                    }
                    MessageState::Finished | MessageState::Aborted => {
                        slot.done = true;
                        slot.waiting = None;
                        live -= 1;
                        if state == MessageState::Finished {
                            summary.finished += 1;
                        } else {
                            summary.aborted += 1;
                        }
                        slot.task.complete();
                        trace!(index, %state, live, "message done");
                    }
                    _ => {}
                }
            }

            let waiting: Vec<_> = slots.iter().filter(|slot| !slot.done).filter_map(|slot| slot.waiting).collect();
            if waiting.is_empty() {
                if !progressed {
                    tokio::task::yield_now().await;
                }
                continue;
            }

            if waiting.len() == live {
                trace!(rounds, waiting = waiting.len(), "all tasks blocked, waiting for the socket");
                let ready = self.socket.wait_ready(&waiting).await;
                if ready.is_empty() {
                    // nothing could be polled, let every task submit again
                    wake(&mut slots, &waiting.iter().map(|(conn, _)| *conn).collect::<Vec<_>>());
                } else {
                    wake(&mut slots, &ready);
                }
            } else {
                // others can still run: let the reactor turn, then pick up what is ready
                tokio::task::yield_now().await;
                if let Some(ready) = self.socket.wait_ready(&waiting).now_or_never() {
                    wake(&mut slots, &ready);
                }
            }
        }

        debug!(finished = summary.finished, aborted = summary.aborted, restarts = summary.restarts, rounds, "run complete");
        Ok(summary)
    }
}
