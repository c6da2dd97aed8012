//! One HTTP/1.1 exchange driven as a [`MessageTask`].
//!
//! | state           | submission                        | moves on when                       |
//! |-----------------|-----------------------------------|-------------------------------------|
//! | `Init`          | none, asks for a connection       | the socket assigned one             |
//! | `InitSending`   | request message from send offset  | the whole message is written        |
//! | `Sending`       | upload body, if any               | the whole upload is written         |
//! | `InitReceiving` | receive into the staging buffer   | the response head is parsed         |
//! | `Receiving`     | receive body bytes                | the body is complete                |
//!
//! Length-delimited bodies are received straight into the result buffer, so a borrowed
//! receive buffer is filled in place. Chunked bodies go through the staging buffer and
//! the chunked decoder.

use std::fmt;

use bytes::BytesMut;
use http::StatusCode;
use tokio_util::codec::Decoder;
use tracing::{debug, trace, warn};

use crate::codec::ResponseDecoder;
use crate::config::TaskConfig;
use crate::message::task::{MessageTask, Progress, TaskCore, TaskKind};
use crate::message::{MessageState, OriginalMessage};
use crate::protocol::{DataVector, Message, ParseError, PayloadItem, PayloadSize, is_head_request};
use crate::socket::{ConnectionId, IoRequest, RecvOutcome, SendOutcome, Socket};

/// What the response head said about the rest of the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseInfo {
    pub status: StatusCode,
    pub payload_size: PayloadSize,
    /// whether the connection may serve another exchange afterwards
    pub keep_alive: bool,
}

#[derive(Debug)]
pub struct HttpMessage<'m, 'buf> {
    core: TaskCore<'m, 'buf>,
    config: TaskConfig,
    head_request: bool,
    decoder: ResponseDecoder,
    /// received bytes not yet decoded: the head, and chunked body framing
    staging: BytesMut,
    info: Option<ResponseInfo>,
    body: DataVector<'buf>,
}

fn response_decoder(head_request: bool) -> ResponseDecoder {
    if head_request { ResponseDecoder::for_head_request() } else { ResponseDecoder::new() }
}

fn malformed(cause: &ParseError) -> MessageState {
    warn!(%cause, "malformed response, aborting");
    MessageState::Aborted
}

impl<'m, 'buf> HttpMessage<'m, 'buf> {
    pub fn new(original: &'m mut OriginalMessage<'buf>, config: TaskConfig) -> Self {
        let head_request = is_head_request(original.message());
        let body = match original.result.take() {
            Some(mut previous) => {
                previous.clear();
                previous
            }
            None => original.take_receive_buffer().into_data_vector(),
        };
        original.response_head = None;

        Self {
            core: TaskCore::new(original, TaskKind::Http),
            config,
            head_request,
            decoder: response_decoder(head_request),
            staging: BytesMut::new(),
            info: None,
            body,
        }
    }

    pub fn original(&self) -> &OriginalMessage<'buf> {
        &*self.core.original
    }

    pub fn response_info(&self) -> Option<ResponseInfo> {
        self.info
    }

    /// The most recent submission.
    pub fn current_request(&self) -> Option<IoRequest> {
        self.core.request
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    fn connect(&mut self, socket: &mut dyn Socket) -> MessageState {
        let original = &*self.core.original;
        match socket.connect(original.hostname(), original.port(), &self.config.tcp) {
            Ok(conn) => {
                trace!(%conn, "connection assigned");
                self.core.connection = Some(conn);
                self.core.progress.send = 0;
                MessageState::InitSending
            }
            Err(e) => self.core.fail(e),
        }
    }

    fn send_message(&mut self, socket: &mut dyn Socket, conn: ConnectionId) -> MessageState {
        let message = self.core.original.message.clone();
        let offset = self.core.progress.send_offset();
        if offset >= message.len() {
            return MessageState::Sending;
        }

        self.core.request = Some(IoRequest::send(conn, offset, message.len() - offset));
        match socket.submit_send(conn, &message, offset) {
            SendOutcome::Written(0) => self.connection_lost(socket, "send accepted no bytes"),
            SendOutcome::Written(n) => {
                self.core.progress.advance_send(n);
                trace!(written = n, sent = self.core.progress.send, total = message.len(), "request bytes sent");
                if self.core.progress.send_offset() >= message.len() { MessageState::Sending } else { MessageState::InitSending }
            }
            SendOutcome::WouldBlock => self.would_block(),
            SendOutcome::Error(e) => self.connection_lost(socket, e),
        }
    }

    fn send_put_data(&mut self, socket: &mut dyn Socket, conn: ConnectionId) -> MessageState {
        let message_len = self.core.original.message.len();
        let Some(data) = self.core.original.put_data() else {
            return self.start_receiving();
        };

        let offset = self.core.progress.send_offset().saturating_sub(message_len);
        if offset >= data.len() {
            return self.start_receiving();
        }

        self.core.request = Some(IoRequest::send(conn, message_len + offset, data.len() - offset));
        match socket.submit_send(conn, data, offset) {
            SendOutcome::Written(0) => self.connection_lost(socket, "send accepted no bytes"),
            SendOutcome::Written(n) => {
                self.core.progress.advance_send(n);
                trace!(written = n, sent = offset + n, total = data.len(), "upload bytes sent");
                if offset + n >= data.len() { self.start_receiving() } else { MessageState::Sending }
            }
            SendOutcome::WouldBlock => self.would_block(),
            SendOutcome::Error(e) => self.connection_lost(socket, e),
        }
    }

    fn start_receiving(&mut self) -> MessageState {
        self.core.progress.receive = 0;
        MessageState::InitReceiving
    }

    /// Receives up to one chunk into the staging buffer.
    fn receive_staged(&mut self, socket: &mut dyn Socket, conn: ConnectionId) -> RecvOutcome {
        let start = self.staging.len();
        let chunk_size = self.config.chunk_size;

        self.staging.resize(start + chunk_size, 0);
        self.core.request = Some(IoRequest::recv(conn, self.core.progress.receive_offset(), chunk_size));
        let outcome = socket.submit_recv(conn, &mut self.staging[start..]);
        self.staging.truncate(start + outcome.read_len().min(chunk_size));
        outcome
    }

    fn receive_head(&mut self, socket: &mut dyn Socket, conn: ConnectionId) -> MessageState {
        match self.receive_staged(socket, conn) {
            RecvOutcome::Read(n) => {
                trace!(read = n, buffered = self.staging.len(), "response head bytes received");
                self.decode_head()
            }
            RecvOutcome::Closed => self.connection_lost(socket, "connection closed before the response head"),
            RecvOutcome::WouldBlock => self.would_block(),
            RecvOutcome::Error(e) => self.connection_lost(socket, e),
        }
    }

    fn decode_head(&mut self) -> MessageState {
        match self.decoder.decode(&mut self.staging) {
            Ok(Some(Message::Header((head, payload_size)))) => {
                let info = ResponseInfo {
                    status: head.status(),
                    payload_size,
                    keep_alive: head.is_keep_alive() && !payload_size.is_close_delimited(),
                };
                debug!(status = info.status.as_u16(), ?payload_size, keep_alive = info.keep_alive, "response head received");

                if let Some(length) = payload_size.length().and_then(|length| usize::try_from(length).ok()) {
                    self.body.reserve(length);
                }
                self.core.original.response_head = Some(head);
                self.info = Some(info);

                match self.drain_staging() {
                    Ok(()) => MessageState::Receiving,
                    Err(e) => malformed(&e),
                }
            }
            Ok(Some(Message::Payload(_))) => malformed(&ParseError::invalid_body("body bytes before the response head")),
            Ok(None) => MessageState::InitReceiving,
            Err(e) => malformed(&e),
        }
    }

    /// Moves decodable body bytes from the staging buffer into the result.
    fn drain_staging(&mut self) -> Result<(), ParseError> {
        while let Some(message) = self.decoder.decode(&mut self.staging)? {
            match message {
                Message::Payload(PayloadItem::Chunk(bytes)) => {
                    self.body.extend_from_slice(&bytes);
                    self.core.progress.advance_receive(bytes.len());
                }
                Message::Payload(PayloadItem::Eof) => break,
                Message::Header(_) => return Err(ParseError::invalid_header("second response head")),
            }
        }
        Ok(())
    }

    fn is_body_complete(&self, info: &ResponseInfo) -> bool {
        match info.payload_size {
            PayloadSize::Length(length) => self.core.progress.receive_offset() as u64 >= length,
            PayloadSize::Chunked => self.decoder.is_complete(),
            PayloadSize::Empty => true,
            PayloadSize::UntilClose => false,
        }
    }

    fn receive_body(&mut self, socket: &mut dyn Socket, conn: ConnectionId) -> MessageState {
        let Some(info) = self.info else {
            warn!("receiving a body without a response head");
            return MessageState::Aborted;
        };

        if self.is_body_complete(&info) {
            return MessageState::Finished;
        }

        match info.payload_size {
            PayloadSize::Length(length) => self.receive_direct(socket, conn, &info, Some(length)),
            PayloadSize::UntilClose => self.receive_direct(socket, conn, &info, None),
            PayloadSize::Chunked => self.receive_chunked(socket, conn),
            PayloadSize::Empty => MessageState::Finished,
        }
    }

    /// Receives straight into the result buffer, up to `length` body bytes in total.
    fn receive_direct(&mut self, socket: &mut dyn Socket, conn: ConnectionId, info: &ResponseInfo, length: Option<u64>) -> MessageState {
        let received = self.core.progress.receive_offset();
        let remaining = length.map(|length| length.saturating_sub(received as u64));
        let max = remaining
            .and_then(|remaining| usize::try_from(remaining).ok())
            .map_or(self.config.chunk_size, |remaining| remaining.min(self.config.chunk_size));

        self.core.request = Some(IoRequest::recv(conn, received, max));
        let outcome = self.body.fill_with(max, |buf| {
            let outcome = socket.submit_recv(conn, buf);
            (outcome.read_len(), outcome)
        });

        match outcome {
            RecvOutcome::Read(n) => {
                self.core.progress.advance_receive(n);
                trace!(read = n, received = self.core.progress.receive, ?length, "body bytes received");
                if self.is_body_complete(info) { MessageState::Finished } else { MessageState::Receiving }
            }
            RecvOutcome::Closed if length.is_none() => {
                debug!(received, "peer closed the connection, body complete");
                MessageState::Finished
            }
            RecvOutcome::Closed => {
                let outstanding = remaining.unwrap_or_default();
                self.connection_lost(socket, format!("connection closed with {outstanding} body bytes outstanding"))
            }
            RecvOutcome::WouldBlock => self.would_block(),
            RecvOutcome::Error(e) => self.connection_lost(socket, e),
        }
    }

    fn receive_chunked(&mut self, socket: &mut dyn Socket, conn: ConnectionId) -> MessageState {
        match self.receive_staged(socket, conn) {
            RecvOutcome::Read(n) => {
                trace!(read = n, "chunked body bytes received");
                if let Err(e) = self.drain_staging() {
                    return malformed(&e);
                }
                if self.decoder.is_complete() { MessageState::Finished } else { MessageState::Receiving }
            }
            RecvOutcome::Closed => self.connection_lost(socket, "connection closed inside chunked body"),
            RecvOutcome::WouldBlock => self.would_block(),
            RecvOutcome::Error(e) => self.connection_lost(socket, e),
        }
    }

    /// The submission cannot make progress until the socket is ready again; the state
    /// stays as it is and no failure is recorded.
    fn would_block(&self) -> MessageState {
        trace!(state = %self.core.state(), "waiting for the socket");
        self.core.state()
    }

    /// Whether any byte of the response has been consumed.
    fn response_started(&self) -> bool {
        self.info.is_some() || !self.staging.is_empty() || self.core.progress.receive > 0
    }

    /// Handles a connection that failed under the task.
    ///
    /// Before any response byte arrived, the failure is counted and the exchange starts
    /// over from `Init` on a fresh connection. A response cut short cannot be resumed and
    /// aborts at once.
    fn connection_lost(&mut self, socket: &mut dyn Socket, reason: impl fmt::Display) -> MessageState {
        if self.response_started() {
            warn!(%reason, received = self.core.progress.receive, "connection lost inside the response, aborting");
            return MessageState::Aborted;
        }

        if self.core.fail(&reason) == MessageState::Aborted {
            return MessageState::Aborted;
        }

        self.core.release(socket, true);
        self.core.progress = Progress::not_started();
        self.decoder = response_decoder(self.head_request);
        debug!(%reason, failures = self.core.failures, "connection lost, reconnecting");
        MessageState::Init
    }

    /// Releases the connection and stores the result on the descriptor.
    fn settle(&mut self, socket: &mut dyn Socket, state: MessageState) {
        let reusable = state == MessageState::Finished && self.info.is_some_and(|info| info.keep_alive) && self.staging.is_empty();
        self.core.release(socket, !reusable);

        debug!(%state, received = self.core.progress.receive, failures = self.core.failures, reusable, "message settled");
        self.core.original.result = Some(std::mem::take(&mut self.body));
    }
}

impl MessageTask for HttpMessage<'_, '_> {
    fn step(&mut self, socket: &mut dyn Socket) -> MessageState {
        let span = self.core.span.clone();
        let _entered = span.enter();

        let state = self.core.state();
        if state.is_terminal() {
            return state;
        }

        let next = match (state, self.core.connection) {
            (MessageState::Init, _) => self.connect(socket),
            (_, None) => {
                warn!(%state, "no connection assigned");
                MessageState::Aborted
            }
            (MessageState::InitSending, Some(conn)) => self.send_message(socket, conn),
            (MessageState::Sending, Some(conn)) => self.send_put_data(socket, conn),
            (MessageState::InitReceiving, Some(conn)) => self.receive_head(socket, conn),
            (MessageState::Receiving, Some(conn)) => self.receive_body(socket, conn),
            (MessageState::Finished | MessageState::Aborted, _) => state,
        };

        self.core.set_state(next);
        if next.is_terminal() {
            self.settle(socket, next);
        }
        next
    }

    fn reset(&mut self, socket: &mut dyn Socket, aborted: bool) {
        let span = self.core.span.clone();
        let _entered = span.enter();

        // a connection with bytes already exchanged cannot carry a new request
        let in_flight = self.core.progress.send > 0;
        self.core.release(socket, aborted || in_flight);

        self.core.progress = Progress::zero();
        self.core.failures = 0;
        self.decoder = response_decoder(self.head_request);
        self.staging.clear();
        self.info = None;
        self.body.clear();

        if aborted {
            if let Some(mut result) = self.core.original.result.take() {
                result.clear();
                self.body = result;
            }
            self.core.original.response_head = None;
        }

        self.core.set_state(MessageState::Init);
        debug!(aborted, "message reset");
    }

    fn kind(&self) -> TaskKind {
        self.core.kind
    }

    fn state(&self) -> MessageState {
        self.core.state()
    }

    fn progress(&self) -> Progress {
        self.core.progress
    }

    fn failures(&self) -> u32 {
        self.core.failures
    }

    fn complete(&mut self) -> bool {
        if !self.core.state().is_terminal() || !self.core.original.requires_finish() {
            return false;
        }
        self.core.original.finish();
        true
    }
}
