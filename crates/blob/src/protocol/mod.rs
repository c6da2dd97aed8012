//! Protocol types shared by the codec and the message tasks.
//!
//! - **Message Handling** ([`message`]): decoder output
//!   - [`Message`]: either a parsed head or a payload item
//!   - [`PayloadItem`]: a body chunk or the end-of-body marker
//!   - [`PayloadSize`]: how the end of a body is determined
//!
//! - **Heads**: [`RequestHead`] for outgoing requests, [`ResponseHead`] for parsed responses
//!
//! - **Buffers** ([`DataVector`]): the result buffer, borrowed or owned
//!
//! - **Error Handling** ([`error`]):
//!   - [`ParseError`]: response decoding errors
//!   - [`SendError`]: request encoding errors

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHead;
pub use request::is_head_request;

mod response;
pub use response::ResponseHead;

mod data_vector;
pub use data_vector::DataVector;

mod error;
pub use error::ParseError;
pub use error::SendError;
