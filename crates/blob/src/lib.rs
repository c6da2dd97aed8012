//! A non-blocking request engine for cloud object storage clients.
//!
//! The crate drives HTTP/1.1 request/response exchanges to completion through a
//! completion-style socket layer without ever blocking a thread. Each exchange is a
//! small state machine ([`message::HttpMessage`]) that resumes partial sends and
//! receives from recorded offsets, reconnects after a lost connection up to a fixed ceiling,
//! and hands its result buffer to the caller exactly once.
//!
//! # Example
//!
//! ```no_run
//! use http::Request;
//! use micro_blob::codec::encode_request;
//! use micro_blob::config::DriverConfig;
//! use micro_blob::driver::Driver;
//! use micro_blob::message::OriginalMessage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let head = Request::get("http://127.0.0.1:9000/bucket/object.bin").body(())?;
//!     let message = encode_request(head, &[])?;
//!
//!     let mut buffer = vec![0_u8; 1 << 20];
//!     let mut messages = [OriginalMessage::new(message, "127.0.0.1", 9000).with_receive_buffer(&mut buffer)];
//!
//!     let mut driver = Driver::new(DriverConfig::default());
//!     let summary = driver.run(&mut messages).await?;
//!     println!("finished {} aborted {}", summary.finished, summary.aborted);
//!
//!     if let Some(object) = messages[0].take_result() {
//!         println!("received {} bytes", object.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`message`]: request descriptors, the task contract and the HTTP task
//! - [`socket`]: the non-blocking socket abstraction and its tokio implementation
//! - [`codec`]: request encoding and incremental response decoding
//! - [`protocol`]: heads, payload framing, result buffers and errors
//! - [`driver`]: the event loop stepping tasks and waiting for readiness
//! - [`config`]: task and driver settings
//!
//! # Limitations
//!
//! - HTTP/1.1 only, no TLS
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64

pub mod codec;
pub mod config;
pub mod driver;
pub mod message;
pub mod protocol;
pub mod socket;

mod utils;
pub(crate) use utils::ensure;
