//! Server-push event streams.
//!
//! The backend publishes order, custom-cake and menu events on one `text/event-stream` endpoint per [`Topic`]. An
//! [`EventStreamClient`] keeps a single connection to one of them open, dispatches decoded events through its
//! [`crate::events::StreamHooks`], and reconnects with exponential backoff when the connection drops.
//!
//! [`Topic`]: crate::events::Topic
mod client;
mod codec;
mod transport;

pub use client::{ConnectionState, ErrorCallback, EventStreamClient, StreamConfig};
pub use codec::{comment, SseDecoder, SseFrame};
pub use transport::{ByteStream, HttpStreamTransport, StreamError, StreamTransport};
