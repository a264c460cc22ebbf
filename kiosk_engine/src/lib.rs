//! Kiosk Engine
//!
//! The client-side core of the bakery kiosk. It talks to the bakery backend and keeps the kiosk's view of orders,
//! payments and the menu up to date. It knows nothing about how that view is rendered.
//!
//! The library is divided into these sections:
//! 1. The retry layer ([`mod@retry`]). Bounded exponential-backoff retries for outbound requests, with a
//!    classification of which failures are transient.
//! 2. The backend client ([`BackendClient`]), which routes every request through the retry layer.
//! 3. Payments ([`mod@payment`]). The payment objects exchanged with the backend and the [`PaymentPoller`], which waits
//!    for a QR payment to be confirmed.
//! 4. Events ([`mod@events`]) and event streams ([`mod@stream`]). The backend pushes order, custom-cake and menu events
//!    over server-sent event streams. An [`EventStreamClient`] keeps one such stream connected and hands each event to
//!    the handler registered for it.
mod client;

pub mod events;
pub mod payment;
pub mod retry;
pub mod stream;

pub use client::{BackendClient, ClientConfig, DEFAULT_API_TIMEOUT, DEFAULT_API_URL};
pub use payment::{
    poller::{cancel_pair, CancelSignal, PaymentPoller, PollCanceller, PollError, PollOptions},
    PaymentStatusSource,
};
pub use retry::{retry_with_backoff, RequestAttempt, RequestError, Retryable, RetryPolicy};
pub use stream::{ConnectionState, EventStreamClient, StreamConfig, StreamError};
