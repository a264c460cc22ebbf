//! # Kiosk server
//! The backend the bakery's self-order kiosks talk to. It is responsible for:
//! * Issuing QR payments for orders and reporting their payment status.
//! * Receiving payment outcomes from the payment gateway, and rejecting callbacks that are not signed with the shared
//!   webhook secret.
//! * Pushing order, custom cake and menu events to the kiosks over server-sent event streams.
//! * Expiring QR payments that were never paid.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `GET /health`: A health check route that returns a 200 OK response.
//! * `GET /payment/status/{order_id}`: The payment status of an order.
//! * `POST /payment/create-qr`: Issues (or re-issues) the QR code for an order.
//! * `POST /payment/webhook`: Payment gateway callbacks. Requests must carry a valid `X-Kiosk-Signature`.
//! * `GET /sse/{topic}`: The event stream for `orders`, `custom-cakes` or `menu`.
//! * `POST /sse/{topic}/publish`: Pushes a back-office event to the kiosks listening on a topic.

pub mod broker;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod expiry_worker;
pub mod helpers;
pub mod ledger;
pub mod middleware;
pub mod routes;
pub mod server;
