//! Polls the payment status endpoint until the gateway's webhook has landed.
//!
//! The gateway confirms QR payments asynchronously, by calling the backend's webhook. The kiosk does not see that
//! callback, so it asks the backend for the order's payment status every `interval` until one of:
//!
//! * `paid == true` is observed: the poll resolves with that status and no further request is made,
//! * `max_attempts` statuses have been seen without `paid`: the poll fails with [`PollError::Timeout`],
//! * a status request fails: the poll fails with [`PollError::StatusCheck`] straight away,
//! * the caller cancels: the poll fails with [`PollError::Cancelled`].
//!
//! Cycles are strictly sequential. The next request is only scheduled once the previous one has settled.
use std::time::Duration;

use kiosk_common::helpers::env_or_default;
use log::*;
use thiserror::Error;
use tokio::sync::watch;

use crate::{
    payment::{OrderId, PaymentStatus, PaymentStatusSource},
    retry::RequestError,
};

pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 120;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

pub const PAYMENT_TIMEOUT_MESSAGE: &str =
    "We could not confirm your payment in time. Please ask a member of staff for assistance.";

#[derive(Debug, Clone, Error)]
pub enum PollError {
    #[error("{} (order {order_id}, {attempts} checks)", PAYMENT_TIMEOUT_MESSAGE)]
    Timeout { order_id: OrderId, attempts: u32 },
    #[error("Could not check the payment status for order {order_id} (check {attempts}). {source}")]
    StatusCheck { order_id: OrderId, attempts: u32, source: RequestError },
    #[error("Payment polling for order {order_id} was cancelled after {attempts} checks.")]
    Cancelled { order_id: OrderId, attempts: u32 },
}

impl PollError {
    /// Number of status requests that completed before the poll ended.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Timeout { attempts, .. } | Self::StatusCheck { attempts, .. } | Self::Cancelled { attempts, .. } => {
                *attempts
            },
        }
    }

    /// True when the customer should be sent to a member of staff rather than simply retrying.
    pub fn is_user_actionable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_POLL_MAX_ATTEMPTS, interval: DEFAULT_POLL_INTERVAL }
    }
}

impl PollOptions {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self { max_attempts, interval }
    }

    pub fn from_env_or_default() -> Self {
        let max_attempts = env_or_default("KIOSK_POLL_MAX_ATTEMPTS", DEFAULT_POLL_MAX_ATTEMPTS).max(1);
        let interval_ms = env_or_default("KIOSK_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL.as_millis() as u64);
        Self { max_attempts, interval: Duration::from_millis(interval_ms) }
    }

    /// The longest a poll can run for, ignoring request latency.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

//--------------------------------------     Cancellation      ---------------------------------------------------------
/// Held by whoever started the poll, e.g. the checkout screen. Cancelling (or dropping) it stops the poll.
#[derive(Debug)]
pub struct PollCanceller(watch::Sender<bool>);

impl PollCanceller {
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

impl Drop for PollCanceller {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    async fn cancelled(&mut self) {
        // An error means the canceller is gone, which counts as a cancellation too.
        let _ = self.0.wait_for(|cancelled| *cancelled).await;
    }
}

pub fn cancel_pair() -> (PollCanceller, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (PollCanceller(tx), CancelSignal(rx))
}

//--------------------------------------    PaymentPoller      ---------------------------------------------------------
pub struct PaymentPoller<S> {
    source: S,
    options: PollOptions,
}

impl<S> PaymentPoller<S> {
    pub fn new(source: S, options: PollOptions) -> Self {
        Self { source, options }
    }

    pub fn options(&self) -> PollOptions {
        self.options
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S> PaymentPoller<S>
where S: PaymentStatusSource
{
    /// Polls until the order is paid. `on_update` receives every status that was fetched, in order, including the
    /// final one.
    pub async fn poll<F>(&self, order_id: &OrderId, on_update: F) -> Result<PaymentStatus, PollError>
    where F: FnMut(&PaymentStatus) {
        let (_canceller, signal) = cancel_pair();
        self.run(order_id, on_update, signal, false).await
    }

    /// As [`Self::poll`], but stops with [`PollError::Cancelled`] as soon as `cancel` fires, including while a status
    /// request is in flight.
    pub async fn poll_with_cancel<F>(
        &self,
        order_id: &OrderId,
        on_update: F,
        cancel: CancelSignal,
    ) -> Result<PaymentStatus, PollError>
    where
        F: FnMut(&PaymentStatus),
    {
        self.run(order_id, on_update, cancel, true).await
    }

    async fn run<F>(
        &self,
        order_id: &OrderId,
        mut on_update: F,
        mut cancel: CancelSignal,
        cancellable: bool,
    ) -> Result<PaymentStatus, PollError>
    where
        F: FnMut(&PaymentStatus),
    {
        let max_attempts = self.options.max_attempts.max(1);
        let mut attempts = 0u32;
        info!("💳️ Polling payment status for order {order_id} (up to {max_attempts} checks)");
        loop {
            if cancellable && cancel.is_cancelled() {
                info!("💳️ Payment polling for order {order_id} cancelled");
                return Err(PollError::Cancelled { order_id: order_id.clone(), attempts });
            }
            let fetched = if cancellable {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!("💳️ Payment polling for order {order_id} cancelled during a status check");
                        return Err(PollError::Cancelled { order_id: order_id.clone(), attempts });
                    },
                    res = self.source.fetch_payment_status(order_id) => res,
                }
            } else {
                self.source.fetch_payment_status(order_id).await
            };
            attempts += 1;
            let status = fetched.map_err(|source| {
                warn!("💳️ Payment status check {attempts} for order {order_id} failed. {source}");
                PollError::StatusCheck { order_id: order_id.clone(), attempts, source }
            })?;
            trace!("💳️ Check {attempts}/{max_attempts} for order {order_id}: {}", status.payment_status);
            on_update(&status);
            if status.paid {
                info!("💳️ Order {order_id} ({}) is paid after {attempts} checks", status.order_number);
                return Ok(status);
            }
            if attempts >= max_attempts {
                warn!("💳️ Order {order_id} was not paid after {attempts} checks. Giving up.");
                return Err(PollError::Timeout { order_id: order_id.clone(), attempts });
            }
            if cancellable {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!("💳️ Payment polling for order {order_id} cancelled");
                        return Err(PollError::Cancelled { order_id: order_id.clone(), attempts });
                    },
                    _ = tokio::time::sleep(self.options.interval) => {},
                }
            } else {
                tokio::time::sleep(self.options.interval).await;
            }
        }
    }
}
