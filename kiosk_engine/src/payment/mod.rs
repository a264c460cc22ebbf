//! Payment objects and the payment status poller.
mod payment_objects;
pub mod poller;

pub use payment_objects::{
    ConversionError,
    NewQrPayment,
    OrderId,
    PaymentStatus,
    PaymentStatusType,
    PaymentWebhook,
    QrPayment,
};

use crate::retry::RequestError;

/// Anything that can report the current payment status of an order. [`crate::BackendClient`] is the production
/// implementation.
#[allow(async_fn_in_trait)]
pub trait PaymentStatusSource {
    async fn fetch_payment_status(&self, order_id: &OrderId) -> Result<PaymentStatus, RequestError>;
}

impl<T: PaymentStatusSource> PaymentStatusSource for &T {
    async fn fetch_payment_status(&self, order_id: &OrderId) -> Result<PaymentStatus, RequestError> {
        (**self).fetch_payment_status(order_id).await
    }
}
