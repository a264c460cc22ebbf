//! The in-memory record of QR payments.
//!
//! Every order has at most one live QR payment. The ledger enforces the rules the kiosk relies on:
//!
//! * Requesting a QR code for an order with an unpaid QR code of the same amount returns the existing one, so the
//!   kiosk may safely retry the request.
//! * A paid order never changes status again. Late or repeated gateway callbacks are acknowledged and ignored.
//! * `failed` and `expired` only replace a `pending` status. A new QR code may be issued for such an order.
use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use kiosk_common::{Money, BAKERY_CURRENCY_CODE};
use kiosk_engine::payment::{NewQrPayment, OrderId, PaymentStatus, PaymentStatusType, PaymentWebhook, QrPayment};
use log::*;
use rand::Rng;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Order {0} is not known")]
    OrderNotFound(OrderId),
    #[error("QR code {0} is not known")]
    UnknownQrCode(String),
    #[error("Order {0} has already been paid")]
    AlreadyPaid(OrderId),
    #[error("Payment amounts must be positive, but {0} was requested")]
    InvalidAmount(Money),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub order_id: OrderId,
    pub order_number: String,
    pub qr_id: String,
    pub qr_string: String,
    pub amount: Money,
    pub status: PaymentStatusType,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    pub fn payment_status(&self) -> PaymentStatus {
        PaymentStatus::new(self.order_id.clone(), self.order_number.clone(), self.status)
    }

    pub fn qr_payment(&self) -> QrPayment {
        QrPayment {
            qr_id: self.qr_id.clone(),
            qr_string: self.qr_string.clone(),
            order_number: self.order_number.clone(),
            amount: self.amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrOutcome {
    /// A QR code was issued for an order the ledger had not seen before.
    NewOrder(QrPayment),
    /// A new QR code replaced a failed, expired or differently priced one.
    Reissued(QrPayment),
    /// The order already had a matching unpaid QR code.
    Existing(QrPayment),
}

impl QrOutcome {
    pub fn qr_payment(&self) -> &QrPayment {
        match self {
            Self::NewOrder(qr) | Self::Reissued(qr) | Self::Existing(qr) => qr,
        }
    }

    pub fn into_qr_payment(self) -> QrPayment {
        match self {
            Self::NewOrder(qr) | Self::Reissued(qr) | Self::Existing(qr) => qr,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Updated(PaymentStatus),
    Unchanged(PaymentStatus),
}

#[derive(Default)]
struct LedgerInner {
    records: HashMap<OrderId, PaymentRecord>,
    // every QR code ever issued, including replaced ones
    qr_codes: HashMap<String, OrderId>,
    issued_orders: u64,
}

#[derive(Clone, Default)]
pub struct PaymentLedger {
    inner: Arc<RwLock<LedgerInner>>,
}

impl PaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_qr(&self, request: NewQrPayment) -> Result<QrOutcome, LedgerError> {
        if !request.amount.is_positive() {
            return Err(LedgerError::InvalidAmount(request.amount));
        }
        let now = Utc::now();
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let (qr_id, qr_string, order_number, is_new) = match inner.records.get(&request.order_id) {
            Some(record) if record.status == PaymentStatusType::Paid => {
                return Err(LedgerError::AlreadyPaid(request.order_id));
            },
            Some(record) if record.status == PaymentStatusType::Pending && record.amount == request.amount => {
                debug!("💳️ Order {} already has QR code {}", record.order_id, record.qr_id);
                return Ok(QrOutcome::Existing(record.qr_payment()));
            },
            Some(record) => {
                let qr_id = new_qr_id();
                let qr_string = qr_payload(&qr_id, &record.order_number, request.amount);
                (qr_id, qr_string, record.order_number.clone(), false)
            },
            None => {
                inner.issued_orders += 1;
                let order_number = format!("K-{:04}", inner.issued_orders);
                let qr_id = new_qr_id();
                let qr_string = qr_payload(&qr_id, &order_number, request.amount);
                (qr_id, qr_string, order_number, true)
            },
        };
        let record = PaymentRecord {
            order_id: request.order_id.clone(),
            order_number,
            qr_id: qr_id.clone(),
            qr_string,
            amount: request.amount,
            status: PaymentStatusType::Pending,
            transaction_id: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
        };
        let qr = record.qr_payment();
        info!("💳️ Issued QR code {qr_id} for {} {BAKERY_CURRENCY_CODE} on order {}", record.amount, record.order_id);
        inner.qr_codes.insert(qr_id, request.order_id.clone());
        inner.records.insert(request.order_id, record);
        Ok(if is_new { QrOutcome::NewOrder(qr) } else { QrOutcome::Reissued(qr) })
    }

    pub async fn status(&self, order_id: &OrderId) -> Option<PaymentStatus> {
        self.inner.read().await.records.get(order_id).map(PaymentRecord::payment_status)
    }

    pub async fn record(&self, order_id: &OrderId) -> Option<PaymentRecord> {
        self.inner.read().await.records.get(order_id).cloned()
    }

    /// Applies a payment gateway callback.
    ///
    /// A `paid` callback for any QR code that was issued for the order marks it as paid, even if the code has since
    /// been replaced: the customer's money has moved either way.
    pub async fn apply_webhook(&self, hook: &PaymentWebhook) -> Result<WebhookOutcome, LedgerError> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        match inner.qr_codes.get(&hook.qr_id) {
            Some(order_id) if *order_id == hook.order_id => {},
            _ => return Err(LedgerError::UnknownQrCode(hook.qr_id.clone())),
        }
        let record =
            inner.records.get_mut(&hook.order_id).ok_or_else(|| LedgerError::OrderNotFound(hook.order_id.clone()))?;
        if record.status == PaymentStatusType::Paid {
            debug!("💳️ Order {} is already paid. Ignoring the {} callback.", record.order_id, hook.status);
            return Ok(WebhookOutcome::Unchanged(record.payment_status()));
        }
        let is_current_qr = record.qr_id == hook.qr_id;
        let now = Utc::now();
        match hook.status {
            PaymentStatusType::Paid => {
                record.status = PaymentStatusType::Paid;
                record.transaction_id.clone_from(&hook.transaction_id);
                record.paid_at = Some(hook.paid_at.unwrap_or(now));
            },
            PaymentStatusType::Failed | PaymentStatusType::Expired
                if is_current_qr && record.status == PaymentStatusType::Pending =>
            {
                record.status = hook.status;
            },
            _ => {
                debug!("💳️ Ignoring the {} callback for order {}", hook.status, record.order_id);
                return Ok(WebhookOutcome::Unchanged(record.payment_status()));
            },
        }
        record.updated_at = now;
        info!("💳️ Order {} ({}) is now {}", record.order_id, record.order_number, record.status);
        Ok(WebhookOutcome::Updated(record.payment_status()))
    }

    /// Marks every QR payment that has been pending since before `now - max_age` as expired, and returns their new
    /// statuses.
    pub async fn expire_unpaid(&self, max_age: Duration, now: DateTime<Utc>) -> Vec<PaymentStatus> {
        let cutoff = now - max_age;
        let mut inner = self.inner.write().await;
        inner
            .records
            .values_mut()
            .filter(|r| r.status == PaymentStatusType::Pending && r.created_at <= cutoff)
            .map(|r| {
                r.status = PaymentStatusType::Expired;
                r.updated_at = now;
                r.payment_status()
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }
}

fn new_qr_id() -> String {
    format!("qr_{:016x}", rand::thread_rng().gen::<u64>())
}

fn qr_payload(qr_id: &str, order_number: &str, amount: Money) -> String {
    format!("KIOSKPAY|{qr_id}|{order_number}|{amount}|{BAKERY_CURRENCY_CODE}")
}
