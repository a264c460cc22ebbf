use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use kiosk_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   PaymentStatusType   ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatusType {
    /// A QR code was issued and the gateway has not reported back yet.
    #[default]
    Pending,
    /// The gateway confirmed the payment. This is final.
    Paid,
    /// The gateway reported a failed payment. The customer may still retry with the same QR code.
    Failed,
    /// The QR code expired before it was paid.
    Expired,
}

impl Display for PaymentStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatusType::Pending => write!(f, "pending"),
            PaymentStatusType::Paid => write!(f, "paid"),
            PaymentStatusType::Failed => write!(f, "failed"),
            PaymentStatusType::Expired => write!(f, "expired"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid payment status: {0}")]
pub struct ConversionError(String);

impl FromStr for PaymentStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "expired" => Ok(Self::Expired),
            _ => Err(ConversionError(s.to_string())),
        }
    }
}

//--------------------------------------     PaymentStatus     ---------------------------------------------------------
/// The body of `GET /payment/status/{orderId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatus {
    pub paid: bool,
    pub order_id: OrderId,
    pub order_number: String,
    pub payment_status: PaymentStatusType,
}

impl PaymentStatus {
    pub fn new(order_id: OrderId, order_number: String, payment_status: PaymentStatusType) -> Self {
        Self { paid: payment_status == PaymentStatusType::Paid, order_id, order_number, payment_status }
    }

    pub fn pending(order_id: OrderId, order_number: String) -> Self {
        Self::new(order_id, order_number, PaymentStatusType::Pending)
    }
}

//--------------------------------------      QR payments      ---------------------------------------------------------
/// The body of `POST /payment/create-qr`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQrPayment {
    pub order_id: OrderId,
    pub amount: Money,
}

impl NewQrPayment {
    pub fn new(order_id: OrderId, amount: Money) -> Self {
        Self { order_id, amount }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrPayment {
    pub qr_id: String,
    /// The payload to render as a QR code on the kiosk screen.
    pub qr_string: String,
    pub order_number: String,
    pub amount: Money,
}

//--------------------------------------   Gateway webhooks    ---------------------------------------------------------
/// The callback the payment gateway posts to `/payment/webhook` once it has an outcome for a QR payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentWebhook {
    pub qr_id: String,
    pub order_id: OrderId,
    pub status: PaymentStatusType,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}
