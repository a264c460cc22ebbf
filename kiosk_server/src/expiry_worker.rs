use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use kiosk_engine::{
    events::{EventKind, OrderStatusChanged, Topic},
    payment::PaymentStatus,
};
use log::*;
use tokio::task::JoinHandle;

use crate::{broker::EventBroker, ledger::PaymentLedger};

/// Starts the expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_expiry_worker(
    ledger: PaymentLedger,
    broker: EventBroker,
    qr_expiry: Duration,
    interval: StdDuration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Unpaid QR payment expiry worker started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running unpaid QR payment expiry job");
            let expired = expire_once(&ledger, &broker, qr_expiry).await;
            if !expired.is_empty() {
                info!("🕰️ {} QR payments expired", expired.len());
                debug!("🕰️ Expired orders: {}", order_list(&expired));
            }
        }
    })
}

/// Expires every QR payment that has been pending for longer than `qr_expiry` and tells the kiosks about it.
pub async fn expire_once(ledger: &PaymentLedger, broker: &EventBroker, qr_expiry: Duration) -> Vec<PaymentStatus> {
    let expired = ledger.expire_unpaid(qr_expiry, Utc::now()).await;
    for status in &expired {
        let change = OrderStatusChanged {
            order_id: status.order_id.clone(),
            order_number: status.order_number.clone(),
            status: status.payment_status,
        };
        broker.publish(Topic::Orders, change.into_event(EventKind::OrderStatusChanged));
    }
    expired
}

fn order_list(orders: &[PaymentStatus]) -> String {
    orders.iter().map(|o| format!("[{}] order_id: {}", o.order_number, o.order_id)).collect::<Vec<String>>().join(", ")
}
