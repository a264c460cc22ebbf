use std::{sync::Arc, time::Duration};

use cucumber::{gherkin::Step, then, when};
use e2e::helpers::json_is_subset_of;
use kiosk_common::Money;
use kiosk_engine::{
    payment::{NewQrPayment, OrderId, PaymentStatusType},
    PaymentPoller,
    PollOptions,
    RequestError,
};
use log::debug;
use reqwest::{Method, StatusCode};
use serde_json::json;

use crate::cucumber::KioskWorld;

#[then("the server is running")]
async fn server_is_running(world: &mut KioskWorld) {
    let (code, body) = world.get("/health").await;
    assert_eq!(code.as_u16(), 200);
    assert_eq!(body, "👍️\n");
}

#[when(expr = "the kiosk requests a QR payment of {int} for order {string}")]
async fn request_qr(world: &mut KioskWorld, amount: i64, order_id: String) {
    let payment = NewQrPayment::new(OrderId::from(order_id.as_str()), Money::from(amount));
    match world.client().create_qr_payment(&payment).await {
        Ok(qr) => {
            debug!("🌍️ Got QR payment {qr:?}");
            let body = serde_json::to_string(&qr).expect("QR payment is not serializable");
            world.response = Some((StatusCode::OK, body));
            world.order_id = Some(order_id);
            world.previous_qr = world.qr.replace(qr);
        },
        Err(RequestError::Status { status, message }) => {
            world.response = Some((StatusCode::from_u16(status).expect("Invalid status"), message));
        },
        Err(e) => panic!("Requesting a QR payment failed. {e}"),
    }
}

#[then(expr = "the kiosk shows a QR code for {int}")]
async fn shows_qr_code(world: &mut KioskWorld, amount: i64) {
    let qr = world.qr.as_ref().expect("No QR payment was issued");
    assert_eq!(qr.amount, Money::from(amount));
    assert!(!qr.qr_string.is_empty(), "The QR code is empty");
    assert!(!qr.order_number.is_empty(), "There is no order number to show");
}

#[then("the kiosk is shown the same QR code again")]
async fn same_qr_code(world: &mut KioskWorld) {
    let previous = world.previous_qr.as_ref().expect("Only one QR payment was requested");
    let current = world.qr.as_ref().expect("No QR payment was issued");
    assert_eq!(previous, current);
}

#[when(expr = "the kiosk starts polling the payment for order {string}")]
async fn start_polling(world: &mut KioskWorld, order_id: String) {
    let poller = PaymentPoller::new(world.client(), PollOptions::new(50, Duration::from_millis(200)));
    let updates = Arc::clone(&world.updates);
    let order_id = OrderId::from(order_id.as_str());
    world.poll = Some(tokio::spawn(async move {
        poller
            .poll(&order_id, |status| updates.lock().expect("Update log poisoned").push(status.payment_status))
            .await
    }));
}

#[when(expr = "the payment gateway reports the payment as {string}")]
async fn gateway_reports(world: &mut KioskWorld, status: String) {
    let secret = world.config.webhook.secret.reveal().clone();
    let body = webhook_body(world, &status);
    let res = world.post_webhook(body, &secret).await;
    world.response = Some(res);
}

#[when(expr = "someone reports the payment as {string} with a forged signature")]
async fn forged_report(world: &mut KioskWorld, status: String) {
    let body = webhook_body(world, &status);
    let res = world.post_webhook(body, "not-the-gateway-secret").await;
    world.response = Some(res);
}

#[then("the poller resolves with a paid status")]
async fn poller_resolves(world: &mut KioskWorld) {
    let poll = world.poll.take().expect("The kiosk is not polling");
    let result = tokio::time::timeout(Duration::from_secs(15), poll)
        .await
        .expect("The poller did not finish")
        .expect("The poller panicked");
    let status = result.expect("Polling failed");
    assert!(status.paid);
    let updates = world.updates.lock().expect("Update log poisoned").clone();
    assert_eq!(updates.last(), Some(&PaymentStatusType::Paid));
    assert!(updates[..updates.len() - 1].iter().all(|s| *s == PaymentStatusType::Pending), "{updates:?}");
}

#[then(expr = "the kiosk is notified with {string} for order {string}")]
async fn notified_for_order(world: &mut KioskWorld, kind: String, order_id: String) {
    let event = world.wait_for_event(&kind).await.unwrap_or_else(|| panic!("No {kind} event arrived"));
    assert_eq!(event.payload["order_id"], json!(order_id));
}

#[then(expr = "the kiosk is notified with {string}")]
async fn notified(world: &mut KioskWorld, kind: String) {
    assert!(world.wait_for_event(&kind).await.is_some(), "No {kind} event arrived");
}

#[then(expr = "the payment status for order {string} is {string}")]
async fn payment_status_is(world: &mut KioskWorld, order_id: String, expected: String) {
    let status = world.client().payment_status(&OrderId::from(order_id.as_str())).await.expect("No payment status");
    assert_eq!(status.payment_status.to_string(), expected);
}

#[when(expr = "the back office publishes {string} to the {string} topic")]
async fn back_office_publishes(world: &mut KioskWorld, event: String, topic: String) {
    let body = json!({ "event": event, "payload": { "items": ["Sourdough", "Kouign-amann"] } }).to_string();
    let res = world
        .request(Method::POST, &format!("/sse/{topic}/publish"), |req| {
            req.header("Content-Type", "application/json").body(body)
        })
        .await;
    world.response = Some(res);
}

#[then(regex = r"^I receive a (\d+) (.+) response$")]
async fn receive_response_code(world: &mut KioskWorld, status: u16, text: String) {
    let (res_status, res_msg) = world.response.clone().expect("No response received");
    assert_eq!(res_status, status, "Expected {status} {text} response, got {res_status}: {res_msg}");
}

#[then(expr = "I receive a partial JSON response:")]
async fn receive_json_response(world: &mut KioskWorld, step: &Step) {
    let (_res_status, res_msg) = world.response.take().expect("No response received");
    let expected = step.docstring().expect("No expected response");
    assert!(json_is_subset_of(expected, res_msg.as_str()), "Expected response to be '{expected}', got '{res_msg}'");
}

fn webhook_body(world: &KioskWorld, status: &str) -> String {
    let qr = world.qr.as_ref().expect("No QR payment was issued");
    let order_id = world.order_id.as_ref().expect("No order was placed");
    json!({ "qr_id": qr.qr_id, "order_id": order_id, "status": status, "transaction_id": format!("tx-{}", qr.qr_id) })
        .to_string()
}
