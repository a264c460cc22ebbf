use actix_web::http::StatusCode;
use kiosk_common::{Money, Secret};
use kiosk_engine::{
    events::{EventKind, Topic},
    payment::{NewQrPayment, OrderId, PaymentStatusType, QrPayment},
};

use super::helpers::{init_app, json_post, send, signed_webhook, test_config, webhook_body, WEBHOOK_SECRET};
use crate::{
    config::{ServerConfig, WebhookConfig},
    helpers::calculate_hmac,
    middleware::SIGNATURE_HEADER,
    server::ServerState,
};

async fn state_with_order(config: &ServerConfig) -> (ServerState, QrPayment) {
    let state = ServerState::new(config);
    let request = NewQrPayment::new(OrderId::from("1001"), Money::from(12_500));
    let qr = state.ledger.create_qr(request).await.unwrap().into_qr_payment();
    (state, qr)
}

async fn status_of(state: &ServerState) -> PaymentStatusType {
    state.ledger.status(&OrderId::from("1001")).await.unwrap().payment_status
}

#[actix_web::test]
async fn signed_payment_marks_the_order_paid() {
    let _ = env_logger::try_init();
    let config = test_config();
    let (state, qr) = state_with_order(&config).await;
    let mut orders = state.broker.subscribe(Topic::Orders).unwrap();
    let app = init_app(config, state.clone()).await;

    let (status, body) = send(&app, signed_webhook(&webhook_body(&qr.qr_id, "1001", "paid"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Payment status updated."));
    assert_eq!(status_of(&state).await, PaymentStatusType::Paid);
    let record = state.ledger.record(&OrderId::from("1001")).await.unwrap();
    assert_eq!(record.transaction_id.as_deref(), Some("tx-1001"));

    let changed = orders.recv().await.unwrap();
    assert_eq!(changed.kind, EventKind::OrderStatusChanged);
    assert_eq!(changed.payload["status"], "paid");
    let paid = orders.recv().await.unwrap();
    assert_eq!(paid.kind, EventKind::OrderPaid);
    assert_eq!(paid.payload["order_number"], qr.order_number.as_str());
}

#[actix_web::test]
async fn bad_signatures_are_rejected() {
    let _ = env_logger::try_init();
    let config = test_config();
    let (state, qr) = state_with_order(&config).await;
    let app = init_app(config, state.clone()).await;
    let body = webhook_body(&qr.qr_id, "1001", "paid");

    let forged = calculate_hmac("not-the-secret", body.as_bytes()).unwrap();
    let req = json_post("/payment/webhook", &body).insert_header((SIGNATURE_HEADER, forged));
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, json_post("/payment/webhook", &body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // A valid signature over a different body does not authorise this one
    let signature = calculate_hmac(WEBHOOK_SECRET, webhook_body(&qr.qr_id, "1001", "failed").as_bytes()).unwrap();
    let req = json_post("/payment/webhook", &body).insert_header((SIGNATURE_HEADER, signature));
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert_eq!(status_of(&state).await, PaymentStatusType::Pending);
}

#[actix_web::test]
async fn paid_orders_never_regress() {
    let _ = env_logger::try_init();
    let config = test_config();
    let (state, qr) = state_with_order(&config).await;
    let app = init_app(config, state.clone()).await;

    let (status, _) = send(&app, signed_webhook(&webhook_body(&qr.qr_id, "1001", "paid"))).await;
    assert_eq!(status, StatusCode::OK);
    for late in ["failed", "expired", "pending"] {
        let (status, body) = send(&app, signed_webhook(&webhook_body(&qr.qr_id, "1001", late))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Order is paid. No change was made."));
    }
    assert_eq!(status_of(&state).await, PaymentStatusType::Paid);
}

#[actix_web::test]
async fn failed_payments_can_be_retried_with_a_new_qr_code() {
    let _ = env_logger::try_init();
    let config = test_config();
    let (state, qr) = state_with_order(&config).await;
    let app = init_app(config, state.clone()).await;

    let (status, _) = send(&app, signed_webhook(&webhook_body(&qr.qr_id, "1001", "failed"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(status_of(&state).await, PaymentStatusType::Failed);

    let request = NewQrPayment::new(OrderId::from("1001"), Money::from(12_500));
    let reissued = state.ledger.create_qr(request).await.unwrap().into_qr_payment();
    assert_ne!(reissued.qr_id, qr.qr_id);
    assert_eq!(reissued.order_number, qr.order_number);
    assert_eq!(status_of(&state).await, PaymentStatusType::Pending);
}

#[actix_web::test]
async fn unknown_qr_codes_are_not_found() {
    let _ = env_logger::try_init();
    let config = test_config();
    let (state, _) = state_with_order(&config).await;
    let app = init_app(config, state.clone()).await;
    let (status, _) = send(&app, signed_webhook(&webhook_body("qr_0000000000000000", "1001", "paid"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(status_of(&state).await, PaymentStatusType::Pending);
}

#[actix_web::test]
async fn callbacks_from_outside_the_whitelist_are_forbidden() {
    let _ = env_logger::try_init();
    let config = ServerConfig {
        webhook: WebhookConfig {
            whitelist: Some(vec!["10.1.1.1".parse().unwrap()]),
            ..test_config().webhook
        },
        ..test_config()
    };
    let (state, qr) = state_with_order(&config).await;
    let app = init_app(config, state.clone()).await;
    let body = webhook_body(&qr.qr_id, "1001", "paid");

    let req = signed_webhook(&body).peer_addr("127.0.0.1:40000".parse().unwrap());
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(status_of(&state).await, PaymentStatusType::Pending);

    let req = signed_webhook(&body).peer_addr("10.1.1.1:40000".parse().unwrap());
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(status_of(&state).await, PaymentStatusType::Paid);
}

#[actix_web::test]
async fn an_empty_secret_rejects_every_callback() {
    let _ = env_logger::try_init();
    let mut config = test_config();
    config.webhook = WebhookConfig { secret: Secret::from(""), hmac_checks: true, whitelist: None };
    let (state, qr) = state_with_order(&config).await;
    let app = init_app(config, state.clone()).await;
    let body = webhook_body(&qr.qr_id, "1001", "paid");

    // Signed with the same empty key the server holds
    let signature = calculate_hmac("", body.as_bytes()).unwrap();
    let req = json_post("/payment/webhook", &body).insert_header((SIGNATURE_HEADER, signature));
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(status_of(&state).await, PaymentStatusType::Pending);
}
