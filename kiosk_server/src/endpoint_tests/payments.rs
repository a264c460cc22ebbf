use actix_web::{http::StatusCode, test::TestRequest};
use kiosk_common::Money;
use kiosk_engine::payment::{OrderId, PaymentStatus, PaymentStatusType, PaymentWebhook, QrPayment};

use super::helpers::{authorized, init_app, json_post, send, test_config};
use crate::server::ServerState;

const NEW_ORDER: &str = r#"{"order_id":"1001","amount":12500}"#;

#[actix_web::test]
async fn health_check() {
    let _ = env_logger::try_init();
    let config = test_config();
    let app = init_app(config.clone(), ServerState::new(&config)).await;
    let (status, body) = send(&app, TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
}

#[actix_web::test]
async fn payment_endpoints_need_the_access_token() {
    let _ = env_logger::try_init();
    let config = test_config();
    let app = init_app(config.clone(), ServerState::new(&config)).await;
    let (status, body) = send(&app, TestRequest::get().uri("/payment/status/1001")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.contains("No access token was provided."));

    let req = TestRequest::get().uri("/payment/status/1001").insert_header(("Authorization", "Bearer wrong"));
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, json_post("/payment/create-qr", NEW_ORDER)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn open_server_needs_no_token() {
    let _ = env_logger::try_init();
    let config = crate::config::ServerConfig { access_token: None, ..test_config() };
    let app = init_app(config.clone(), ServerState::new(&config)).await;
    let (status, _) = send(&app, json_post("/payment/create-qr", NEW_ORDER)).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn unknown_orders_are_not_found() {
    let _ = env_logger::try_init();
    let config = test_config();
    let app = init_app(config.clone(), ServerState::new(&config)).await;
    let (status, body) = send(&app, authorized(TestRequest::get().uri("/payment/status/9999"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("No payment record for order #9999"));
}

#[actix_web::test]
async fn create_qr_then_check_status() {
    let _ = env_logger::try_init();
    let config = test_config();
    let state = ServerState::new(&config);
    let app = init_app(config, state).await;

    let (status, body) = send(&app, authorized(json_post("/payment/create-qr", NEW_ORDER))).await;
    assert_eq!(status, StatusCode::OK);
    let qr: QrPayment = serde_json::from_str(&body).unwrap();
    assert_eq!(qr.amount, Money::from(12_500));
    assert_eq!(qr.order_number, "K-0001");
    assert!(qr.qr_string.starts_with("KIOSKPAY|"));

    // Retrying the request hands back the same QR code
    let (status, body) = send(&app, authorized(json_post("/payment/create-qr", NEW_ORDER))).await;
    assert_eq!(status, StatusCode::OK);
    let again: QrPayment = serde_json::from_str(&body).unwrap();
    assert_eq!(again, qr);

    let (status, body) = send(&app, authorized(TestRequest::get().uri("/payment/status/1001"))).await;
    assert_eq!(status, StatusCode::OK);
    let payment: PaymentStatus = serde_json::from_str(&body).unwrap();
    assert_eq!(payment, PaymentStatus::pending(OrderId::from("1001"), "K-0001".into()));
}

#[actix_web::test]
async fn bad_qr_requests() {
    let _ = env_logger::try_init();
    let config = test_config();
    let app = init_app(config.clone(), ServerState::new(&config)).await;
    let (status, body) =
        send(&app, authorized(json_post("/payment/create-qr", r#"{"order_id":"1001","amount":0}"#))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Payment amounts must be positive"));

    let (status, body) = send(&app, authorized(json_post("/payment/create-qr", r#"{"order_id":"1001"}"#))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Could not read request body"));
}

#[actix_web::test]
async fn paid_orders_get_no_new_qr_code() {
    let _ = env_logger::try_init();
    let config = test_config();
    let state = ServerState::new(&config);
    let qr = state.ledger.create_qr(serde_json::from_str(NEW_ORDER).unwrap()).await.unwrap().into_qr_payment();
    let hook = PaymentWebhook {
        qr_id: qr.qr_id,
        order_id: OrderId::from("1001"),
        status: PaymentStatusType::Paid,
        transaction_id: None,
        paid_at: None,
    };
    state.ledger.apply_webhook(&hook).await.unwrap();
    let app = init_app(config, state).await;
    let (status, body) = send(&app, authorized(json_post("/payment/create-qr", NEW_ORDER))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("has already been paid"));
}
