use std::{future::poll_fn, pin::Pin, time::Duration};

use actix_http::Request;
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceResponse},
    http::{header::ContentType, StatusCode},
    test,
    test::TestRequest,
    web::Bytes,
    App,
    Error,
};
use kiosk_common::Secret;
use log::debug;

use crate::{
    config::{ServerConfig, WebhookConfig},
    helpers::calculate_hmac,
    middleware::SIGNATURE_HEADER,
    server::{configure_routes, ServerState},
};

pub const ACCESS_TOKEN: &str = "kiosk-token";
// DO NOT re-use this key anywhere.
pub const WEBHOOK_SECRET: &str = "gateway-secret-for-tests";

pub fn test_config() -> ServerConfig {
    ServerConfig {
        access_token: Some(Secret::from(ACCESS_TOKEN)),
        webhook: WebhookConfig { secret: Secret::from(WEBHOOK_SECRET), hmac_checks: true, whitelist: None },
        ..Default::default()
    }
}

pub async fn init_app(
    config: ServerConfig,
    state: ServerState,
) -> impl Service<Request, Response = ServiceResponse<BoxBody>, Error = Error> {
    test::init_service(App::new().configure(move |cfg| configure_routes(cfg, &config, &state))).await
}

/// Sends the request and returns the status and body, whether the request was handled or rejected by middleware.
pub async fn send<S>(app: &S, req: TestRequest) -> (StatusCode, String)
where S: Service<Request, Response = ServiceResponse<BoxBody>, Error = Error> {
    debug!("Making request");
    match test::try_call_service(app, req.to_request()).await {
        Ok(res) => {
            let status = res.status();
            let body = test::read_body(res).await;
            (status, String::from_utf8_lossy(&body).into_owned())
        },
        Err(e) => (e.as_response_error().status_code(), e.to_string()),
    }
}

pub fn authorized(req: TestRequest) -> TestRequest {
    req.insert_header(("Authorization", format!("Bearer {ACCESS_TOKEN}")))
}

pub fn json_post(path: &str, body: &str) -> TestRequest {
    TestRequest::post().uri(path).insert_header(ContentType::json()).set_payload(body.to_string())
}

pub fn signed_webhook(body: &str) -> TestRequest {
    let signature = calculate_hmac(WEBHOOK_SECRET, body.as_bytes()).unwrap();
    json_post("/payment/webhook", body).insert_header((SIGNATURE_HEADER, signature))
}

pub fn webhook_body(qr_id: &str, order_id: &str, status: &str) -> String {
    format!(r#"{{"qr_id":"{qr_id}","order_id":"{order_id}","status":"{status}","transaction_id":"tx-{order_id}"}}"#)
}

/// Reads the next chunk of a streaming body, giving up after a few seconds.
pub async fn next_chunk(body: &mut Pin<Box<BoxBody>>) -> Option<Bytes> {
    let next = poll_fn(|cx| body.as_mut().poll_next(cx));
    tokio::time::timeout(Duration::from_secs(5), next).await.ok()??.ok()
}
