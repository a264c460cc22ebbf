//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Event streams in particular are long-lived, so their bodies are
//! driven by the broker's broadcast channels and never block a worker.
use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use kiosk_common::Secret;
use kiosk_engine::{
    events::{DomainEvent, EventKind, OrderStatusChanged, Topic},
    payment::{NewQrPayment, OrderId, PaymentStatus, PaymentWebhook},
};
use log::*;
use serde_json::json;

use crate::{
    broker::EventBroker,
    data_objects::{JsonResponse, PublishRequest, PublishResult},
    errors::ServerError,
    helpers::check_bearer,
    ledger::{PaymentLedger, QrOutcome, WebhookOutcome},
};

/// The bearer token kiosks must present, if one is configured.
#[derive(Clone, Debug, Default)]
pub struct AccessToken(pub Option<Secret<String>>);

impl AccessToken {
    pub fn check(&self, req: &HttpRequest) -> Result<(), ServerError> {
        check_bearer(req, self.0.as_ref()).map_err(ServerError::from)
    }
}

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Payments  ----------------------------------------------------
#[get("/payment/status/{order_id}")]
pub async fn payment_status(
    req: HttpRequest,
    path: web::Path<OrderId>,
    token: web::Data<AccessToken>,
    ledger: web::Data<PaymentLedger>,
) -> Result<HttpResponse, ServerError> {
    token.check(&req)?;
    let order_id = path.into_inner();
    trace!("💻️ Fetching payment status for order {order_id}");
    let status = ledger
        .status(&order_id)
        .await
        .ok_or_else(|| ServerError::NoRecordFound(format!("No payment record for order {order_id}")))?;
    Ok(HttpResponse::Ok().json(status))
}

/// Issues a QR code for an order. Kiosks retry this call on network errors, so asking again for a pending order
/// returns the QR code it already has.
#[post("/payment/create-qr")]
pub async fn create_qr(
    req: HttpRequest,
    token: web::Data<AccessToken>,
    ledger: web::Data<PaymentLedger>,
    broker: web::Data<EventBroker>,
    body: web::Json<NewQrPayment>,
) -> Result<HttpResponse, ServerError> {
    token.check(&req)?;
    let request = body.into_inner();
    debug!("💻️ QR payment requested for order {} ({})", request.order_id, request.amount);
    let order_id = request.order_id.clone();
    let outcome = ledger.create_qr(request).await?;
    let qr = outcome.qr_payment();
    match &outcome {
        QrOutcome::NewOrder(_) => {
            let payload = json!({ "order_id": order_id, "order_number": qr.order_number, "amount": qr.amount });
            broker.publish(Topic::Orders, DomainEvent::new(EventKind::OrderCreated, payload));
        },
        QrOutcome::Reissued(_) => {
            if let Some(status) = ledger.status(&order_id).await {
                publish_status_change(&broker, status, false);
            }
        },
        QrOutcome::Existing(_) => {},
    }
    Ok(HttpResponse::Ok().json(outcome.into_qr_payment()))
}

/// Receives payment outcomes from the gateway. The signature and origin checks happen in middleware, before this
/// handler is reached.
pub async fn payment_webhook(
    ledger: web::Data<PaymentLedger>,
    broker: web::Data<EventBroker>,
    body: web::Json<PaymentWebhook>,
) -> Result<HttpResponse, ServerError> {
    let hook = body.into_inner();
    info!("💻️ Payment gateway reports order {} as {} (QR code {})", hook.order_id, hook.status, hook.qr_id);
    match ledger.apply_webhook(&hook).await? {
        WebhookOutcome::Updated(status) => {
            let paid = status.paid;
            publish_status_change(&broker, status, paid);
            Ok(HttpResponse::Ok().json(JsonResponse::success("Payment status updated.")))
        },
        WebhookOutcome::Unchanged(status) => Ok(HttpResponse::Ok()
            .json(JsonResponse::success(format!("Order is {}. No change was made.", status.payment_status)))),
    }
}

fn publish_status_change(broker: &EventBroker, status: PaymentStatus, paid: bool) {
    let PaymentStatus { order_id, order_number, payment_status: status_type, .. } = status;
    let change = OrderStatusChanged { order_id, order_number, status: status_type };
    broker.publish(Topic::Orders, change.clone().into_event(EventKind::OrderStatusChanged));
    if paid {
        broker.publish(Topic::Orders, change.into_event(EventKind::OrderPaid));
    }
}

//----------------------------------------------   Event streams  ----------------------------------------------------
#[get("/sse/{topic}")]
pub async fn event_stream(
    req: HttpRequest,
    path: web::Path<String>,
    token: web::Data<AccessToken>,
    broker: web::Data<EventBroker>,
) -> Result<HttpResponse, ServerError> {
    token.check(&req)?;
    let topic = parse_topic(&path)?;
    info!("💻️ Kiosk subscribed to {topic} events");
    broker.sse_response(topic).ok_or_else(|| ServerError::NoRecordFound(format!("No event stream for {topic}")))
}

/// Lets the back office push menu and custom cake updates to the kiosks.
#[post("/sse/{topic}/publish")]
pub async fn publish_event(
    req: HttpRequest,
    path: web::Path<String>,
    token: web::Data<AccessToken>,
    broker: web::Data<EventBroker>,
    body: web::Json<PublishRequest>,
) -> Result<HttpResponse, ServerError> {
    token.check(&req)?;
    let topic = parse_topic(&path)?;
    let PublishRequest { event, payload } = body.into_inner();
    match event.topic() {
        Some(t) if t != topic => {
            return Err(ServerError::InvalidRequestBody(format!("{event} events belong on the {t} topic")));
        },
        None => warn!("💻️ Publishing an event kiosks may not know about ({event}) on {topic}"),
        _ => {},
    }
    let listeners = broker.publish(topic, DomainEvent::new(event.clone(), payload));
    info!("💻️ Published {event} on {topic} to {listeners} listeners");
    Ok(HttpResponse::Ok().json(PublishResult { event, listeners }))
}

fn parse_topic(path: &str) -> Result<Topic, ServerError> {
    path.parse::<Topic>().map_err(ServerError::NoRecordFound)
}
