use std::{net::TcpListener, time::Duration};

use actix_web::{
    dev::{Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use futures::FutureExt;
use log::*;

use crate::{
    broker::EventBroker,
    config::{ServerConfig, ServerOptions},
    errors::{AuthError, ServerError},
    expiry_worker::start_expiry_worker,
    helpers::get_remote_ip,
    ledger::PaymentLedger,
    middleware::{HmacMiddlewareFactory, SIGNATURE_HEADER},
    routes::{create_qr, event_stream, health, payment_status, payment_webhook, publish_event, AccessToken},
};

/// The state shared by every worker.
#[derive(Clone)]
pub struct ServerState {
    pub ledger: PaymentLedger,
    pub broker: EventBroker,
}

impl ServerState {
    pub fn new(config: &ServerConfig) -> Self {
        Self { ledger: PaymentLedger::new(), broker: EventBroker::new(config.sse_keepalive) }
    }
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let listener = TcpListener::bind((config.host.as_str(), config.port))?;
    let state = ServerState::new(&config);
    let _worker =
        start_expiry_worker(state.ledger.clone(), state.broker.clone(), config.qr_expiry, config.expiry_check_interval);
    let srv = create_server_instance(config, state, listener)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    state: ServerState,
    listener: TcpListener,
) -> Result<Server, ServerError> {
    let srv = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("kiosk::access_log"))
            .configure(|cfg| configure_routes(cfg, &config, &state))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .listen(listener)?
    .run();
    Ok(srv)
}

/// Registers the app data and every route. Endpoint tests use this to build the same app the server runs.
pub fn configure_routes(cfg: &mut web::ServiceConfig, config: &ServerConfig, state: &ServerState) {
    let options = ServerOptions::from_config(config);
    let whitelist = config.webhook.whitelist.clone();
    let webhook = web::resource("/payment/webhook")
        .wrap(HmacMiddlewareFactory::new(
            SIGNATURE_HEADER,
            config.webhook.secret.clone(),
            config.webhook.hmac_checks,
        ))
        .wrap_fn(move |req, srv| {
            let peer_ip = get_remote_ip(req.request(), options.use_x_forwarded_for, options.use_forwarded);
            let allowed = match (peer_ip, &whitelist) {
                (_, None) => true,
                (Some(ip), Some(whitelist)) => {
                    debug!("💻️ Payment gateway callback from {ip}");
                    whitelist.contains(&ip)
                },
                (None, Some(_)) => {
                    warn!("💻️ No IP address found for a payment gateway callback. Denying access.");
                    false
                },
            };
            if allowed {
                srv.call(req).boxed_local()
            } else {
                warn!("💻️ Payment gateway callback from {peer_ip:?} is not whitelisted. Denying access.");
                async { Err(ServerError::AuthenticationError(AuthError::ForbiddenPeer).into()) }.boxed_local()
            }
        })
        .route(web::post().to(payment_webhook));
    let json_config =
        web::JsonConfig::default().error_handler(|e, _req| ServerError::InvalidRequestBody(e.to_string()).into());
    cfg.app_data(json_config)
        .app_data(web::Data::new(state.ledger.clone()))
        .app_data(web::Data::new(state.broker.clone()))
        .app_data(web::Data::new(AccessToken(config.access_token.clone())))
        .service(health)
        .service(payment_status)
        .service(create_qr)
        .service(webhook)
        .service(event_stream)
        .service(publish_event);
}
