//! The IPC bridge between the renderer and the shell.
//!
//! The kiosk web app cannot touch the machine it runs on, so the shell exposes a small HTTP API on the loopback
//! interface. Every request must carry the session token in the `X-Kiosk-Ipc-Token` header. The token is generated
//! when the shell starts and handed to the renderer through its environment.
//!
//! | Route                       | Purpose                                                 |
//! |-----------------------------|---------------------------------------------------------|
//! | `GET /ipc/ping`             | The latest heartbeat ping number (`{"seq": n}`)        |
//! | `POST /ipc/pong`            | The display answers a ping                              |
//! | `POST /ipc/surface-event`   | The display reports a failure, e.g. `did-fail-load`     |
//! | `POST /ipc/reload`          | Ask the watchdog for a recovery                         |
//! | `POST /ipc/relaunch`        | Replace the whole shell                                 |
//! | `GET /ipc/settings[/{key}]` | Read persisted settings                                 |
//! | `PUT /ipc/settings/{key}`   | Store a setting (`null` removes it)                     |
//! | `POST /ipc/print`           | Print a receipt                                         |
use std::{
    net::TcpListener,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use actix_web::{
    dev::{Server, Service},
    get,
    post,
    put,
    web,
    HttpResponse,
    HttpServer,
};
use futures::FutureExt;
use kiosk_common::Secret;
use log::*;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    errors::ShellError,
    printer::{Receipt, ReceiptPrinter},
    settings::SettingsStore,
    watchdog::{DisplaySurface, ProcessControl, SurfaceEvent, Watchdog},
};

pub const IPC_TOKEN_HEADER: &str = "X-Kiosk-Ipc-Token";

/// What the IPC bridge needs from the watchdog.
pub trait Supervisor: Send + Sync + 'static {
    fn record_heartbeat(&self);
    fn surface_event(&self, event: SurfaceEvent);
    /// Returns true if a new recovery was started.
    fn reload(&self) -> bool;
    /// Returns true if this call started the relaunch.
    fn relaunch(&self, reason: &str) -> bool;
}

impl<S: DisplaySurface, P: ProcessControl> Supervisor for Watchdog<S, P> {
    fn record_heartbeat(&self) {
        Watchdog::record_heartbeat(self)
    }

    fn surface_event(&self, event: SurfaceEvent) {
        let _ = self.handle_surface_event(event);
    }

    fn reload(&self) -> bool {
        self.trigger_recovery().is_some()
    }

    fn relaunch(&self, reason: &str) -> bool {
        Watchdog::relaunch(self, reason)
    }
}

#[derive(Clone)]
pub struct IpcState {
    pub token: Secret<String>,
    pub supervisor: Arc<dyn Supervisor>,
    pub pings: Arc<AtomicU64>,
    pub settings: Arc<SettingsStore>,
    pub printer: ReceiptPrinter,
}

/// A random 128-bit session token, hex encoded.
pub fn new_session_token() -> Secret<String> {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    Secret::new(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

pub fn start_ipc_server(listener: TcpListener, state: IpcState) -> Result<Server, ShellError> {
    let addr = listener.local_addr()?;
    let srv = HttpServer::new(move || actix_web::App::new().configure(|cfg| configure_ipc(cfg, &state)))
        .workers(1)
        .listen(listener)?
        .run();
    info!("🔌️ IPC bridge listening on {addr}");
    Ok(srv)
}

pub fn configure_ipc(cfg: &mut web::ServiceConfig, state: &IpcState) {
    let token = state.token.clone();
    let json_config =
        web::JsonConfig::default().error_handler(|e, _req| ShellError::InvalidRequestBody(e.to_string()).into());
    let scope = web::scope("/ipc")
        .wrap_fn(move |req, srv| {
            let local = req.peer_addr().map(|addr| addr.ip().is_loopback()).unwrap_or(false);
            let authorized = req
                .headers()
                .get(IPC_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(|v| token.matches(v))
                .unwrap_or(false);
            if local && authorized {
                srv.call(req).boxed_local()
            } else if !local {
                warn!("🔌️ IPC request from {:?} refused", req.peer_addr());
                async { Err(ShellError::ForbiddenPeer.into()) }.boxed_local()
            } else {
                warn!("🔌️ IPC request to {} without a valid session token", req.path());
                async { Err(ShellError::Unauthorized.into()) }.boxed_local()
            }
        })
        .service(ping)
        .service(pong)
        .service(surface_event)
        .service(reload)
        .service(relaunch)
        .service(all_settings)
        .service(get_setting)
        .service(put_setting)
        .service(print);
    cfg.app_data(json_config)
        .app_data(web::Data::from(Arc::clone(&state.supervisor)))
        .app_data(web::Data::new(Arc::clone(&state.pings)))
        .app_data(web::Data::from(Arc::clone(&state.settings)))
        .app_data(web::Data::new(state.printer.clone()))
        .service(scope);
}

#[derive(Debug, Deserialize)]
pub struct SurfaceEventRequest {
    pub event: SurfaceEvent,
}

#[get("/ping")]
async fn ping(pings: web::Data<Arc<AtomicU64>>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "seq": pings.load(Ordering::SeqCst) }))
}

#[post("/pong")]
async fn pong(supervisor: web::Data<dyn Supervisor>) -> HttpResponse {
    supervisor.record_heartbeat();
    HttpResponse::Ok().json(json!({ "success": true }))
}

#[post("/surface-event")]
async fn surface_event(
    body: web::Json<SurfaceEventRequest>,
    supervisor: web::Data<dyn Supervisor>,
) -> HttpResponse {
    let event = body.into_inner().event;
    debug!("🔌️ The display reported {event}");
    supervisor.surface_event(event);
    HttpResponse::Accepted().json(json!({ "event": event }))
}

#[post("/reload")]
async fn reload(supervisor: web::Data<dyn Supervisor>) -> HttpResponse {
    info!("🔌️ Reload requested by the display");
    let started = supervisor.reload();
    HttpResponse::Accepted().json(json!({ "started": started }))
}

#[post("/relaunch")]
async fn relaunch(supervisor: web::Data<dyn Supervisor>) -> HttpResponse {
    let started = supervisor.relaunch("the display asked for it");
    HttpResponse::Accepted().json(json!({ "started": started }))
}

#[get("/settings")]
async fn all_settings(settings: web::Data<SettingsStore>) -> HttpResponse {
    HttpResponse::Ok().json(settings.all().await)
}

#[get("/settings/{key}")]
async fn get_setting(path: web::Path<String>, settings: web::Data<SettingsStore>) -> Result<HttpResponse, ShellError> {
    let key = path.into_inner();
    let value = settings.get(&key).await.ok_or_else(|| ShellError::NoRecordFound(format!("No setting for {key}")))?;
    Ok(HttpResponse::Ok().json(value))
}

#[put("/settings/{key}")]
async fn put_setting(
    path: web::Path<String>,
    body: web::Json<Value>,
    settings: web::Data<SettingsStore>,
) -> Result<HttpResponse, ShellError> {
    let key = path.into_inner();
    settings.set(&key, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "key": key })))
}

#[post("/print")]
async fn print(body: web::Json<Receipt>, printer: web::Data<ReceiptPrinter>) -> Result<HttpResponse, ShellError> {
    printer.print(&body).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}
