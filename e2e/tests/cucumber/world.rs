use std::{
    fmt,
    net::TcpListener,
    sync::{mpsc::channel, Arc, Mutex},
    time::Duration,
};

use actix_web::dev::ServerHandle;
use cucumber::World;
use kiosk_common::Secret;
use kiosk_engine::{
    events::{DomainEvent, EventKind, StreamHooks, Topic},
    payment::{PaymentStatus, PaymentStatusType, QrPayment},
    stream::HttpStreamTransport,
    BackendClient,
    ClientConfig,
    ConnectionState,
    EventStreamClient,
    PollError,
    RetryPolicy,
};
use kiosk_server::{
    config::{ServerConfig, WebhookConfig},
    helpers::calculate_hmac,
    middleware::SIGNATURE_HEADER,
    server::{create_server_instance, ServerState},
};
use log::*;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use tokio::task::JoinHandle;
use url::Url;

#[derive(World)]
pub struct KioskWorld {
    pub config: ServerConfig,
    pub base_url: String,
    pub server_handle: Option<ServerHandle>,
    pub order_id: Option<String>,
    pub qr: Option<QrPayment>,
    pub previous_qr: Option<QrPayment>,
    pub streams: Vec<EventStreamClient<HttpStreamTransport>>,
    // Every event the kiosk's stream handlers received, in order
    pub events: Arc<Mutex<Vec<DomainEvent>>>,
    pub poll: Option<JoinHandle<Result<PaymentStatus, PollError>>>,
    pub updates: Arc<Mutex<Vec<PaymentStatusType>>>,
    pub response: Option<(StatusCode, String)>,
}

impl fmt::Debug for KioskWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KioskWorld")
            .field("base_url", &self.base_url)
            .field("qr", &self.qr)
            .field("streams", &self.streams.len())
            .field("response", &self.response)
            .finish()
    }
}

impl Default for KioskWorld {
    fn default() -> Self {
        let _ = env_logger::try_init().ok();
        let config = ServerConfig { host: "127.0.0.1".into(), port: 0, ..Default::default() };
        Self {
            config,
            base_url: String::default(),
            server_handle: None,
            order_id: None,
            qr: None,
            previous_qr: None,
            streams: Vec::new(),
            events: Arc::new(Mutex::new(Vec::new())),
            poll: None,
            updates: Arc::new(Mutex::new(Vec::new())),
            response: None,
        }
    }
}

impl KioskWorld {
    pub fn set_access_token(&mut self, token: &str) {
        self.config.access_token = Some(Secret::from(token));
    }

    pub fn set_webhook_secret(&mut self, secret: &str) {
        self.config.webhook = WebhookConfig { secret: Secret::from(secret), hmac_checks: true, whitelist: None };
    }

    pub fn start_server(&mut self) {
        let listener = TcpListener::bind((self.config.host.as_str(), 0)).expect("Could not bind a test port");
        let port = listener.local_addr().expect("No local address").port();
        self.config.port = port;
        self.base_url = format!("http://{}:{port}", self.config.host);
        let config = self.config.clone();
        let state = ServerState::new(&config);
        info!("🌍️ Starting server on {}", self.base_url);
        let (tx, rx) = channel();
        tokio::spawn(async move {
            let srv = create_server_instance(config, state, listener).expect("Error creating server instance");
            let _res = tx.send(srv.handle());
            match srv.await {
                Ok(_) => info!("🌍️ Server shut down"),
                Err(e) => warn!("🌍️ Server error: {e}"),
            }
        });
        let handle = rx.recv().expect("The server did not start");
        info!("🌍️ Server started");
        self.server_handle = Some(handle);
    }

    /// The kiosk's backend client, with quick retries so failing scenarios fail fast.
    pub fn client(&self) -> BackendClient {
        let url = Url::parse(&self.base_url).expect("Invalid server URL");
        let retry = RetryPolicy { base_delay: Duration::from_millis(50), ..RetryPolicy::api_default() };
        let mut config = ClientConfig::new(url).with_retry_policy(retry).with_timeout(Duration::from_secs(5));
        if let Some(token) = &self.config.access_token {
            config = config.with_token(token.clone());
        }
        BackendClient::new(config).expect("Could not create the backend client")
    }

    /// Connects an event stream for `topic` that records every event it receives, and waits until it is open.
    pub async fn listen(&mut self, topic: Topic) {
        let mut hooks = StreamHooks::default();
        for kind in topic_kinds(topic) {
            let events = Arc::clone(&self.events);
            hooks.on(EventKind::from(*kind), move |ev| {
                let events = Arc::clone(&events);
                async move {
                    debug!("🌍️ Kiosk received {}", ev.kind);
                    events.lock().expect("Event log poisoned").push(ev);
                }
            });
        }
        let mut stream = self.client().event_stream(topic, hooks).expect("Could not create the event stream");
        let mut state = stream.subscribe_state();
        stream.connect();
        let opened = tokio::time::timeout(Duration::from_secs(5), state.wait_for(|s| *s == ConnectionState::Open)).await;
        assert!(matches!(opened, Ok(Ok(_))), "The {topic} stream did not open");
        self.streams.push(stream);
    }

    pub fn stop_listening(&mut self) {
        for mut stream in self.streams.drain(..) {
            stream.disconnect();
        }
    }

    /// Waits up to five seconds for an event of `kind` to arrive.
    pub async fn wait_for_event(&self, kind: &str) -> Option<DomainEvent> {
        for _ in 0..100 {
            let found = self.events.lock().expect("Event log poisoned").iter().find(|e| e.kind.name() == kind).cloned();
            if found.is_some() {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        None
    }

    pub async fn get(&self, path: &str) -> (StatusCode, String) {
        self.request(Method::GET, path, |req| req).await
    }

    pub async fn request<F>(&self, method: Method, path: &str, req: F) -> (StatusCode, String)
    where F: FnOnce(RequestBuilder) -> RequestBuilder {
        let url = format!("{}{path}", self.base_url);
        debug!("🌍️ Querying {url}");
        let client = Client::new();
        let request = client.request(method, url);
        let mut request = req(request);
        if let Some(token) = &self.config.access_token {
            debug!("🌍️ Adding auth token to request");
            request = request.bearer_auth(token.reveal());
        }
        let res = request.send().await.expect("Error getting response");
        let code = res.status();
        let body = res.text().await.expect("Error parsing response body");
        (code, body)
    }

    /// Posts a payment gateway callback, signed with `secret`.
    pub async fn post_webhook(&self, body: String, secret: &str) -> (StatusCode, String) {
        let signature = calculate_hmac(secret, body.as_bytes()).expect("Could not sign the webhook");
        self.request(Method::POST, "/payment/webhook", |req| {
            req.header(SIGNATURE_HEADER, signature).header("Content-Type", "application/json").body(body)
        })
        .await
    }
}

fn topic_kinds(topic: Topic) -> &'static [&'static str] {
    match topic {
        Topic::Orders => &["order.created", "order.status_changed", "order.paid"],
        Topic::CustomCakes => &["custom_cake.message_received", "custom_cake.status_changed"],
        Topic::Menu => &["menu.updated"],
    }
}
