use std::sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    Arc,
};

use futures_util::StreamExt;
use kiosk_common::Secret;
use log::*;
use tokio::{sync::watch, task::JoinHandle};
use url::Url;

use crate::{
    events::{DomainEvent, EventHandler, EventProducer, Handler, StreamHooks},
    retry::RetryPolicy,
    stream::{ByteStream, SseDecoder, StreamError, StreamTransport},
};

/// Queued events per client before the connection task waits for handlers to catch up.
const DISPATCH_BUFFER: usize = 64;

pub type ErrorCallback = Arc<dyn Fn(&StreamError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Error,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: Url,
    pub token: Option<Secret<String>>,
    pub enabled: bool,
    pub reconnect: RetryPolicy,
}

impl StreamConfig {
    pub fn new(url: Url) -> Self {
        Self { url, token: None, enabled: true, reconnect: RetryPolicy::reconnect_default() }
    }

    pub fn with_token(mut self, token: Option<Secret<String>>) -> Self {
        self.token = token;
        self
    }

    pub fn with_reconnect_policy(mut self, policy: RetryPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// A resilient listener for one server-push topic.
///
/// The client owns at most one live connection. Events received on it are decoded and passed, in order, to the
/// handler registered for their kind in the client's [`StreamHooks`]. Unknown events are dropped.
///
/// When the connection fails or the server closes it, the client reconnects after a backoff delay, for as long as it
/// stays enabled. Missed events are not replayed: consumers are expected to re-fetch whatever the stream told them
/// has changed.
///
/// The client must be created inside a Tokio runtime. Dropping it closes the connection.
pub struct EventStreamClient<T: StreamTransport> {
    transport: Arc<T>,
    config: StreamConfig,
    producer: EventProducer<(u64, DomainEvent)>,
    on_error: Option<ErrorCallback>,
    state: Arc<watch::Sender<ConnectionState>>,
    generation: Arc<AtomicU64>,
    retries: Arc<AtomicU32>,
    connection: Option<JoinHandle<()>>,
}

impl<T: StreamTransport> EventStreamClient<T> {
    pub fn new(transport: T, config: StreamConfig, hooks: StreamHooks) -> Self {
        let generation = Arc::new(AtomicU64::new(0));
        let dispatcher = EventHandler::new(DISPATCH_BUFFER, current_connection_only(&generation, hooks));
        let producer = dispatcher.subscribe();
        tokio::spawn(dispatcher.start_handler());
        let (state, _) = watch::channel(ConnectionState::Closed);
        Self {
            transport: Arc::new(transport),
            config,
            producer,
            on_error: None,
            state: Arc::new(state),
            generation,
            retries: Arc::new(AtomicU32::new(0)),
            connection: None,
        }
    }

    /// Registers a callback that is told about every connection failure. It is for observability only; the client
    /// recovers from these errors by itself.
    pub fn on_error<F>(mut self, f: F) -> Self
    where F: Fn(&StreamError) + Send + Sync + 'static {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// The number of consecutive failed connection attempts. Reset to zero whenever a connection opens.
    pub fn retry_count(&self) -> u32 {
        self.retries.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.connection.is_some()
    }

    /// Starts (or restarts) the connection. Any previous connection is closed first. Does nothing while disabled.
    pub fn connect(&mut self) {
        self.close_connection();
        if !self.config.enabled {
            debug!("📡️ Event stream for {} is disabled. Not connecting.", self.config.url);
            return;
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.retries.store(0, Ordering::SeqCst);
        let task = ConnectionTask {
            transport: Arc::clone(&self.transport),
            url: self.config.url.clone(),
            token: self.config.token.clone(),
            policy: self.config.reconnect,
            producer: self.producer.clone(),
            on_error: self.on_error.clone(),
            reporter: StateReporter {
                generation,
                current: Arc::clone(&self.generation),
                state: Arc::clone(&self.state),
            },
            retries: Arc::clone(&self.retries),
        };
        self.connection = Some(tokio::spawn(task.run()));
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
        match (enabled, self.is_running()) {
            (true, false) => self.connect(),
            (false, true) => {
                info!("📡️ Event stream for {} disabled", self.config.url);
                self.close_connection();
            },
            _ => {},
        }
    }

    /// Points the client at a new URL and/or token. The current connection is closed before the new one opens, so
    /// there is never more than one live connection.
    pub fn reconfigure(&mut self, url: Url, token: Option<Secret<String>>) {
        if url == self.config.url && token == self.config.token {
            return;
        }
        info!("📡️ Event stream moving from {} to {url}", self.config.url);
        self.config.url = url;
        self.config.token = token;
        if self.config.enabled {
            self.connect();
        } else {
            self.close_connection();
        }
    }

    pub fn disconnect(&mut self) {
        self.close_connection();
    }

    fn close_connection(&mut self) {
        if let Some(task) = self.connection.take() {
            debug!("📡️ Closing event stream for {}", self.config.url);
            // Bump the generation so the aborted task can no longer report state changes.
            self.generation.fetch_add(1, Ordering::SeqCst);
            task.abort();
        }
        self.state.send_replace(ConnectionState::Closed);
    }
}

impl<T: StreamTransport> Drop for EventStreamClient<T> {
    fn drop(&mut self) {
        if let Some(task) = self.connection.take() {
            task.abort();
        }
    }
}

/// Events are tagged with the connection they arrived on. Events still queued when that connection is closed are
/// dropped instead of dispatched.
fn current_connection_only(generation: &Arc<AtomicU64>, hooks: StreamHooks) -> Handler<(u64, DomainEvent)> {
    let current = Arc::clone(generation);
    let dispatch = hooks.into_handler();
    Arc::new(move |(connection, event): (u64, DomainEvent)| {
        let current = Arc::clone(&current);
        let dispatch = Arc::clone(&dispatch);
        Box::pin(async move {
            if current.load(Ordering::SeqCst) != connection {
                trace!("📡️ Dropping a {} event from a closed connection", event.kind);
                return;
            }
            dispatch(event).await;
        })
    })
}

struct StateReporter {
    generation: u64,
    current: Arc<AtomicU64>,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl StateReporter {
    fn set(&self, state: ConnectionState) {
        if self.current.load(Ordering::SeqCst) == self.generation {
            self.state.send_replace(state);
        }
    }
}

struct ConnectionTask<T> {
    transport: Arc<T>,
    url: Url,
    token: Option<Secret<String>>,
    policy: RetryPolicy,
    producer: EventProducer<(u64, DomainEvent)>,
    on_error: Option<ErrorCallback>,
    reporter: StateReporter,
    retries: Arc<AtomicU32>,
}

impl<T: StreamTransport> ConnectionTask<T> {
    async fn run(self) {
        let mut failures = 0u32;
        loop {
            self.reporter.set(ConnectionState::Connecting);
            debug!("📡️ Connecting to {}", self.url);
            let outcome = match self.transport.open(&self.url, self.token.as_ref()).await {
                Ok(body) => {
                    info!("📡️ Connected to {}", self.url);
                    failures = 0;
                    self.retries.store(0, Ordering::SeqCst);
                    self.reporter.set(ConnectionState::Open);
                    self.pump(body).await
                },
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => {
                    info!("📡️ {} closed the event stream", self.url);
                    self.reporter.set(ConnectionState::Closed);
                    self.notify(&StreamError::Closed);
                },
                Err(e) => {
                    warn!("📡️ Event stream {} failed. {e}", self.url);
                    self.reporter.set(ConnectionState::Error);
                    self.notify(&e);
                },
            }
            failures = failures.saturating_add(1);
            self.retries.store(failures, Ordering::SeqCst);
            let delay = self.policy.delay_for(failures);
            info!("📡️ Reconnecting to {} in {}ms (attempt {failures})", self.url, delay.as_millis());
            tokio::time::sleep(delay).await;
        }
    }

    async fn pump(&self, mut body: ByteStream) -> Result<(), StreamError> {
        let mut decoder = SseDecoder::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for frame in decoder.feed(&chunk) {
                match DomainEvent::from_frame(&frame) {
                    Ok(event) => {
                        trace!("📡️ Received {} from {}", event.kind, self.url);
                        self.producer.publish_event((self.reporter.generation, event)).await;
                    },
                    Err(e) => warn!("📡️ Ignoring a {} event with an unreadable payload. {e}", frame.event_name()),
                }
            }
        }
        Ok(())
    }

    fn notify(&self, e: &StreamError) {
        if let Some(on_error) = &self.on_error {
            on_error(e);
        }
    }
}
