//! Fans domain events out to the kiosks listening on each topic's event stream.
//!
//! Each [`Topic`] has its own broadcast channel. Subscribers that fall too far behind skip the events they missed
//! (they are told with a comment line); kiosks re-fetch state after reconnecting anyway, so nothing is replayed.
use std::{
    convert::Infallible,
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use actix_web::{http::header, HttpResponse};
use bytes::Bytes;
use futures::{stream, Stream, StreamExt};
use kiosk_engine::{
    events::{DomainEvent, Topic},
    stream::comment,
};
use log::*;
use tokio::{
    sync::broadcast,
    time::{interval_at, Instant, Interval, MissedTickBehavior},
};

const TOPIC_CAPACITY: usize = 256;
// tokio intervals need a non-zero period
const MIN_KEEPALIVE: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct EventBroker {
    channels: Arc<HashMap<Topic, broadcast::Sender<DomainEvent>>>,
    next_id: Arc<AtomicU64>,
    keepalive: Duration,
}

impl EventBroker {
    pub fn new(keepalive: Duration) -> Self {
        let channels = Topic::ALL.into_iter().map(|topic| (topic, broadcast::channel(TOPIC_CAPACITY).0)).collect();
        if keepalive < MIN_KEEPALIVE {
            warn!("📡️ A keep-alive period of {keepalive:?} is too short. Using {MIN_KEEPALIVE:?}.");
        }
        let keepalive = keepalive.max(MIN_KEEPALIVE);
        Self { channels: Arc::new(channels), next_id: Arc::new(AtomicU64::new(1)), keepalive }
    }

    fn channel(&self, topic: Topic) -> Option<&broadcast::Sender<DomainEvent>> {
        self.channels.get(&topic)
    }

    /// Publishes the event to everyone listening on `topic`, stamping it with an event id. Returns the number of
    /// listeners that received it.
    pub fn publish(&self, topic: Topic, mut event: DomainEvent) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        event.id = Some(id.to_string());
        let Some(channel) = self.channel(topic) else {
            return 0;
        };
        match channel.send(event) {
            Ok(n) => {
                trace!("📡️ Published event {id} on {topic} to {n} listeners");
                n
            },
            Err(_) => {
                trace!("📡️ Nobody is listening on {topic}. Event {id} dropped.");
                0
            },
        }
    }

    /// Publishes the event on the topic its kind belongs to. Returns `None` for unknown kinds.
    pub fn publish_by_kind(&self, event: DomainEvent) -> Option<usize> {
        let topic = event.kind.topic()?;
        Some(self.publish(topic, event))
    }

    pub fn listeners(&self, topic: Topic) -> usize {
        self.channel(topic).map(|c| c.receiver_count()).unwrap_or_default()
    }

    pub fn subscribe(&self, topic: Topic) -> Option<broadcast::Receiver<DomainEvent>> {
        self.channel(topic).map(|c| c.subscribe())
    }

    /// The `text/event-stream` body for one listener on `topic`.
    pub fn event_stream(&self, topic: Topic) -> Option<impl Stream<Item = Result<Bytes, Infallible>>> {
        let rx = self.subscribe(topic)?;
        let mut ticker = interval_at(Instant::now() + self.keepalive, self.keepalive);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("📡️ New listener on {topic}");
        let hello = stream::once(async move { Ok(comment(&format!("connected to {topic}"))) });
        let events = stream::unfold(Listener { topic, rx, ticker }, Listener::next_chunk);
        Some(hello.chain(events))
    }

    pub fn sse_response(&self, topic: Topic) -> Option<HttpResponse> {
        let body = self.event_stream(topic)?;
        let response = HttpResponse::Ok()
            .content_type("text/event-stream")
            .insert_header((header::CACHE_CONTROL, "no-cache"))
            .insert_header(("X-Accel-Buffering", "no"))
            .streaming(body);
        Some(response)
    }
}

struct Listener {
    topic: Topic,
    rx: broadcast::Receiver<DomainEvent>,
    ticker: Interval,
}

impl Listener {
    async fn next_chunk(mut self) -> Option<(Result<Bytes, Infallible>, Self)> {
        let chunk = tokio::select! {
            msg = self.rx.recv() => match msg {
                Ok(event) => event.to_frame().to_bytes(),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("📡️ A listener on {} fell behind and skipped {n} events", self.topic);
                    comment(&format!("skipped {n} events"))
                },
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("📡️ The {} channel closed", self.topic);
                    return None;
                },
            },
            _ = self.ticker.tick() => comment("keep-alive"),
        };
        Some((Ok(chunk), self))
    }
}
