use std::{collections::HashMap, future::Future, sync::Arc};

use log::*;

use crate::events::{DomainEvent, EventKind, Handler};

/// The dispatch table of a stream consumer: at most one handler per [`EventKind`].
///
/// ```rust,ignore
/// let mut hooks = StreamHooks::default();
/// hooks.on_order_status_changed(move |ev| {
///     let cache = cache.clone();
///     async move { cache.invalidate_orders(ev.payload).await }
/// });
/// ```
#[derive(Default, Clone)]
pub struct StreamHooks {
    handlers: HashMap<EventKind, Handler<DomainEvent>>,
}

impl StreamHooks {
    /// Registers `f` for events of `kind`, replacing any earlier handler for the same kind.
    pub fn on<F, Fut>(&mut self, kind: EventKind, f: F) -> &mut Self
    where
        F: Fn(DomainEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler<DomainEvent> = Arc::new(move |ev| Box::pin(f(ev)));
        if self.handlers.insert(kind.clone(), handler).is_some() {
            debug!("📡️ Replaced the handler for {kind}");
        }
        self
    }

    pub fn on_order_created<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(DomainEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on(EventKind::OrderCreated, f)
    }

    pub fn on_order_status_changed<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(DomainEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on(EventKind::OrderStatusChanged, f)
    }

    pub fn on_custom_cake_message<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(DomainEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on(EventKind::CustomCakeMessageReceived, f)
    }

    pub fn on_menu_updated<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(DomainEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on(EventKind::MenuUpdated, f)
    }

    pub fn handles(&self, kind: &EventKind) -> bool {
        self.handlers.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs the handler registered for the event's kind. Returns false if there is none, in which case the event is
    /// dropped.
    pub async fn dispatch(&self, event: DomainEvent) -> bool {
        match self.handlers.get(&event.kind) {
            Some(handler) => {
                trace!("📡️ Dispatching {}", event.kind);
                handler(event).await;
                true
            },
            None => {
                trace!("📡️ No handler for {}. Ignoring it.", event.kind);
                false
            },
        }
    }

    /// Collapses the table into a single handler, for use with [`crate::events::EventHandler`].
    pub fn into_handler(self) -> Handler<DomainEvent> {
        let hooks = Arc::new(self);
        Arc::new(move |event| {
            let hooks = Arc::clone(&hooks);
            Box::pin(async move {
                hooks.dispatch(event).await;
            })
        })
    }
}
