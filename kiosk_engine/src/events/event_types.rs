use std::{convert::Infallible, fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    payment::{OrderId, PaymentStatusType},
    stream::SseFrame,
};

//--------------------------------------       EventKind       ---------------------------------------------------------
/// The names of the events pushed over the server-push topics. Names the kiosk does not know about are kept as
/// `Other`, so newer servers can add events without breaking older kiosks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    OrderCreated,
    OrderStatusChanged,
    OrderPaid,
    CustomCakeMessageReceived,
    CustomCakeStatusChanged,
    MenuUpdated,
    Other(String),
}

impl EventKind {
    pub fn name(&self) -> &str {
        match self {
            EventKind::OrderCreated => "order.created",
            EventKind::OrderStatusChanged => "order.status_changed",
            EventKind::OrderPaid => "order.paid",
            EventKind::CustomCakeMessageReceived => "custom_cake.message_received",
            EventKind::CustomCakeStatusChanged => "custom_cake.status_changed",
            EventKind::MenuUpdated => "menu.updated",
            EventKind::Other(name) => name.as_str(),
        }
    }

    /// The topic an event of this kind is published on, if it is one of the known kinds.
    pub fn topic(&self) -> Option<Topic> {
        match self {
            EventKind::OrderCreated | EventKind::OrderStatusChanged | EventKind::OrderPaid => Some(Topic::Orders),
            EventKind::CustomCakeMessageReceived | EventKind::CustomCakeStatusChanged => Some(Topic::CustomCakes),
            EventKind::MenuUpdated => Some(Topic::Menu),
            EventKind::Other(_) => None,
        }
    }
}

impl FromStr for EventKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "order.created" => EventKind::OrderCreated,
            "order.status_changed" => EventKind::OrderStatusChanged,
            "order.paid" => EventKind::OrderPaid,
            "custom_cake.message_received" => EventKind::CustomCakeMessageReceived,
            "custom_cake.status_changed" => EventKind::CustomCakeStatusChanged,
            "menu.updated" => EventKind::MenuUpdated,
            other => EventKind::Other(other.to_string()),
        };
        Ok(kind)
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(kind) => kind,
            Err(e) => match e {},
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(EventKind::from(name.as_str()))
    }
}

//--------------------------------------         Topic         ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    Orders,
    CustomCakes,
    Menu,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::Orders, Topic::CustomCakes, Topic::Menu];

    pub fn slug(&self) -> &'static str {
        match self {
            Topic::Orders => "orders",
            Topic::CustomCakes => "custom-cakes",
            Topic::Menu => "menu",
        }
    }

    /// The server path of the topic's event stream.
    pub fn path(&self) -> String {
        format!("/sse/{}", self.slug())
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL.into_iter().find(|t| t.slug() == s).ok_or_else(|| format!("Unknown event topic: {s}"))
    }
}

//--------------------------------------      DomainEvent      ---------------------------------------------------------
/// A named event received from (or published to) a topic stream. The payload is opaque JSON: the stream only triggers
/// a refresh, it is not an authoritative log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    #[serde(rename = "event")]
    pub kind: EventKind,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl DomainEvent {
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self { kind, payload, id: None }
    }

    pub fn from_frame(frame: &SseFrame) -> Result<Self, serde_json::Error> {
        let payload = serde_json::from_str(&frame.data)?;
        Ok(Self { kind: EventKind::from(frame.event_name()), payload, id: frame.id.clone() })
    }

    pub fn to_frame(&self) -> SseFrame {
        let frame = SseFrame::new(self.kind.name(), self.payload.to_string());
        match &self.id {
            Some(id) => frame.with_id(id.clone()),
            None => frame,
        }
    }
}

/// Payload of `order.status_changed` and `order.paid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub order_number: String,
    pub status: PaymentStatusType,
}

impl OrderStatusChanged {
    pub fn into_event(self, kind: EventKind) -> DomainEvent {
        let payload = serde_json::to_value(&self).unwrap_or(Value::Null);
        DomainEvent::new(kind, payload)
    }
}
