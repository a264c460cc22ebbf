use std::fmt::Display;

use kiosk_engine::events::EventKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }
}

/// A back-office request to push an event to every kiosk listening on a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub event: EventKind,
    #[serde(default)]
    pub payload: Value,
}

/// The response to a publish request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResult {
    pub event: EventKind,
    pub listeners: usize,
}
