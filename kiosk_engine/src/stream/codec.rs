//! A small `text/event-stream` codec.
//!
//! [`SseDecoder`] is fed raw body chunks as they arrive and yields complete [`SseFrame`]s. Chunks may split lines (and
//! multibyte characters) anywhere. Lines end in `\n`, `\r\n` or `\r`. Comment lines (starting with `:`) and unknown
//! fields are skipped. A frame with no `data:` line is not dispatched.
use std::fmt::Write;

use bytes::Bytes;
use log::*;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseFrame {
    /// The event name. `None` is the default `message` event.
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseFrame {
    pub fn new(event: &str, data: String) -> Self {
        Self { event: Some(event.to_string()), data, id: None }
    }

    pub fn with_id(mut self, id: String) -> Self {
        self.id = Some(id);
        self
    }

    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }

    /// Serializes the frame, including the blank line that terminates it.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.data.len() + 32);
        if let Some(event) = &self.event {
            let _ = writeln!(out, "event: {event}");
        }
        if let Some(id) = &self.id {
            let _ = writeln!(out, "id: {id}");
        }
        for line in self.data.split('\n') {
            let _ = writeln!(out, "data: {line}");
        }
        out.push('\n');
        out
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.encode())
    }
}

/// A comment frame. Clients ignore these; servers send them to keep idle connections alive.
pub fn comment(text: &str) -> Bytes {
    Bytes::from(format!(": {text}\n\n"))
}

/// Lines longer than this are dropped rather than buffered.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    max_line: usize,
    // set while skipping the rest of a line that grew past `max_line`
    overflowed: bool,
    // set when the previous chunk ended in '\r', so that a leading '\n' in the next chunk is not a second line break
    skip_lf: bool,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
    last_event_id: Option<String>,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line_length(MAX_LINE_LENGTH)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_length(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line: max_line.max(1),
            overflowed: false,
            skip_lf: false,
            event: None,
            data: Vec::new(),
            id: None,
            last_event_id: None,
        }
    }

    /// The most recent `id:` value seen on this stream.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        for &byte in chunk {
            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => self.end_line(&mut frames),
                b'\r' => {
                    self.end_line(&mut frames);
                    self.skip_lf = true;
                },
                _ if self.overflowed => {},
                _ if self.buffer.len() >= self.max_line => {
                    warn!("📡️ Dropping an event stream line longer than {} bytes", self.max_line);
                    self.buffer = Vec::new();
                    self.overflowed = true;
                },
                b => self.buffer.push(b),
            }
        }
        frames
    }

    fn end_line(&mut self, frames: &mut Vec<SseFrame>) {
        if self.overflowed {
            self.overflowed = false;
            return;
        }
        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        if line.is_empty() {
            if let Some(frame) = self.take_frame() {
                frames.push(frame);
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_str(), ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" if !value.contains('\0') => self.id = Some(value.to_string()),
            _ => {},
        }
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let id = self.id.take();
        if id.is_some() {
            self.last_event_id.clone_from(&id);
        }
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame { event, data, id })
    }
}
