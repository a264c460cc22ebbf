use std::{error::Error as StdError, fmt::Display, io};

use thiserror::Error;

/// Connection-level failures that are worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorCode {
    ConnectionRefused,
    HostNotFound,
    TimedOut,
    ConnectionReset,
}

impl Display for NetworkErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            Self::ConnectionRefused => "ECONNREFUSED",
            Self::HostNotFound => "ENOTFOUND",
            Self::TimedOut => "ETIMEDOUT",
            Self::ConnectionReset => "ECONNRESET",
        };
        f.write_str(code)
    }
}

impl NetworkErrorCode {
    fn from_io_kind(kind: io::ErrorKind) -> Option<Self> {
        match kind {
            io::ErrorKind::ConnectionRefused => Some(Self::ConnectionRefused),
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe => {
                Some(Self::ConnectionReset)
            },
            io::ErrorKind::TimedOut => Some(Self::TimedOut),
            _ => None,
        }
    }
}

/// Decides whether a failed operation may be attempted again.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// No response was received. `code` is `None` when the failure could not be classified.
    #[error("Network error{}: {message}", code_suffix(.code))]
    Network { code: Option<NetworkErrorCode>, message: String },
    #[error("The request timed out or was aborted. {0}")]
    Timeout(String),
    #[error("Request failed with status {status}. {message}")]
    Status { status: u16, message: String },
    #[error("Could not read the response. {0}")]
    InvalidResponse(String),
    #[error("Could not build the request. {0}")]
    InvalidRequest(String),
}

fn code_suffix(code: &Option<NetworkErrorCode>) -> String {
    code.map(|c| format!(" ({c})")).unwrap_or_default()
}

impl RequestError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn network_code(&self) -> Option<NetworkErrorCode> {
        match self {
            Self::Network { code, .. } => *code,
            _ => None,
        }
    }
}

impl Retryable for RequestError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Network { code, .. } => code.is_some(),
            Self::Timeout(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::InvalidResponse(_) | Self::InvalidRequest(_) => false,
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout(e.to_string());
        }
        if let Some(status) = e.status() {
            return Self::Status { status: status.as_u16(), message: e.to_string() };
        }
        // A body that breaks off halfway is a transport failure, even though reqwest reports it as a decode error
        let code = network_code_from_source(&e);
        if code.is_none() && e.is_decode() {
            return Self::InvalidResponse(e.to_string());
        }
        if e.is_builder() {
            return Self::InvalidRequest(e.to_string());
        }
        let code = code.or_else(|| e.is_connect().then(|| connect_failure_code(&e)));
        Self::Network { code, message: e.to_string() }
    }
}

// reqwest wraps the hyper and io errors; walk the chain to find the underlying io error, if any.
fn network_code_from_source(e: &reqwest::Error) -> Option<NetworkErrorCode> {
    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if let Some(code) = NetworkErrorCode::from_io_kind(io_err.kind()) {
                return Some(code);
            }
        }
        source = err.source();
    }
    None
}

fn connect_failure_code(e: &reqwest::Error) -> NetworkErrorCode {
    let mut source = e.source();
    while let Some(err) = source {
        let msg = err.to_string().to_lowercase();
        if msg.contains("dns") || msg.contains("lookup") || msg.contains("resolve") {
            return NetworkErrorCode::HostNotFound;
        }
        source = err.source();
    }
    NetworkErrorCode::ConnectionRefused
}
