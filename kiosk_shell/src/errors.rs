use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use thiserror::Error;

use crate::watchdog::SurfaceError;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Invalid shell configuration. {0}")]
    ConfigurationError(String),
    #[error("An I/O error happened in the shell. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Display error. {0}")]
    SurfaceError(#[from] SurfaceError),
    #[error("The IPC session token is missing or invalid.")]
    Unauthorized,
    #[error("IPC requests must come from this machine.")]
    ForbiddenPeer,
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Could not save the settings. {0}")]
    SettingsError(String),
    #[error("The receipt printer is not available. {0}")]
    PrinterUnavailable(String),
}

impl ResponseError for ShellError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ForbiddenPeer => StatusCode::FORBIDDEN,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::PrinterUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ConfigurationError(_) | Self::IOError(_) | Self::SurfaceError(_) | Self::SettingsError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}
