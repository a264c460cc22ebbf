use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use thiserror::Error;

use crate::ledger::LedgerError;

/// Every failure a handler can return. The response body is always `{"error": "<message>"}`.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("The server stopped unexpectedly. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The request conflicts with the current state of the order. {0}")]
    Conflict(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationError(AuthError::MissingToken | AuthError::InvalidToken) => StatusCode::UNAUTHORIZED,
            Self::AuthenticationError(AuthError::ForbiddenPeer | AuthError::InvalidSignature) => StatusCode::FORBIDDEN,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::IOError(_) | Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No access token was provided.")]
    MissingToken,
    #[error("The access token is invalid.")]
    InvalidToken,
    #[error("Requests from this address are not allowed.")]
    ForbiddenPeer,
    #[error("The request signature is missing or invalid.")]
    InvalidSignature,
}

impl From<LedgerError> for ServerError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::OrderNotFound(_) | LedgerError::UnknownQrCode(_) => Self::NoRecordFound(e.to_string()),
            LedgerError::AlreadyPaid(_) => Self::Conflict(e.to_string()),
            LedgerError::InvalidAmount(_) => Self::InvalidRequestBody(e.to_string()),
        }
    }
}
