//! Error types for the dashboard server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// EIP-1193 style error reported by a wallet provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    pub code: i64,
    pub message: String,
}

impl ProviderError {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNRECOGNIZED_CHAIN: i64 = 4902;
    pub const INTERNAL_ERROR: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::new(Self::INTERNAL_ERROR, format!("Wallet provider unreachable: {}", err))
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.code == Self::UNRECOGNIZED_CHAIN
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Please install MetaMask or a compatible Celo wallet.")]
    ProviderMissing,

    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Configuration(String),

    #[error("AI service error: {0}")]
    AiService(String),

    #[error("Malformed AI response: {0}")]
    MalformedResponse(String),

    #[error("Applet not found: {0}")]
    AppletNotFound(String),

    #[error("Proof not found: {0}")]
    ProofNotFound(String),

    #[error("An invocation is already in progress")]
    InvocationInProgress,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ProviderMissing => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Provider(_) => StatusCode::BAD_GATEWAY,
            AppError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::AiService(_) => StatusCode::BAD_GATEWAY,
            AppError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            AppError::AppletNotFound(_) => StatusCode::NOT_FOUND,
            AppError::ProofNotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvocationInProgress => StatusCode::CONFLICT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            AppError::Internal(_) => "Internal error".to_string(),
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}
