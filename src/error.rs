//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Bootstrap failures: configuration, datasources, policy output.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config load: {0}")]
    Load(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing model {0} in model config")]
    MissingModel(String),
    #[error("missing or invalid datasource '{datasource}' for model {model}")]
    MissingDatasource { model: String, datasource: String },
    #[error("connector {0} not supported")]
    UnsupportedConnector(String),
    #[error("duplicate model: {0}")]
    DuplicateModel(String),
    #[error("duplicate plural: {0}")]
    DuplicatePlural(String),
    #[error("invalid policy '{policy}' for model {model}")]
    InvalidPolicy { model: String, policy: String },
    #[error("validation: {0}")]
    Validation(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

/// Errors produced while handling an event. Handlers return these unmodified;
/// the transport layer translates them with [`IntoResponse`].
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{message}")]
    Validation {
        code: &'static str,
        message: String,
        field: Option<String>,
    },
    #[error("The `{model}` instance is not valid. Details: `{field}` already exists (value: \"{value}\").")]
    Conflict {
        code: &'static str,
        model: String,
        field: String,
        value: String,
    },
    #[error("login failed")]
    LoginFailed,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("deleted {count} instances for {id}")]
    DeletedCount { id: String, count: u64 },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("no handler registered for event {0}")]
    UnknownEvent(String),
    #[error("datasource: {0}")]
    Datasource(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("hash: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("blocking task: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl AppError {
    pub fn validation(code: &'static str, message: impl Into<String>, field: Option<&str>) -> Self {
        AppError::Validation {
            code,
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    /// HTTP status and stable machine code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            AppError::Validation { code, .. } => (StatusCode::BAD_REQUEST, *code),
            AppError::Conflict { code, .. } => (StatusCode::CONFLICT, *code),
            AppError::LoginFailed => (StatusCode::UNAUTHORIZED, "LOGIN_FAILED"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::DeletedCount { .. } => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::UnknownEvent(_) => (StatusCode::NOT_FOUND, "UNKNOWN_EVENT"),
            AppError::Datasource(_) | AppError::Db(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "DATASOURCE_ERROR")
            }
            AppError::Token(_)
            | AppError::Hash(_)
            | AppError::Serialization(_)
            | AppError::Join(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }

    /// Field-level codes, e.g. `{"email": ["uniqueness"]}`.
    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Validation {
                field: Some(field), ..
            } => Some(serde_json::json!({ "codes": { field.as_str(): ["presence"] } })),
            AppError::Conflict { field, .. } => {
                Some(serde_json::json!({ "codes": { field.as_str(): ["uniqueness"] } }))
            }
            _ => None,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn from_error(err: &AppError) -> Self {
        let (_, code) = err.status_and_code();
        ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: err.to_string(),
                details: err.details(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, _) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(ErrorBody::from_error(&self))).into_response()
    }
}
