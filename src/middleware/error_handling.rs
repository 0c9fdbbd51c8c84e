//! Central error type and its HTTP mapping.
//!
//! Every variant here corresponds to one entry in the gateway's error
//! taxonomy: a stable `code` string clients can match on, plus a status
//! code and a message safe to return verbatim. Internal causes (database
//! failures, upstream transport failures, JSON corruption) are logged with
//! `tracing::error!` server-side and never echoed to the caller - detailed
//! error messages never leave the process.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("no credential presented")]
    Unauthenticated,

    #[error("identity token invalid or expired")]
    InvalidToken,

    #[error("admin key missing or incorrect")]
    ForbiddenAdmin,

    #[error("validation error: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("invalid request body: {0}")]
    InvalidInput(String),

    #[error("account not found")]
    AccountNotFound,

    #[error("recipient account not found")]
    RecipientNotFound,

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("provider not configured: {0}")]
    ProviderUnconfigured(String),

    /// Upstream responded with a non-2xx HTTP status. Forward that exact
    /// status code to the caller (429/5xx passthrough), carrying only a
    /// redacted envelope - never the provider's raw body, which may echo
    /// request content or leak provider-internal detail.
    #[error("upstream provider returned {status}: {message}")]
    UpstreamStatus { status: u16, message: String },

    #[error("upstream provider unreachable")]
    UpstreamUnreachable,

    // Every database interaction can fail for reasons the caller cannot
    // act on (connection loss, deadlock abort, row-lock timeout); this
    // variant maps all of them to an opaque 500 so the store layer can
    // propagate with `?` rather than hand-matching sqlx::Error everywhere.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    // Malformed JSON either at the axum extractor layer or during
    // (de)serialization of stored documents. Both map to a client-visible
    // validation failure.
    #[error("json error: {0}")]
    Json(#[from] JsonRejection),

    #[error("json error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "UNAUTHENTICATED",
            AppError::InvalidToken => "INVALID_TOKEN",
            AppError::ForbiddenAdmin => "FORBIDDEN_ADMIN",
            AppError::Validation(_) | AppError::InvalidInput(_) | AppError::Json(_) => "VALIDATION",
            AppError::AccountNotFound => "ACCOUNT_NOT_FOUND",
            AppError::RecipientNotFound => "RECIPIENT_NOT_FOUND",
            AppError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            AppError::ProviderUnconfigured(_) => "PROVIDER_UNCONFIGURED",
            AppError::UpstreamStatus { .. } => "UPSTREAM_ERROR",
            AppError::UpstreamUnreachable => "UPSTREAM_UNREACHABLE",
            AppError::Database(_) | AppError::JsonParsing(_) | AppError::Internal(_) => "INTERNAL",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Unauthenticated | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::ForbiddenAdmin => StatusCode::FORBIDDEN,
            AppError::Validation(_) | AppError::InvalidInput(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::AccountNotFound | AppError::RecipientNotFound => StatusCode::NOT_FOUND,
            AppError::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
            // A secret fetch failure surfaces as upstream-unavailable, not
            // as a routing error.
            AppError::ProviderUnconfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::UpstreamStatus { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            // Network/timeout errors reaching the provider map to 500.
            AppError::UpstreamUnreachable => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) | AppError::JsonParsing(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = match &self {
            AppError::Database(err) => {
                tracing::error!("database error: {:?}", err);
                "internal server error".to_string()
            }
            AppError::JsonParsing(err) => {
                tracing::error!("json parsing error: {:?}", err);
                "invalid json format".to_string()
            }
            AppError::Internal(err) => {
                tracing::error!("internal error: {:?}", err);
                "internal server error".to_string()
            }
            AppError::Validation(errors) => errors.to_string(),
            AppError::InvalidInput(msg) => msg.clone(),
            AppError::Json(err) => err.body_text(),
            AppError::ProviderUnconfigured(model) => format!("no provider is configured for model '{model}'"),
            AppError::UpstreamStatus { message, .. } => message.clone(),
            other => other.to_string(),
        };

        let code = self.code();
        let body = Json(json!({
            "error": { "code": code, "message": message },
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
