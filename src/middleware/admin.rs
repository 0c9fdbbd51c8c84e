//! Admin gate: a constant-time comparison of the `X-Admin-Key` header
//! against the process-local shared secret. Every value that is not
//! byte-equal to the configured key is rejected, including malformed or
//! oversized header values.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::config::AppConfig;
use crate::middleware::error_handling::AppError;
use crate::services::admin_service::verify_admin_key;

pub async fn admin_middleware(
    State(config): State<AppConfig>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = request
        .headers()
        .get("x-admin-key")
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::ForbiddenAdmin)?;

    if !verify_admin_key(presented, &config.admin_api_key) {
        return Err(AppError::ForbiddenAdmin);
    }

    Ok(next.run(request).await)
}
