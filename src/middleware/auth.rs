//! Identity middleware. Verifies the bearer credential attached to every
//! authenticated request and fails closed: no store read and no upstream
//! call may precede a successful verification.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::config::AppConfig;
use crate::middleware::error_handling::AppError;
use crate::middleware::metrics::record_auth_failure;

/// The verified account id, attached to the request by [`auth_middleware`]
/// and pulled back out by handlers via `Extension<AccountId>`.
#[derive(Debug, Clone, Copy)]
pub struct AccountId(pub uuid::Uuid);

pub async fn auth_middleware(
    State(config): State<AppConfig>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            record_auth_failure("missing_credential");
            AppError::Unauthenticated
        })?;

    let token = header_value.strip_prefix("Bearer ").ok_or_else(|| {
        record_auth_failure("malformed_header");
        AppError::Unauthenticated
    })?;

    let claims = config.identity.verify(token, &config.gcp_project).await.map_err(|err| {
        record_auth_failure("invalid_token");
        err
    })?;
    let account_id = crate::services::identity_service::account_id_for_uid(&claims.sub);

    request.extensions_mut().insert(AccountId(account_id));
    Ok(next.run(request).await)
}
