//! `POST /deposit`. Gated by [`crate::middleware::admin::admin_middleware`]
//! at the router layer - by the time this handler runs, the `X-Admin-Key`
//! header has already been verified.

use axum::{extract::State, Json};
use validator::Validate;

use crate::config::AppConfig;
use crate::extractors::AppJson;
use crate::handlers::BalanceResponse;
use crate::middleware::error_handling::Result;
use crate::models::DepositRequest;
use crate::services::admin_service;

pub async fn deposit(
    State(config): State<AppConfig>,
    AppJson(request): AppJson<DepositRequest>,
) -> Result<Json<BalanceResponse>> {
    request.validate()?;

    let entry = admin_service::deposit(
        config.store.as_ref(),
        request.account_id,
        request.currency,
        request.amount,
        None,
    )
    .await?;

    Ok(Json(BalanceResponse { currency: request.currency, balance: entry.balance_after }))
}
