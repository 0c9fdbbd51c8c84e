//! `POST /transfer`. Resolves the sender from the verified identity; the
//! recipient, currency and amount come from the request body.

use axum::{extract::State, Json};
use validator::Validate;

use crate::config::AppConfig;
use crate::extractors::AppJson;
use crate::handlers::BalanceResponse;
use crate::middleware::auth::AccountId;
use crate::middleware::error_handling::Result;
use crate::models::TransferRequest;
use crate::services::transfer_service;

pub async fn transfer(
    State(config): State<AppConfig>,
    axum::Extension(AccountId(account_id)): axum::Extension<AccountId>,
    AppJson(request): AppJson<TransferRequest>,
) -> Result<Json<BalanceResponse>> {
    request.validate()?;

    let (out_entry, _in_entry) = transfer_service::transfer(
        config.store.as_ref(),
        account_id,
        request.to_account_id,
        request.currency,
        request.amount,
        request.description,
    )
    .await?;

    Ok(Json(BalanceResponse { currency: request.currency, balance: out_entry.balance_after }))
}
