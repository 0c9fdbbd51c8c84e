//! `POST /convert`.

use axum::{extract::State, Json};
use serde::Serialize;
use validator::Validate;

use crate::config::AppConfig;
use crate::extractors::AppJson;
use crate::middleware::auth::AccountId;
use crate::middleware::error_handling::Result;
use crate::models::{ConvertRequest, Currency};
use crate::services::conversion_service;

#[derive(Debug, Serialize)]
pub struct ConvertedAmounts {
    pub from: u64,
    pub to: u64,
}

#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    pub converted: ConvertedAmounts,
    pub balances: std::collections::BTreeMap<Currency, u64>,
}

pub async fn convert(
    State(config): State<AppConfig>,
    axum::Extension(AccountId(account_id)): axum::Extension<AccountId>,
    AppJson(request): AppJson<ConvertRequest>,
) -> Result<Json<ConvertResponse>> {
    request.validate()?;

    let entry = conversion_service::convert(
        config.store.as_ref(),
        &config.rate_oracle,
        account_id,
        request.from,
        request.to,
        request.amount,
    )
    .await?;

    let to_amount = entry
        .metadata
        .get("toAmount")
        .and_then(|v| v.as_u64())
        .unwrap_or(0);

    let account = config.store.get_account(account_id).await?;

    Ok(Json(ConvertResponse {
        converted: ConvertedAmounts { from: entry.amount, to: to_amount },
        balances: account.balances.0,
    }))
}
