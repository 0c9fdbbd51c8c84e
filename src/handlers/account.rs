//! `/getAccount`, `/getTransactions`. Both require a verified identity and
//! only ever return the caller's own account - there is no id parameter to
//! request someone else's, so there is no error path that leaks whether an
//! account exists versus is merely unreadable.

use axum::{extract::{Query, State}, Json};
use serde::Serialize;

use crate::config::AppConfig;
use crate::middleware::auth::AccountId;
use crate::middleware::error_handling::Result;
use crate::models::{AccountResponse, GetTransactionsQuery, Transaction};

const DEFAULT_TRANSACTIONS_LIMIT: i64 = 100;
const MAX_TRANSACTIONS_LIMIT: i64 = 100;

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub transactions: Vec<Transaction>,
}

pub async fn get_account(
    State(config): State<AppConfig>,
    axum::Extension(AccountId(account_id)): axum::Extension<AccountId>,
) -> Result<Json<AccountResponse>> {
    let account = config.store.get_account(account_id).await?;
    Ok(Json(account.into()))
}

pub async fn get_transactions(
    State(config): State<AppConfig>,
    axum::Extension(AccountId(account_id)): axum::Extension<AccountId>,
    Query(params): Query<GetTransactionsQuery>,
) -> Result<Json<TransactionsResponse>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_TRANSACTIONS_LIMIT)
        .clamp(1, MAX_TRANSACTIONS_LIMIT);

    let transactions = config
        .store
        .list_transactions(account_id, limit, params.start_after)
        .await?;

    Ok(Json(TransactionsResponse { transactions }))
}
