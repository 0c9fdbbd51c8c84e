use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::account::Currency;

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "refreshToken is required"))]
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DepositRequest {
    #[serde(rename = "accountId")]
    pub account_id: Uuid,
    #[validate(range(min = 1, message = "amount must be greater than zero"))]
    pub amount: u64,
    pub currency: Currency,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TransferRequest {
    #[serde(rename = "toAccountId")]
    pub to_account_id: Uuid,
    #[validate(range(min = 1, message = "amount must be greater than zero"))]
    pub amount: u64,
    pub currency: Currency,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConvertRequest {
    pub from: Currency,
    pub to: Currency,
    #[validate(range(min = 1, message = "amount must be greater than zero"))]
    pub amount: u64,
}

#[derive(Debug, Deserialize)]
pub struct GetTransactionsQuery {
    pub limit: Option<i64>,
    #[serde(rename = "startAfter")]
    pub start_after: Option<Uuid>,
}
