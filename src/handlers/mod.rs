pub mod account;
pub mod admin;
pub mod auth;
pub mod chat;
pub mod convert;
pub mod health;
pub mod transfer;

use serde::Serialize;

use crate::models::Currency;

/// Shared response shape for `/deposit` and `/transfer`: the post-operation
/// balance in the currency that moved.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub currency: Currency,
    pub balance: u64,
}
