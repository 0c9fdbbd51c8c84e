use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::middleware::error_handling::{AppError, Result};
use crate::models::{metadata, Currency, Transaction, TransactionType};
use crate::repositories::AccountStore;

/// Constant-time comparison of a presented admin key against the
/// configured one. A naive `==` short-circuits on the first mismatched
/// byte, which leaks timing information an attacker can use to recover the
/// key one byte at a time.
pub fn verify_admin_key(presented: &str, configured: &str) -> bool {
    // Compare as bytes with a length check first: `subtle::ConstantTimeEq`
    // is only constant-time for equal-length inputs, and the early return
    // only leaks length, not content.
    if presented.len() != configured.len() {
        return false;
    }
    presented.as_bytes().ct_eq(configured.as_bytes()).into()
}

/// Admin-initiated deposit into an account. Requires the admin key to
/// already have been verified by the caller (the HTTP middleware layer) -
/// this function only performs the ledger write.
pub async fn deposit(
    store: &dyn AccountStore,
    account_id: Uuid,
    currency: Currency,
    amount: u64,
    description: Option<String>,
) -> Result<Transaction> {
    if amount == 0 {
        return Err(AppError::InvalidInput("deposit amount must be greater than zero".to_string()));
    }

    store.get_account(account_id).await.map_err(|_| AppError::AccountNotFound)?;

    store
        .apply_entry(
            account_id,
            currency,
            TransactionType::Deposit,
            amount,
            &description.unwrap_or_else(|| "admin deposit".to_string()),
            metadata([("source", serde_json::Value::String("admin".to_string()))]),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryAccountStore;

    #[test]
    fn verify_admin_key_accepts_matching_keys() {
        assert!(verify_admin_key("correct-horse-battery", "correct-horse-battery"));
    }

    #[test]
    fn verify_admin_key_rejects_mismatched_keys() {
        assert!(!verify_admin_key("wrong", "correct-horse-battery"));
    }

    #[test]
    fn verify_admin_key_rejects_different_lengths() {
        assert!(!verify_admin_key("short", "a-much-longer-configured-key"));
    }

    #[tokio::test]
    async fn deposit_credits_the_account() {
        let store = InMemoryAccountStore::new();
        let account = store.create_account(None).await.unwrap();
        let tx = deposit(&store, account.id, Currency::Usd, 1_000, None).await.unwrap();
        assert_eq!(tx.balance_after, 1_000);
    }

    #[tokio::test]
    async fn rejects_zero_amount_deposit() {
        let store = InMemoryAccountStore::new();
        let account = store.create_account(None).await.unwrap();
        let result = deposit(&store, account.id, Currency::Usd, 0, None).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }
}
