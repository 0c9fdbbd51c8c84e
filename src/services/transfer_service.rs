use uuid::Uuid;

use crate::middleware::error_handling::{AppError, Result};
use crate::models::{Currency, Transaction};
use crate::repositories::AccountStore;

/// Agent-to-agent transfer. Validates the request shape, then delegates
/// the atomic two-leg write to the store.
pub async fn transfer(
    store: &dyn AccountStore,
    from: Uuid,
    to: Uuid,
    currency: Currency,
    amount: u64,
    description: Option<String>,
) -> Result<(Transaction, Transaction)> {
    if from == to {
        return Err(AppError::InvalidInput("cannot transfer to the same account".to_string()));
    }
    if amount == 0 {
        return Err(AppError::InvalidInput("transfer amount must be greater than zero".to_string()));
    }

    // `get_account` surfaces ACCOUNT_NOT_FOUND/RECIPIENT_NOT_FOUND as
    // distinct errors before the store's own lock-then-fail path would
    // otherwise collapse both into one generic not-found.
    store.get_account(from).await.map_err(|_| AppError::AccountNotFound)?;
    store.get_account(to).await.map_err(|_| AppError::RecipientNotFound)?;

    let description = description.unwrap_or_else(|| "agent transfer".to_string());
    store.transfer(from, to, currency, amount, &description).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionType;
    use crate::repositories::InMemoryAccountStore;

    #[tokio::test]
    async fn transfers_between_two_distinct_accounts() {
        let store = InMemoryAccountStore::new();
        let sender = store.create_account(None).await.unwrap();
        let recipient = store.create_account(None).await.unwrap();
        store
            .apply_entry(sender.id, Currency::Usd, TransactionType::Deposit, 500, "seed", Default::default())
            .await
            .unwrap();

        let (out_entry, in_entry) = transfer(&store, sender.id, recipient.id, Currency::Usd, 200, None)
            .await
            .unwrap();
        assert_eq!(out_entry.balance_after, 300);
        assert_eq!(in_entry.balance_after, 200);
    }

    #[tokio::test]
    async fn rejects_self_transfer() {
        let store = InMemoryAccountStore::new();
        let account = store.create_account(None).await.unwrap();
        let result = transfer(&store, account.id, account.id, Currency::Usd, 10, None).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn rejects_transfer_to_unknown_recipient() {
        let store = InMemoryAccountStore::new();
        let sender = store.create_account(None).await.unwrap();
        let result = transfer(&store, sender.id, Uuid::new_v4(), Currency::Usd, 10, None).await;
        assert!(matches!(result, Err(AppError::RecipientNotFound)));
    }
}
