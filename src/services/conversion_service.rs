use uuid::Uuid;

use crate::middleware::error_handling::{AppError, Result};
use crate::models::{metadata, Currency, Transaction};
use crate::repositories::AccountStore;
use crate::services::rate_oracle::RateOracleClient;

/// Converts `amount` of `from_currency` into `to_currency` within a single
/// account. Explicitly out of scope: order-book matching, slippage, or any
/// notion of a spread - the gateway quotes the oracle's mid price and fills
/// the whole amount at it, atomically, or not at all.
///
/// The oracle rate is fetched *before* the store transaction opens, so a
/// network round trip never holds the account's write lock. All
/// arithmetic downstream of that read is integer, carried in `u128` to
/// avoid float drift, and rounds down so the ledger never mints value it
/// didn't already hold.
pub async fn convert(
    store: &dyn AccountStore,
    rate_oracle: &RateOracleClient,
    account_id: Uuid,
    from_currency: Currency,
    to_currency: Currency,
    amount: u64,
) -> Result<Transaction> {
    if from_currency == to_currency {
        return Err(AppError::InvalidInput("source and target currency must differ".to_string()));
    }
    if amount == 0 {
        return Err(AppError::InvalidInput("conversion amount must be greater than zero".to_string()));
    }

    // Both rates are USD micro-dollars per whole unit; the scale factor
    // cancels in the ratio, so using micros here instead of cents keeps
    // the same formula shape (`amount * rate_from * u_to / (u_from *
    // rate_to)`) at finer precision.
    let from_rate = rate_oracle.usd_micros_per_whole(from_currency).await?;
    let to_rate = rate_oracle.usd_micros_per_whole(to_currency).await?;

    let from_smallest = from_currency.smallest_unit_per_whole() as u128;
    let to_smallest = to_currency.smallest_unit_per_whole() as u128;

    let numerator = (amount as u128)
        .checked_mul(from_rate)
        .and_then(|v| v.checked_mul(to_smallest))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("conversion numerator overflowed u128")))?;
    let denominator = from_smallest
        .checked_mul(to_rate)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("conversion denominator overflowed u128")))?;

    let converted_amount: u64 = (numerator / denominator)
        .try_into()
        .map_err(|_| AppError::Internal(anyhow::anyhow!("converted amount overflowed a u64")))?;

    if converted_amount == 0 {
        return Err(AppError::InvalidInput(
            "conversion amount too small to credit a whole smallest unit of the target currency".to_string(),
        ));
    }

    let rate_used = from_rate as f64 / to_rate as f64;

    store
        .convert(
            account_id,
            from_currency,
            to_currency,
            amount,
            converted_amount,
            metadata([
                ("fromCurrency", serde_json::Value::String(from_currency.to_string())),
                ("toCurrency", serde_json::Value::String(to_currency.to_string())),
                ("fromAmount", serde_json::json!(amount)),
                ("toAmount", serde_json::json!(converted_amount)),
                ("rateUsed", serde_json::json!(rate_used)),
            ]),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionType;
    use crate::repositories::InMemoryAccountStore;

    #[tokio::test]
    async fn converts_usd_to_usdc_at_par() {
        let store = InMemoryAccountStore::new();
        let account = store.create_account(None).await.unwrap();
        store
            .apply_entry(account.id, Currency::Usd, TransactionType::Deposit, 1_000_000, "seed", Default::default())
            .await
            .unwrap();

        let oracle = RateOracleClient::new(reqwest::Client::new(), "unused".to_string());
        let entry = convert(&store, &oracle, account.id, Currency::Usd, Currency::Usdc, 1_000_000)
            .await
            .unwrap();

        assert_eq!(entry.tx_type, TransactionType::Conversion);
        assert_eq!(entry.balance_after, 0);
        let account = store.get_account(account.id).await.unwrap();
        assert_eq!(account.balances.get(Currency::Usdc), 1_000_000);
    }

    #[tokio::test]
    async fn rejects_converting_a_currency_into_itself() {
        let store = InMemoryAccountStore::new();
        let account = store.create_account(None).await.unwrap();
        let oracle = RateOracleClient::new(reqwest::Client::new(), "unused".to_string());
        let result = convert(&store, &oracle, account.id, Currency::Usd, Currency::Usd, 100).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn rejects_insufficient_source_balance() {
        let store = InMemoryAccountStore::new();
        let account = store.create_account(None).await.unwrap();
        let oracle = RateOracleClient::new(reqwest::Client::new(), "unused".to_string());
        let result = convert(&store, &oracle, account.id, Currency::Usd, Currency::Usdc, 100).await;
        assert!(matches!(result, Err(AppError::InsufficientFunds)));
    }
}
