use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::middleware::error_handling::{AppError, Result};
use crate::models::{Account, AccountStatus, Balances, Currency, Transaction, TransactionType};

/// Storage seam for account/ledger state.
///
/// Accounts are a set of per-account records guarded by per-account
/// serializable transactions (`SELECT ... FOR UPDATE` inside a single
/// `PgPool` transaction). This trait exists so a concurrent-debit race
/// (many debits racing the same account, exactly one succeeding) can run
/// against an in-process fake without a live Postgres instance, while
/// `PostgresAccountStore` below implements the real row-locking behavior
/// for production.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create_account(&self, email: Option<String>) -> Result<Account>;

    /// Create an account under a caller-chosen id, succeeding as a no-op
    /// (returning the existing row) if one already exists under that id.
    /// Used only by the credential issuer: a Firebase signup's
    /// derived account id must match across retried requests, unlike the
    /// random id `create_account` assigns for every other caller.
    async fn create_account_with_id(&self, id: Uuid, email: Option<String>) -> Result<Account>;

    async fn get_account(&self, id: Uuid) -> Result<Account>;

    /// List an account's journal entries, most recent first. `start_after`
    /// is a cursor: when present, only entries strictly older than that
    /// transaction id are returned, for `GET /getTransactions`'s
    /// `?startAfter=<txId>` pagination.
    async fn list_transactions(
        &self,
        account_id: Uuid,
        limit: i64,
        start_after: Option<Uuid>,
    ) -> Result<Vec<Transaction>>;

    /// Apply a single signed balance change to one account and append its
    /// journal entry, inside one serialized transaction. Returns the
    /// committed transaction record. Fails with `AppError::InsufficientFunds`
    /// if the debit would drive the balance negative.
    async fn apply_entry(
        &self,
        account_id: Uuid,
        currency: Currency,
        tx_type: TransactionType,
        amount: u64,
        description: &str,
        metadata: crate::models::TransactionMetadata,
    ) -> Result<Transaction>;

    /// Atomically move `amount` of `currency` from `from` to `to`, writing
    /// both journal entries (`TransferOut`/`TransferIn`) under the same
    /// serialized transaction so no observer ever sees one leg without the
    /// other.
    async fn transfer(
        &self,
        from: Uuid,
        to: Uuid,
        currency: Currency,
        amount: u64,
        description: &str,
    ) -> Result<(Transaction, Transaction)>;

    /// Atomically move `from_amount` of `from_currency` into `to_amount` of
    /// `to_currency` within the same account, writing both balances and a
    /// single `Conversion` journal entry under one serialized transaction.
    /// Fails with `AppError::InsufficientFunds` if
    /// `balances[from_currency] < from_amount`.
    async fn convert(
        &self,
        account_id: Uuid,
        from_currency: Currency,
        to_currency: Currency,
        from_amount: u64,
        to_amount: u64,
        metadata: crate::models::TransactionMetadata,
    ) -> Result<Transaction>;
}

pub struct PostgresAccountStore {
    pool: PgPool,
}

impl PostgresAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `accounts`/`transactions` tables if they don't already
    /// exist. Run once at startup; every statement is idempotent so a
    /// restart against an already-initialized database is a no-op.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id UUID PRIMARY KEY,
                balances JSONB NOT NULL DEFAULT '{}',
                status TEXT NOT NULL DEFAULT 'active',
                email TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

                CONSTRAINT check_account_status CHECK (status IN ('active', 'suspended', 'closed'))
            );

            CREATE TABLE IF NOT EXISTS transactions (
                id UUID PRIMARY KEY,
                account_id UUID NOT NULL REFERENCES accounts(id),
                type TEXT NOT NULL,
                currency TEXT NOT NULL,
                amount BIGINT NOT NULL,
                balance_before BIGINT NOT NULL,
                balance_after BIGINT NOT NULL,
                description TEXT NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

                CONSTRAINT check_transaction_type CHECK (
                    type IN ('deposit', 'llm_usage', 'transfer_out', 'transfer_in', 'conversion')
                )
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_account_created
                ON transactions(account_id, created_at DESC);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_account(row: &sqlx::postgres::PgRow) -> Result<Account> {
        let balances_json: serde_json::Value = row.try_get("balances")?;
        let balances: std::collections::BTreeMap<Currency, u64> =
            serde_json::from_value(balances_json).unwrap_or_default();
        let mut balances = Balances(balances);
        for c in Currency::ALL {
            balances.0.entry(c).or_insert(0);
        }
        let status_str: String = row.try_get("status")?;
        let status = match status_str.as_str() {
            "suspended" => AccountStatus::Suspended,
            "closed" => AccountStatus::Closed,
            _ => AccountStatus::Active,
        };
        Ok(Account {
            id: row.try_get("id")?,
            balances,
            status,
            email: row.try_get("email")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    async fn create_account(&self, email: Option<String>) -> Result<Account> {
        let account = Account::new(Uuid::new_v4(), email);
        let balances_json = serde_json::to_value(&account.balances.0)?;
        sqlx::query(
            r#"
            INSERT INTO accounts (id, balances, status, email, created_at)
            VALUES ($1, $2, 'active', $3, $4)
            "#,
        )
        .bind(account.id)
        .bind(&balances_json)
        .bind(&account.email)
        .bind(account.created_at)
        .execute(&self.pool)
        .await?;

        Ok(account)
    }

    async fn create_account_with_id(&self, id: Uuid, email: Option<String>) -> Result<Account> {
        if let Ok(existing) = self.get_account(id).await {
            return Ok(existing);
        }

        let account = Account::new(id, email);
        let balances_json = serde_json::to_value(&account.balances.0)?;
        sqlx::query(
            r#"
            INSERT INTO accounts (id, balances, status, email, created_at)
            VALUES ($1, $2, 'active', $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(account.id)
        .bind(&balances_json)
        .bind(&account.email)
        .bind(account.created_at)
        .execute(&self.pool)
        .await?;

        self.get_account(id).await
    }

    async fn get_account(&self, id: Uuid) -> Result<Account> {
        let row = sqlx::query("SELECT id, balances, status, email, created_at FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::AccountNotFound)?;

        Self::row_to_account(&row)
    }

    async fn list_transactions(
        &self,
        account_id: Uuid,
        limit: i64,
        start_after: Option<Uuid>,
    ) -> Result<Vec<Transaction>> {
        let cursor_created_at = match start_after {
            Some(tx_id) => {
                let row = sqlx::query("SELECT created_at FROM transactions WHERE id = $1 AND account_id = $2")
                    .bind(tx_id)
                    .bind(account_id)
                    .fetch_optional(&self.pool)
                    .await?;
                Some(row.ok_or(AppError::InvalidInput("startAfter does not reference a known transaction".to_string()))?
                    .try_get::<chrono::DateTime<Utc>, _>("created_at")?)
            }
            None => None,
        };

        let rows = sqlx::query(
            r#"
            SELECT id, account_id, type, currency, amount, balance_before, balance_after,
                   description, metadata, created_at
            FROM transactions
            WHERE account_id = $1 AND ($3::timestamptz IS NULL OR created_at < $3)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .bind(cursor_created_at)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let tx_type_str: String = row.try_get("type")?;
            let tx_type = serde_json::from_value(serde_json::Value::String(tx_type_str))
                .map_err(|_| AppError::Internal(anyhow::anyhow!("corrupt transaction type in store")))?;
            let currency_str: String = row.try_get("currency")?;
            let currency = currency_str
                .parse::<Currency>()
                .map_err(|_| AppError::Internal(anyhow::anyhow!("corrupt currency in store")))?;
            let metadata_json: serde_json::Value = row.try_get("metadata")?;
            out.push(Transaction {
                id: row.try_get("id")?,
                account_id: row.try_get("account_id")?,
                tx_type,
                currency,
                amount: row.try_get::<i64, _>("amount")? as u64,
                balance_before: row.try_get::<i64, _>("balance_before")? as u64,
                balance_after: row.try_get::<i64, _>("balance_after")? as u64,
                description: row.try_get("description")?,
                metadata: serde_json::from_value(metadata_json).unwrap_or_default(),
                created_at: row.try_get("created_at")?,
            });
        }
        Ok(out)
    }

    async fn apply_entry(
        &self,
        account_id: Uuid,
        currency: Currency,
        tx_type: TransactionType,
        amount: u64,
        description: &str,
        metadata: crate::models::TransactionMetadata,
    ) -> Result<Transaction> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT balances FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(account_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::AccountNotFound)?;

        let balances_json: serde_json::Value = row.try_get("balances")?;
        let mut balances: std::collections::BTreeMap<Currency, u64> =
            serde_json::from_value(balances_json).unwrap_or_default();
        let before = balances.get(&currency).copied().unwrap_or(0);

        let after = if tx_type.is_credit() {
            before
                .checked_add(amount)
                .ok_or_else(|| AppError::Internal(anyhow::anyhow!("balance overflow")))?
        } else {
            before
                .checked_sub(amount)
                .ok_or(AppError::InsufficientFunds)?
        };
        balances.insert(currency, after);

        let balances_json = serde_json::to_value(&balances)?;
        sqlx::query("UPDATE accounts SET balances = $1 WHERE id = $2")
            .bind(&balances_json)
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        let entry = Transaction {
            id: Uuid::new_v4(),
            account_id,
            tx_type,
            currency,
            amount,
            balance_before: before,
            balance_after: after,
            description: description.to_string(),
            metadata,
            created_at: Utc::now(),
        };

        let tx_type_json = serde_json::to_value(entry.tx_type)?;
        let metadata_json = serde_json::to_value(&entry.metadata)?;
        sqlx::query(
            r#"
            INSERT INTO transactions
                (id, account_id, type, currency, amount, balance_before, balance_after, description, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id)
        .bind(entry.account_id)
        .bind(tx_type_json.as_str().unwrap_or_default())
        .bind(entry.currency.as_str())
        .bind(entry.amount as i64)
        .bind(entry.balance_before as i64)
        .bind(entry.balance_after as i64)
        .bind(&entry.description)
        .bind(&metadata_json)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(entry)
    }

    async fn transfer(
        &self,
        from: Uuid,
        to: Uuid,
        currency: Currency,
        amount: u64,
        description: &str,
    ) -> Result<(Transaction, Transaction)> {
        let mut tx = self.pool.begin().await?;

        // Lock both rows in a fixed order (by id) to avoid deadlocks between
        // concurrent transfers that touch the same pair of accounts.
        let (first, second) = if from < to { (from, to) } else { (to, from) };
        for id in [first, second] {
            sqlx::query("SELECT id FROM accounts WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(AppError::AccountNotFound)?;
        }

        let from_row = sqlx::query("SELECT balances FROM accounts WHERE id = $1")
            .bind(from)
            .fetch_one(&mut *tx)
            .await?;
        let mut from_balances: std::collections::BTreeMap<Currency, u64> =
            serde_json::from_value(from_row.try_get("balances")?).unwrap_or_default();
        let from_before = from_balances.get(&currency).copied().unwrap_or(0);
        let from_after = from_before
            .checked_sub(amount)
            .ok_or(AppError::InsufficientFunds)?;
        from_balances.insert(currency, from_after);

        let to_row = sqlx::query("SELECT balances FROM accounts WHERE id = $1")
            .bind(to)
            .fetch_one(&mut *tx)
            .await?;
        let mut to_balances: std::collections::BTreeMap<Currency, u64> =
            serde_json::from_value(to_row.try_get("balances")?).unwrap_or_default();
        let to_before = to_balances.get(&currency).copied().unwrap_or(0);
        let to_after = to_before
            .checked_add(amount)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("balance overflow")))?;
        to_balances.insert(currency, to_after);

        sqlx::query("UPDATE accounts SET balances = $1 WHERE id = $2")
            .bind(serde_json::to_value(&from_balances)?)
            .bind(from)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE accounts SET balances = $1 WHERE id = $2")
            .bind(serde_json::to_value(&to_balances)?)
            .bind(to)
            .execute(&mut *tx)
            .await?;

        let out_entry = Transaction {
            id: Uuid::new_v4(),
            account_id: from,
            tx_type: TransactionType::TransferOut,
            currency,
            amount,
            balance_before: from_before,
            balance_after: from_after,
            description: description.to_string(),
            metadata: crate::models::metadata([(
                "counterparty",
                serde_json::Value::String(to.to_string()),
            )]),
            created_at: Utc::now(),
        };
        let in_entry = Transaction {
            id: Uuid::new_v4(),
            account_id: to,
            tx_type: TransactionType::TransferIn,
            currency,
            amount,
            balance_before: to_before,
            balance_after: to_after,
            description: description.to_string(),
            metadata: crate::models::metadata([(
                "counterparty",
                serde_json::Value::String(from.to_string()),
            )]),
            created_at: Utc::now(),
        };

        for entry in [&out_entry, &in_entry] {
            sqlx::query(
                r#"
                INSERT INTO transactions
                    (id, account_id, type, currency, amount, balance_before, balance_after, description, metadata, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(entry.id)
            .bind(entry.account_id)
            .bind(serde_json::to_value(entry.tx_type)?.as_str().unwrap_or_default())
            .bind(entry.currency.as_str())
            .bind(entry.amount as i64)
            .bind(entry.balance_before as i64)
            .bind(entry.balance_after as i64)
            .bind(&entry.description)
            .bind(serde_json::to_value(&entry.metadata)?)
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok((out_entry, in_entry))
    }

    async fn convert(
        &self,
        account_id: Uuid,
        from_currency: Currency,
        to_currency: Currency,
        from_amount: u64,
        to_amount: u64,
        metadata: crate::models::TransactionMetadata,
    ) -> Result<Transaction> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT balances FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(account_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::AccountNotFound)?;

        let mut balances: std::collections::BTreeMap<Currency, u64> =
            serde_json::from_value(row.try_get("balances")?).unwrap_or_default();

        let from_before = balances.get(&from_currency).copied().unwrap_or(0);
        let from_after = from_before.checked_sub(from_amount).ok_or(AppError::InsufficientFunds)?;
        let to_before = balances.get(&to_currency).copied().unwrap_or(0);
        let to_after = to_before
            .checked_add(to_amount)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("balance overflow")))?;

        balances.insert(from_currency, from_after);
        balances.insert(to_currency, to_after);

        sqlx::query("UPDATE accounts SET balances = $1 WHERE id = $2")
            .bind(serde_json::to_value(&balances)?)
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        let entry = Transaction {
            id: Uuid::new_v4(),
            account_id,
            tx_type: TransactionType::Conversion,
            currency: from_currency,
            amount: from_amount,
            balance_before: from_before,
            balance_after: from_after,
            description: format!("convert {from_amount} {from_currency} to {to_amount} {to_currency}"),
            metadata,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO transactions
                (id, account_id, type, currency, amount, balance_before, balance_after, description, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id)
        .bind(entry.account_id)
        .bind(serde_json::to_value(entry.tx_type)?.as_str().unwrap_or_default())
        .bind(entry.currency.as_str())
        .bind(entry.amount as i64)
        .bind(entry.balance_before as i64)
        .bind(entry.balance_after as i64)
        .bind(&entry.description)
        .bind(serde_json::to_value(&entry.metadata)?)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(entry)
    }
}

/// In-process fake used by tests (notably the 50-way concurrent debit
/// race). A single `Mutex` stands in for Postgres row locks: every method
/// holds it for the duration of its read-modify-write, which is exactly the
/// serialization guarantee the real store gets from `SELECT ... FOR UPDATE`.
#[derive(Default)]
pub struct InMemoryAccountStore {
    inner: Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    accounts: HashMap<Uuid, Account>,
    transactions: HashMap<Uuid, Vec<Transaction>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, account: Account) {
        let mut state = self.inner.lock().unwrap();
        state.accounts.insert(account.id, account);
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn create_account(&self, email: Option<String>) -> Result<Account> {
        let account = Account::new(Uuid::new_v4(), email);
        let mut state = self.inner.lock().unwrap();
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn create_account_with_id(&self, id: Uuid, email: Option<String>) -> Result<Account> {
        let mut state = self.inner.lock().unwrap();
        if let Some(existing) = state.accounts.get(&id) {
            return Ok(existing.clone());
        }
        let account = Account::new(id, email);
        state.accounts.insert(id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, id: Uuid) -> Result<Account> {
        let state = self.inner.lock().unwrap();
        state.accounts.get(&id).cloned().ok_or(AppError::AccountNotFound)
    }

    async fn list_transactions(
        &self,
        account_id: Uuid,
        limit: i64,
        start_after: Option<Uuid>,
    ) -> Result<Vec<Transaction>> {
        let state = self.inner.lock().unwrap();
        let mut txs = state.transactions.get(&account_id).cloned().unwrap_or_default();
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(cursor_id) = start_after {
            let cursor_created_at = txs
                .iter()
                .find(|tx| tx.id == cursor_id)
                .map(|tx| tx.created_at)
                .ok_or(AppError::InvalidInput("startAfter does not reference a known transaction".to_string()))?;
            txs.retain(|tx| tx.created_at < cursor_created_at);
        }

        txs.truncate(limit.max(0) as usize);
        Ok(txs)
    }

    async fn apply_entry(
        &self,
        account_id: Uuid,
        currency: Currency,
        tx_type: TransactionType,
        amount: u64,
        description: &str,
        metadata: crate::models::TransactionMetadata,
    ) -> Result<Transaction> {
        let mut state = self.inner.lock().unwrap();
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or(AppError::AccountNotFound)?;
        let before = account.balances.get(currency);
        let after = if tx_type.is_credit() {
            before
                .checked_add(amount)
                .ok_or_else(|| AppError::Internal(anyhow::anyhow!("balance overflow")))?
        } else {
            before.checked_sub(amount).ok_or(AppError::InsufficientFunds)?
        };
        account.balances.set(currency, after);

        let entry = Transaction {
            id: Uuid::new_v4(),
            account_id,
            tx_type,
            currency,
            amount,
            balance_before: before,
            balance_after: after,
            description: description.to_string(),
            metadata,
            created_at: Utc::now(),
        };
        state
            .transactions
            .entry(account_id)
            .or_default()
            .push(entry.clone());
        Ok(entry)
    }

    async fn transfer(
        &self,
        from: Uuid,
        to: Uuid,
        currency: Currency,
        amount: u64,
        description: &str,
    ) -> Result<(Transaction, Transaction)> {
        let mut state = self.inner.lock().unwrap();
        if !state.accounts.contains_key(&from) || !state.accounts.contains_key(&to) {
            return Err(AppError::AccountNotFound);
        }

        let from_before = state.accounts[&from].balances.get(currency);
        let from_after = from_before.checked_sub(amount).ok_or(AppError::InsufficientFunds)?;
        let to_before = state.accounts[&to].balances.get(currency);
        let to_after = to_before
            .checked_add(amount)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("balance overflow")))?;

        state
            .accounts
            .get_mut(&from)
            .unwrap()
            .balances
            .set(currency, from_after);
        state
            .accounts
            .get_mut(&to)
            .unwrap()
            .balances
            .set(currency, to_after);

        let out_entry = Transaction {
            id: Uuid::new_v4(),
            account_id: from,
            tx_type: TransactionType::TransferOut,
            currency,
            amount,
            balance_before: from_before,
            balance_after: from_after,
            description: description.to_string(),
            metadata: crate::models::metadata([(
                "counterparty",
                serde_json::Value::String(to.to_string()),
            )]),
            created_at: Utc::now(),
        };
        let in_entry = Transaction {
            id: Uuid::new_v4(),
            account_id: to,
            tx_type: TransactionType::TransferIn,
            currency,
            amount,
            balance_before: to_before,
            balance_after: to_after,
            description: description.to_string(),
            metadata: crate::models::metadata([(
                "counterparty",
                serde_json::Value::String(from.to_string()),
            )]),
            created_at: Utc::now(),
        };

        state
            .transactions
            .entry(from)
            .or_default()
            .push(out_entry.clone());
        state
            .transactions
            .entry(to)
            .or_default()
            .push(in_entry.clone());

        Ok((out_entry, in_entry))
    }

    async fn convert(
        &self,
        account_id: Uuid,
        from_currency: Currency,
        to_currency: Currency,
        from_amount: u64,
        to_amount: u64,
        metadata: crate::models::TransactionMetadata,
    ) -> Result<Transaction> {
        let mut state = self.inner.lock().unwrap();
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or(AppError::AccountNotFound)?;

        let from_before = account.balances.get(from_currency);
        let from_after = from_before.checked_sub(from_amount).ok_or(AppError::InsufficientFunds)?;
        let to_before = account.balances.get(to_currency);
        let to_after = to_before
            .checked_add(to_amount)
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("balance overflow")))?;

        account.balances.set(from_currency, from_after);
        account.balances.set(to_currency, to_after);

        let entry = Transaction {
            id: Uuid::new_v4(),
            account_id,
            tx_type: TransactionType::Conversion,
            currency: from_currency,
            amount: from_amount,
            balance_before: from_before,
            balance_after: from_after,
            description: format!("convert {from_amount} {from_currency} to {to_amount} {to_currency}"),
            metadata,
            created_at: Utc::now(),
        };
        state.transactions.entry(account_id).or_default().push(entry.clone());
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn deposit_then_debit_round_trip() {
        let store = InMemoryAccountStore::new();
        let account = store.create_account(Some("a@example.com".to_string())).await.unwrap();

        let deposit = store
            .apply_entry(
                account.id,
                Currency::Usd,
                TransactionType::Deposit,
                500_000,
                "test deposit",
                Default::default(),
            )
            .await
            .unwrap();
        assert!(deposit.is_internally_consistent());
        assert_eq!(deposit.balance_after, 500_000);

        let debit = store
            .apply_entry(
                account.id,
                Currency::Usd,
                TransactionType::LlmUsage,
                120_000,
                "test debit",
                Default::default(),
            )
            .await
            .unwrap();
        assert!(debit.is_internally_consistent());
        assert_eq!(debit.balance_after, 380_000);
    }

    #[tokio::test]
    async fn debit_below_zero_is_rejected() {
        let store = InMemoryAccountStore::new();
        let account = store.create_account(None).await.unwrap();
        let result = store
            .apply_entry(
                account.id,
                Currency::Usd,
                TransactionType::LlmUsage,
                1,
                "overdraw",
                Default::default(),
            )
            .await;
        assert!(matches!(result, Err(AppError::InsufficientFunds)));
    }

    #[tokio::test]
    async fn concurrent_debits_allow_exactly_one_to_succeed() {
        let store = Arc::new(InMemoryAccountStore::new());
        let account = store.create_account(None).await.unwrap();
        store
            .apply_entry(
                account.id,
                Currency::Usd,
                TransactionType::Deposit,
                1,
                "seed",
                Default::default(),
            )
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            let id = account.id;
            handles.push(tokio::spawn(async move {
                store
                    .apply_entry(id, Currency::Usd, TransactionType::LlmUsage, 1, "race", Default::default())
                    .await
            }));
        }

        let mut successes = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn transfer_moves_exact_amount_between_two_accounts() {
        let store = InMemoryAccountStore::new();
        let sender = store.create_account(None).await.unwrap();
        let recipient = store.create_account(None).await.unwrap();
        store
            .apply_entry(
                sender.id,
                Currency::Usd,
                TransactionType::Deposit,
                1_000,
                "seed",
                Default::default(),
            )
            .await
            .unwrap();

        let (out_entry, in_entry) = store
            .transfer(sender.id, recipient.id, Currency::Usd, 300, "payment")
            .await
            .unwrap();

        assert_eq!(out_entry.balance_after, 700);
        assert_eq!(in_entry.balance_after, 300);
        assert!(out_entry.is_internally_consistent());
        assert!(in_entry.is_internally_consistent());
    }

    #[tokio::test]
    async fn convert_moves_both_balances_in_one_entry() {
        let store = InMemoryAccountStore::new();
        let account = store.create_account(None).await.unwrap();
        store
            .apply_entry(account.id, Currency::Usd, TransactionType::Deposit, 1_000_000, "seed", Default::default())
            .await
            .unwrap();

        let entry = store
            .convert(account.id, Currency::Usd, Currency::Usdc, 1_000_000, 1_000_000, Default::default())
            .await
            .unwrap();

        assert_eq!(entry.tx_type, TransactionType::Conversion);
        assert!(entry.is_internally_consistent());
        let account = store.get_account(account.id).await.unwrap();
        assert_eq!(account.balances.get(Currency::Usd), 0);
        assert_eq!(account.balances.get(Currency::Usdc), 1_000_000);
    }

    #[tokio::test]
    async fn convert_rejects_insufficient_source_balance() {
        let store = InMemoryAccountStore::new();
        let account = store.create_account(None).await.unwrap();
        let result = store
            .convert(account.id, Currency::Usd, Currency::Usdc, 1, 1, Default::default())
            .await;
        assert!(matches!(result, Err(AppError::InsufficientFunds)));
    }
}
