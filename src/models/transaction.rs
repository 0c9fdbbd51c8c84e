use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::account::Currency;

/// The type tag of a journal entry. The sign of the balance change is
/// implied by the tag, never stored independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    LlmUsage,
    TransferOut,
    TransferIn,
    /// A same-account cross-currency move. One entry covers both legs:
    /// `currency`/`amount`/`balanceBefore`/`balanceAfter` describe the
    /// source (`from`) leg; the target leg is carried only in
    /// `metadata.toCurrency`/`metadata.toAmount`, since the journal schema
    /// has no second before/after pair to put it in.
    Conversion,
}

impl TransactionType {
    /// `true` when this type increases the affected balance.
    pub fn is_credit(self) -> bool {
        matches!(self, TransactionType::Deposit | TransactionType::TransferIn)
    }
}

pub type TransactionMetadata = HashMap<String, Value>;

/// An immutable, append-only journal entry. Written exactly once, inside
/// the same store transaction that mutated the account balance(s) it
/// describes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub currency: Currency,
    pub amount: u64,
    pub balance_before: u64,
    pub balance_after: u64,
    pub description: String,
    pub metadata: TransactionMetadata,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// `balanceAfter` must be derivable from `balanceBefore`, `amount` and
    /// the sign implied by `tx_type`.
    pub fn is_internally_consistent(&self) -> bool {
        if self.tx_type.is_credit() {
            self.balance_after == self.balance_before.saturating_add(self.amount)
        } else {
            self.balance_after == self.balance_before.saturating_sub(self.amount)
        }
    }
}

pub fn metadata(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> TransactionMetadata {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}
