use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed set of currencies the ledger understands. Bit-exact to the
/// wire enumeration clients see from `supportedCurrencies`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Usdc,
    Eth,
    Btc,
    Sol,
}

impl Currency {
    pub const ALL: [Currency; 5] = [
        Currency::Usd,
        Currency::Usdc,
        Currency::Eth,
        Currency::Btc,
        Currency::Sol,
    ];

    /// Smallest-unit factor per whole coin.
    pub fn smallest_unit_per_whole(self) -> u64 {
        match self {
            Currency::Usd | Currency::Usdc => 1_000_000,
            Currency::Eth | Currency::Sol => 1_000_000_000,
            Currency::Btc => 100_000_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Usdc => "USDC",
            Currency::Eth => "ETH",
            Currency::Btc => "BTC",
            Currency::Sol => "SOL",
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Currency {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USD" => Ok(Currency::Usd),
            "USDC" => Ok(Currency::Usdc),
            "ETH" => Ok(Currency::Eth),
            "BTC" => Ok(Currency::Btc),
            "SOL" => Ok(Currency::Sol),
            _ => Err(()),
        }
    }
}

/// A per-currency balance mapping, always fully populated with every
/// supported currency (absent keys would otherwise force every caller to
/// special-case "no balance yet" vs "zero balance").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balances(pub BTreeMap<Currency, u64>);

impl Balances {
    pub fn zero() -> Self {
        let mut map = BTreeMap::new();
        for c in Currency::ALL {
            map.insert(c, 0);
        }
        Self(map)
    }

    pub fn get(&self, currency: Currency) -> u64 {
        self.0.get(&currency).copied().unwrap_or(0)
    }

    pub fn set(&mut self, currency: Currency, amount: u64) {
        self.0.insert(currency, amount);
    }
}

/// Account status. Only `Active` is meaningfully acted upon today; the
/// remaining variants are reserved for future lifecycle
/// states (e.g. frozen-for-review) without widening the wire enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub balances: Balances,
    pub status: AccountStatus,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(id: Uuid, email: Option<String>) -> Self {
        Self {
            id,
            balances: Balances::zero(),
            status: AccountStatus::Active,
            email,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub uid: Uuid,
    pub balances: BTreeMap<Currency, u64>,
    pub status: AccountStatus,
    #[serde(rename = "supportedCurrencies")]
    pub supported_currencies: Vec<&'static str>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            uid: account.id,
            balances: account.balances.0,
            status: account.status,
            supported_currencies: Currency::ALL.iter().map(|c| c.as_str()).collect(),
        }
    }
}
