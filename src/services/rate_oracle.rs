use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;

use crate::middleware::error_handling::{AppError, Result};
use crate::models::Currency;

const CACHE_TTL: Duration = Duration::from_secs(60);

fn coingecko_id(currency: Currency) -> Option<&'static str> {
    match currency {
        Currency::Btc => Some("bitcoin"),
        Currency::Eth => Some("ethereum"),
        Currency::Sol => Some("solana"),
        Currency::Usd | Currency::Usdc => None,
    }
}

#[derive(Clone, Copy)]
struct CachedRate {
    usd_micros_per_whole: u128,
    fetched_at: Instant,
}

impl CachedRate {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < CACHE_TTL
    }
}

/// Client for the external rate oracle backing currency conversion. Returns
/// USD price per whole unit of a currency, denominated in USD smallest
/// units (micro-dollars) so every caller after this boundary stays in
/// integer arithmetic.
///
/// The oracle's own response is decimal USD (a JSON float); converting that
/// into an integer micro-dollar amount is the one unavoidable floating
/// point step in the whole conversion path, and it happens exactly once,
/// here, at ingestion - never again downstream.
///
/// TTL-cached the same way as [`crate::services::secret_cache::SecretCache`]:
/// serving a rate that is up to the cache TTL stale is an accepted
/// trade-off in exchange for not blocking every conversion on a live
/// oracle round trip.
pub struct RateOracleClient {
    http_client: reqwest::Client,
    base_url: String,
    cache: DashMap<Currency, CachedRate>,
}

impl RateOracleClient {
    pub fn new(http_client: reqwest::Client, base_url: String) -> Self {
        Self { http_client, base_url, cache: DashMap::new() }
    }

    /// USD price, in micro-dollars, of one whole unit of `currency`.
    /// `USD`/`USDC` are pegged 1:1 and never hit the network.
    pub async fn usd_micros_per_whole(&self, currency: Currency) -> Result<u128> {
        let Some(coin_id) = coingecko_id(currency) else {
            return Ok(1_000_000);
        };

        if let Some(cached) = self.cache.get(&currency) {
            if cached.is_fresh() {
                return Ok(cached.usd_micros_per_whole);
            }
        }

        match self.fetch_live(coin_id).await {
            Ok(usd_micros_per_whole) => {
                self.cache.insert(currency, CachedRate { usd_micros_per_whole, fetched_at: Instant::now() });
                Ok(usd_micros_per_whole)
            }
            // Favor availability over freshness. A snapshot older than one
            // TTL is still served on oracle failure; only the total
            // absence of any prior snapshot is a hard failure.
            Err(err) => match self.cache.get(&currency) {
                Some(stale) => {
                    tracing::warn!("rate oracle fetch failed, serving stale rate for {currency}: {err:?}");
                    Ok(stale.usd_micros_per_whole)
                }
                None => Err(err),
            },
        }
    }

    async fn fetch_live(&self, coin_id: &str) -> Result<u128> {
        let response = self
            .http_client
            .get(&self.base_url)
            .query(&[("ids", coin_id), ("vs_currencies", "usd")])
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|_| AppError::UpstreamUnreachable)?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamUnreachable);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("malformed rate oracle response: {e}")))?;

        let price = body
            .get(coin_id)
            .and_then(|v| v.get("usd"))
            .and_then(|v| v.as_f64())
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("rate oracle response missing '{coin_id}.usd'")))?;

        if !price.is_finite() || price < 0.0 {
            return Err(AppError::Internal(anyhow::anyhow!("rate oracle returned a non-finite price")));
        }

        Ok((price * 1_000_000.0).round() as u128)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usd_and_usdc_have_no_coingecko_id() {
        assert!(coingecko_id(Currency::Usd).is_none());
        assert!(coingecko_id(Currency::Usdc).is_none());
    }

    #[test]
    fn crypto_currencies_map_to_their_coingecko_id() {
        assert_eq!(coingecko_id(Currency::Btc), Some("bitcoin"));
        assert_eq!(coingecko_id(Currency::Eth), Some("ethereum"));
        assert_eq!(coingecko_id(Currency::Sol), Some("solana"));
    }

    #[test]
    fn cached_rate_respects_ttl() {
        let fresh = CachedRate { usd_micros_per_whole: 1, fetched_at: Instant::now() };
        assert!(fresh.is_fresh());
        let stale = CachedRate {
            usd_micros_per_whole: 1,
            fetched_at: Instant::now() - Duration::from_secs(61),
        };
        assert!(!stale.is_fresh());
    }
}
