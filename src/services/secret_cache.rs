use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use dashmap::DashMap;
use gcp_auth::{AuthenticationManager, Token};
use serde::Deserialize;
use tokio::sync::OnceCell as AsyncOnceCell;

use crate::middleware::error_handling::{AppError, Result};

const CACHE_TTL: Duration = Duration::from_secs(300);
const GCP_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

#[derive(Clone)]
struct CachedSecret {
    value: String,
    fetched_at: Instant,
}

impl CachedSecret {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < CACHE_TTL
    }
}

#[derive(Deserialize)]
struct AccessSecretVersionResponse {
    payload: SecretPayload,
}

#[derive(Deserialize)]
struct SecretPayload {
    data: String,
}

/// TTL-cached view over GCP Secret Manager.
///
/// A `DashMap` keyed by a string id, entries carrying their own freshness
/// check so a stale read never serves past its TTL even between any
/// background sweep. Provider API keys never touch disk or environment
/// variables once deployed; every read goes through this cache, which
/// re-fetches from Secret Manager's REST API lazily once the TTL lapses.
pub struct SecretCache {
    project: String,
    http_client: reqwest::Client,
    cache: DashMap<String, CachedSecret>,
    auth: AsyncOnceCell<Arc<AuthenticationManager>>,
}

impl SecretCache {
    pub fn new(project: String, http_client: reqwest::Client) -> Self {
        Self {
            project,
            http_client,
            cache: DashMap::new(),
            auth: AsyncOnceCell::new(),
        }
    }

    async fn auth_manager(&self) -> Result<&Arc<AuthenticationManager>> {
        self.auth
            .get_or_try_init(|| async {
                gcp_auth::init()
                    .await
                    .map(Arc::new)
                    .map_err(|e| AppError::Internal(anyhow::anyhow!("gcp_auth init failed: {e}")))
            })
            .await
    }

    async fn access_token(&self) -> Result<Arc<Token>> {
        let manager = self.auth_manager().await?;
        manager
            .get_token(&[GCP_SCOPE])
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("gcp_auth token fetch failed: {e}")))
    }

    /// Fetch a secret's current value by its Secret Manager secret id,
    /// serving from cache when the last fetch is still within
    /// [`CACHE_TTL`].
    pub async fn get_secret(&self, secret_id: &str) -> Result<String> {
        if let Some(entry) = self.cache.get(secret_id) {
            if entry.is_fresh() {
                return Ok(entry.value.clone());
            }
        }

        let token = self.access_token().await?;
        let url = format!(
            "https://secretmanager.googleapis.com/v1/projects/{}/secrets/{}/versions/latest:access",
            self.project, secret_id
        );

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(|_| AppError::UpstreamUnreachable)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(anyhow::anyhow!(
                "secret manager returned {status} for secret '{secret_id}': {body}"
            )));
        }

        let parsed: AccessSecretVersionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("malformed secret manager response: {e}")))?;

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(parsed.payload.data)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("secret payload was not valid base64: {e}")))?;
        let value = String::from_utf8(decoded)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("secret payload was not valid utf-8: {e}")))?;

        self.cache.insert(
            secret_id.to_string(),
            CachedSecret { value: value.clone(), fetched_at: Instant::now() },
        );

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_secret_freshness_respects_ttl() {
        let fresh = CachedSecret { value: "x".to_string(), fetched_at: Instant::now() };
        assert!(fresh.is_fresh());

        let stale = CachedSecret {
            value: "x".to_string(),
            fetched_at: Instant::now() - Duration::from_secs(301),
        };
        assert!(!stale.is_fresh());
    }
}
