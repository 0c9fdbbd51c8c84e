use std::sync::RwLock;
use std::time::{Duration, Instant};

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::error_handling::{AppError, Result};

const JWKS_URL: &str = "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Fixed namespace for deriving an account's `Uuid` from its Firebase UID.
/// Firebase UIDs are opaque, non-UUID strings, but the store and every
/// ledger operation key accounts by `Uuid`. A `Uuid::new_v5` derivation is
/// stable and collision-free for distinct UIDs, so the same Firebase user
/// always maps to the same account row without a separate uid-to-account
/// lookup table.
const ACCOUNT_ID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6f, 0x66, 0x74, 0x65, 0x6e, 0x2d, 0x67, 0x77, 0x61, 0x79, 0x2d, 0x75, 0x69, 0x64, 0x00, 0x00,
]);

/// Derive the gateway's account id for a Firebase UID.
pub fn account_id_for_uid(uid: &str) -> Uuid {
    Uuid::new_v5(&ACCOUNT_ID_NAMESPACE, uid.as_bytes())
}

/// The claims the gateway actually cares about from a verified Firebase ID
/// token. Everything else in the token is ignored: identity verification is
/// a narrow translation, token in, account id out.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityClaims {
    /// Firebase UID; this *is* the gateway's `agent_id`.
    pub sub: String,
    pub email: Option<String>,
    pub aud: String,
    pub iss: String,
    pub exp: i64,
}

#[derive(Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

#[derive(Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

struct CachedJwks {
    keys: Vec<Jwk>,
    fetched_at: Instant,
}

/// Verifies Firebase Authentication ID tokens against Google's published
/// JWKS (RS256). An in-process cache guards the slow external fetch,
/// refreshed on a TTL rather than on every request.
pub struct IdentityService {
    http_client: reqwest::Client,
    jwks: RwLock<Option<CachedJwks>>,
}

impl IdentityService {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client, jwks: RwLock::new(None) }
    }

    fn cached_keys(&self) -> Option<Vec<Jwk>> {
        let guard = self.jwks.read().unwrap();
        match guard.as_ref() {
            Some(cached) if cached.fetched_at.elapsed() < JWKS_CACHE_TTL => {
                Some(cached.keys.iter().map(|k| Jwk { kid: k.kid.clone(), n: k.n.clone(), e: k.e.clone() }).collect())
            }
            _ => None,
        }
    }

    async fn fetch_keys(&self) -> Result<Vec<Jwk>> {
        if let Some(keys) = self.cached_keys() {
            return Ok(keys);
        }

        let response = self
            .http_client
            .get(JWKS_URL)
            .send()
            .await
            .map_err(|_| AppError::UpstreamUnreachable)?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamUnreachable);
        }

        let jwk_set: JwkSet = response
            .json()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("malformed jwks response: {e}")))?;

        let mut guard = self.jwks.write().unwrap();
        let cloned: Vec<Jwk> = jwk_set
            .keys
            .iter()
            .map(|k| Jwk { kid: k.kid.clone(), n: k.n.clone(), e: k.e.clone() })
            .collect();
        *guard = Some(CachedJwks { keys: jwk_set.keys, fetched_at: Instant::now() });
        Ok(cloned)
    }

    /// Verify a Firebase ID token and return its claims. `expected_project`
    /// must match both `aud` and the trailing component of `iss`
    /// (`https://securetoken.google.com/<project>`), per Firebase's own
    /// verification contract.
    pub async fn verify(&self, token: &str, expected_project: &str) -> Result<IdentityClaims> {
        let header = decode_header(token).map_err(|_| AppError::InvalidToken)?;
        let kid = header.kid.ok_or(AppError::InvalidToken)?;

        let keys = self.fetch_keys().await?;
        let jwk = keys.iter().find(|k| k.kid == kid).ok_or(AppError::InvalidToken)?;

        let decoding_key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e).map_err(|_| AppError::InvalidToken)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[expected_project]);
        validation.set_issuer(&[format!("https://securetoken.google.com/{expected_project}")]);

        let data = decode::<IdentityClaims>(token, &decoding_key, &validation).map_err(|_| AppError::InvalidToken)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_keys_respect_ttl() {
        let service = IdentityService::new(reqwest::Client::new());
        assert!(service.cached_keys().is_none());
    }

    #[test]
    fn account_id_for_uid_is_deterministic_and_distinct() {
        let a = account_id_for_uid("firebase-uid-one");
        let b = account_id_for_uid("firebase-uid-one");
        let c = account_id_for_uid("firebase-uid-two");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
