//! Credential issuance: signup/login/refresh sit behind the same identity
//! contract the bearer-auth middleware enforces on every other endpoint.
//! This wraps the Firebase Identity Toolkit REST API - validate input,
//! POST, map the provider's error shape onto `AppError`. No password ever
//! touches gateway storage.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::error_handling::{AppError, Result};
use crate::repositories::AccountStore;
use crate::services::identity_service::account_id_for_uid;

const SIGN_UP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signUp";
const SIGN_IN_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword";
const TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// The shape every one of `/signup`, `/login`, `/refresh` returns to the
/// caller.
#[derive(Debug, Serialize)]
pub struct AuthTokens {
    #[serde(rename = "idToken")]
    pub id_token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    #[serde(rename = "expiresIn")]
    pub expires_in: String,
    pub uid: Uuid,
}

#[derive(Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(rename = "returnSecureToken")]
    return_secure_token: bool,
}

#[derive(Deserialize)]
struct SignUpResponse {
    #[serde(rename = "idToken")]
    id_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
    #[serde(rename = "expiresIn")]
    expires_in: String,
    #[serde(rename = "localId")]
    local_id: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
    user_id: String,
}

/// POST `body` to Identity Toolkit and map its error envelope onto
/// `AppError`: a rejected credential is `401`, never a 400 or 500 - the
/// caller cannot distinguish "wrong password" from "unknown email",
/// matching Firebase's own `INVALID_LOGIN_CREDENTIALS`.
async fn post_identity_toolkit<T: serde::Serialize, R: serde::de::DeserializeOwned>(
    http_client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &T,
) -> Result<R> {
    let response = http_client
        .post(url)
        .query(&[("key", api_key)])
        .json(body)
        .send()
        .await
        .map_err(|_| AppError::UpstreamUnreachable)?;

    if !response.status().is_success() {
        return Err(AppError::InvalidToken);
    }

    response
        .json()
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("malformed identity toolkit response: {e}")))
}

/// `POST /signup`: create a Firebase Auth user, then idempotently create the
/// corresponding zero-balance account row keyed by the derived account id.
pub async fn signup(
    http_client: &reqwest::Client,
    store: &dyn AccountStore,
    firebase_web_api_key: &str,
    email: &str,
    password: &str,
) -> Result<AuthTokens> {
    let body = SignUpRequest { email, password, return_secure_token: true };
    let parsed: SignUpResponse =
        post_identity_toolkit(http_client, SIGN_UP_URL, firebase_web_api_key, &body).await?;

    let account_id = account_id_for_uid(&parsed.local_id);
    store.create_account_with_id(account_id, Some(email.to_string())).await?;

    Ok(AuthTokens {
        id_token: parsed.id_token,
        refresh_token: parsed.refresh_token,
        expires_in: parsed.expires_in,
        uid: account_id,
    })
}

/// `POST /login`.
pub async fn login(
    http_client: &reqwest::Client,
    firebase_web_api_key: &str,
    email: &str,
    password: &str,
) -> Result<AuthTokens> {
    let body = SignUpRequest { email, password, return_secure_token: true };
    let parsed: SignUpResponse =
        post_identity_toolkit(http_client, SIGN_IN_URL, firebase_web_api_key, &body).await?;

    Ok(AuthTokens {
        id_token: parsed.id_token,
        refresh_token: parsed.refresh_token,
        expires_in: parsed.expires_in,
        uid: account_id_for_uid(&parsed.local_id),
    })
}

/// `POST /refresh`.
pub async fn refresh(
    http_client: &reqwest::Client,
    firebase_web_api_key: &str,
    refresh_token: &str,
) -> Result<AuthTokens> {
    let body = serde_json::json!({
        "grant_type": "refresh_token",
        "refresh_token": refresh_token,
    });
    let parsed: RefreshResponse =
        post_identity_toolkit(http_client, TOKEN_URL, firebase_web_api_key, &body).await?;

    Ok(AuthTokens {
        id_token: parsed.id_token,
        refresh_token: parsed.refresh_token,
        expires_in: parsed.expires_in,
        uid: account_id_for_uid(&parsed.user_id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_tokens_serialize_with_wire_field_names() {
        let tokens = AuthTokens {
            id_token: "id".to_string(),
            refresh_token: "refresh".to_string(),
            expires_in: "3600".to_string(),
            uid: account_id_for_uid("some-uid"),
        };
        let value = serde_json::to_value(&tokens).unwrap();
        assert_eq!(value["idToken"], "id");
        assert_eq!(value["refreshToken"], "refresh");
        assert_eq!(value["expiresIn"], "3600");
    }
}
