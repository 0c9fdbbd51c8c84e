//! `/signup`, `/login`, `/refresh`. Thin HTTP wrappers around
//! [`crate::services::auth_service`] - validation here is limited to the
//! shape axum can't already guarantee; the Identity Toolkit call itself is
//! the authority on whether a credential is acceptable.

use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use crate::config::AppConfig;
use crate::extractors::AppJson;
use crate::middleware::error_handling::Result;
use crate::models::{LoginRequest, RefreshRequest, SignupRequest};
use crate::services::auth_service::{self, AuthTokens};

pub async fn signup(
    State(config): State<AppConfig>,
    AppJson(request): AppJson<SignupRequest>,
) -> Result<(StatusCode, Json<AuthTokens>)> {
    request.validate()?;

    let tokens = auth_service::signup(
        &config.http_client,
        config.store.as_ref(),
        &config.firebase_web_api_key,
        &request.email,
        &request.password,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(tokens)))
}

pub async fn login(
    State(config): State<AppConfig>,
    AppJson(request): AppJson<LoginRequest>,
) -> Result<Json<AuthTokens>> {
    request.validate()?;

    let tokens =
        auth_service::login(&config.http_client, &config.firebase_web_api_key, &request.email, &request.password)
            .await?;

    Ok(Json(tokens))
}

pub async fn refresh(
    State(config): State<AppConfig>,
    AppJson(request): AppJson<RefreshRequest>,
) -> Result<Json<AuthTokens>> {
    request.validate()?;

    let tokens =
        auth_service::refresh(&config.http_client, &config.firebase_web_api_key, &request.refresh_token).await?;

    Ok(Json(tokens))
}
