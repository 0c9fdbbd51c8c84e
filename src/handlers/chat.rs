//! `GET /v1/models`, `POST /v1/chat/completions`. The latter is the HTTP
//! face of the ledger core - this handler does no billing logic of its
//! own, it only wires the verified identity and the shared process state
//! into [`crate::services::complete`] and copies the billing facts it
//! returns onto response headers.

use axum::{
    extract::State,
    http::HeaderValue,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::config::AppConfig;
use crate::extractors::AppJson;
use crate::middleware::auth::AccountId;
use crate::middleware::error_handling::Result;
use crate::middleware::record_ledger_debit;
use crate::models::ChatCompletionRequest;
use crate::services::ledger_service::{self, ReqwestUpstreamClient};
use crate::services::pricing_engine::pricing_for_model;
use crate::services::provider_registry::{known_models, route};

#[derive(Debug, Serialize)]
pub struct ModelPricingUsd {
    pub input_per_million_tokens_usd: f64,
    pub output_per_million_tokens_usd: f64,
}

#[derive(Debug, Serialize)]
pub struct ModelEntry {
    pub id: &'static str,
    pub provider: &'static str,
    pub pricing: ModelPricingUsd,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelEntry>,
}

pub async fn list_models() -> Json<ModelsResponse> {
    let models = known_models()
        .into_iter()
        .map(|id| {
            let pricing = pricing_for_model(id);
            ModelEntry {
                id,
                provider: route(id).as_str(),
                pricing: ModelPricingUsd {
                    input_per_million_tokens_usd: pricing.input_rate_per_million as f64 / 1_000_000.0,
                    output_per_million_tokens_usd: pricing.output_rate_per_million as f64 / 1_000_000.0,
                },
            }
        })
        .collect();

    Json(ModelsResponse { models })
}

pub async fn chat_completions(
    State(config): State<AppConfig>,
    axum::Extension(AccountId(account_id)): axum::Extension<AccountId>,
    AppJson(request): AppJson<ChatCompletionRequest>,
) -> Result<Response> {
    let upstream = ReqwestUpstreamClient::new(config.http_client.clone());

    let completion = ledger_service::complete(
        config.store.as_ref(),
        &upstream,
        &config.secret_cache,
        account_id,
        &request,
    )
    .await?;

    record_ledger_debit(completion.provider.as_str());

    let mut response = Json(&completion.response).into_response();
    let headers = response.headers_mut();
    headers.insert(
        "x-often-cost-micros",
        HeaderValue::from_str(&completion.cost_micros.to_string()).unwrap(),
    );
    headers.insert(
        "x-often-balance-micros",
        HeaderValue::from_str(&completion.balance_after_micros.to_string()).unwrap(),
    );
    headers.insert("x-often-provider", HeaderValue::from_static(completion.provider.as_str()));

    Ok(response)
}
