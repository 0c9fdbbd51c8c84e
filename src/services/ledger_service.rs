//! The atomic balance-debit pipeline. Routes a chat-completion request
//! to its upstream provider, translates if needed, prices the provider's own
//! reported usage, and debits the account inside one store transaction. This
//! is the one path in the gateway where a network call and a ledger write
//! are both unavoidable, in that order, and must never be reordered.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::middleware::error_handling::{AppError, Result};
use crate::models::{metadata, ChatCompletionRequest, ChatCompletionResponse, Currency, TransactionType};
use crate::repositories::AccountStore;
use crate::services::provider_registry::{route, Provider};
use crate::services::secret_cache::SecretCache;
use crate::services::translation::{from_anthropic_response, to_anthropic_request};

/// The pre-check floor: below this, a request is rejected before any
/// upstream call is made at all. $0.001.
const MIN_BALANCE_MICROS: u64 = 1000;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(120);

/// Seam around the one HTTP call in the pipeline that talks to an LLM
/// provider, mirroring the `AccountStore` trait's role for the store: it
/// lets tests drive the whole pipeline against a scripted provider reply
/// without a live network call.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// POST `body` to `url` with `headers`, returning the parsed JSON body
    /// on any 2xx response. A non-2xx response becomes
    /// `AppError::UpstreamStatus`, carrying the real status code through for
    /// passthrough at the HTTP boundary; a transport-level failure (DNS,
    /// connection reset, timeout) becomes `AppError::UpstreamUnreachable`.
    async fn post(&self, url: &str, headers: Vec<(&'static str, String)>, body: Value) -> Result<Value>;
}

pub struct ReqwestUpstreamClient {
    http_client: reqwest::Client,
}

impl ReqwestUpstreamClient {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl UpstreamClient for ReqwestUpstreamClient {
    async fn post(&self, url: &str, headers: Vec<(&'static str, String)>, body: Value) -> Result<Value> {
        let mut request = self.http_client.post(url).timeout(UPSTREAM_TIMEOUT).json(&body);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|_| AppError::UpstreamUnreachable)?;
        let status = response.status();

        if !status.is_success() {
            // Never echo the provider's raw body back to the caller: it may
            // carry the request content verbatim or provider-internal detail.
            let _ = response.text().await;
            return Err(AppError::UpstreamStatus {
                status: status.as_u16(),
                message: "upstream provider request failed".to_string(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("malformed upstream response: {e}")))
    }
}

/// Everything a caller needs to finish the HTTP response: the canonical
/// completion body plus the billing facts that become
/// `X-Often-Cost-Micros`/`X-Often-Balance-Micros`/`X-Often-Provider`.
pub struct LedgerCompletion {
    pub response: ChatCompletionResponse,
    pub cost_micros: u64,
    pub balance_after_micros: u64,
    pub provider: Provider,
}

/// Run the full ledger pipeline for one chat-completion request.
/// `account_id` must already be the verified identity attached by the
/// identity middleware - this function performs no authentication of
/// its own.
pub async fn complete(
    store: &dyn AccountStore,
    upstream: &dyn UpstreamClient,
    secrets: &SecretCache,
    account_id: Uuid,
    request: &ChatCompletionRequest,
) -> Result<LedgerCompletion> {
    if request.model.is_empty() {
        return Err(AppError::InvalidInput("model is required".to_string()));
    }

    let provider = route(&request.model);

    if provider == Provider::Anthropic && request.tools.is_some() {
        return Err(AppError::InvalidInput("tool use not supported".to_string()));
    }

    // Pre-check: opportunistic, not authoritative. Saves an upstream call
    // and its cost to the operator when the account is obviously unusable;
    // the real check happens again inside the debit transaction below,
    // because the balance can move between this read and that one.
    let account = store.get_account(account_id).await?;
    if account.balances.get(Currency::Usd) < MIN_BALANCE_MICROS {
        return Err(AppError::InsufficientFunds);
    }

    let api_key = secrets
        .get_secret(provider.secret_id())
        .await
        .map_err(|_| AppError::ProviderUnconfigured(request.model.clone()))?;
    let headers = provider.auth_headers(&api_key);

    let upstream_body = if provider.needs_translation() {
        serde_json::to_value(to_anthropic_request(request))?
    } else {
        serde_json::to_value(request)?
    };

    let raw_response = upstream.post(provider.base_url(), headers, upstream_body).await?;

    let request_id = format!("chatcmpl-{}", Uuid::new_v4());
    let response: ChatCompletionResponse = if provider.needs_translation() {
        let anthropic_response = serde_json::from_value(raw_response)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("malformed anthropic response: {e}")))?;
        from_anthropic_response(anthropic_response, request_id)
    } else {
        serde_json::from_value(raw_response)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("malformed upstream response: {e}")))?
    };

    // Billing is keyed on the response's own model, never the request's -
    // the defense against a provider silently upgrading or aliasing a cheap
    // requested model to an expensive one.
    let cost_micros = crate::services::pricing_engine::cost(
        &response.model,
        response.usage.prompt_tokens,
        response.usage.completion_tokens,
    );

    let entry = store
        .apply_entry(
            account_id,
            Currency::Usd,
            TransactionType::LlmUsage,
            cost_micros,
            &format!("chat completion via {}", provider.as_str()),
            metadata([
                ("provider", Value::String(provider.as_str().to_string())),
                ("model", Value::String(response.model.clone())),
                ("promptTokens", serde_json::json!(response.usage.prompt_tokens)),
                ("completionTokens", serde_json::json!(response.usage.completion_tokens)),
            ]),
        )
        .await?;

    Ok(LedgerCompletion {
        response,
        cost_micros,
        balance_after_micros: entry.balance_after,
        provider,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatMessage, Choice, Usage};
    use crate::repositories::InMemoryAccountStore;

    struct StubUpstream {
        response: Value,
    }

    #[async_trait]
    impl UpstreamClient for StubUpstream {
        async fn post(&self, _url: &str, _headers: Vec<(&'static str, String)>, _body: Value) -> Result<Value> {
            Ok(self.response.clone())
        }
    }

    struct FailingUpstream {
        status: u16,
    }

    #[async_trait]
    impl UpstreamClient for FailingUpstream {
        async fn post(&self, _url: &str, _headers: Vec<(&'static str, String)>, _body: Value) -> Result<Value> {
            Err(AppError::UpstreamStatus { status: self.status, message: "nope".to_string() })
        }
    }

    fn req(model: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![ChatMessage { role: "user".to_string(), content: "hi".to_string() }],
            temperature: None,
            top_p: None,
            stop: None,
            max_tokens: None,
            tools: None,
        }
    }

    fn openai_shaped_reply(model: &str, prompt_tokens: u64, completion_tokens: u64) -> Value {
        serde_json::to_value(ChatCompletionResponse {
            id: "upstream-id".to_string(),
            object: "chat.completion".to_string(),
            created: 0,
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: ChatMessage { role: "assistant".to_string(), content: "hello".to_string() },
                finish_reason: Some("stop".to_string()),
            }],
            usage: Usage { prompt_tokens, completion_tokens, total_tokens: prompt_tokens + completion_tokens },
        })
        .unwrap()
    }

    async fn seeded_store(usd: u64) -> (InMemoryAccountStore, Uuid) {
        let store = InMemoryAccountStore::new();
        let account = store.create_account(None).await.unwrap();
        store
            .apply_entry(account.id, Currency::Usd, TransactionType::Deposit, usd, "seed", Default::default())
            .await
            .unwrap();
        (store, account.id)
    }

    #[tokio::test]
    async fn rejects_request_with_empty_model() {
        let (store, account_id) = seeded_store(10_000_000).await;
        let secrets = SecretCache::new("unused".to_string(), reqwest::Client::new());
        let upstream = StubUpstream { response: openai_shaped_reply("gpt-4o", 1, 1) };
        let result = complete(&store, &upstream, &secrets, account_id, &req("")).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn rejects_tools_on_anthropic_models() {
        let (store, account_id) = seeded_store(10_000_000).await;
        let secrets = SecretCache::new("unused".to_string(), reqwest::Client::new());
        let upstream = StubUpstream { response: openai_shaped_reply("claude-3-opus-20240229", 1, 1) };
        let mut request = req("claude-3-opus-20240229");
        request.tools = Some(serde_json::json!([{"name": "lookup"}]));
        let result = complete(&store, &upstream, &secrets, account_id, &request).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn pre_check_rejects_balance_below_the_floor() {
        let (store, account_id) = seeded_store(500).await;
        let secrets = SecretCache::new("unused".to_string(), reqwest::Client::new());
        let upstream = StubUpstream { response: openai_shaped_reply("gpt-4o", 1, 1) };
        let result = complete(&store, &upstream, &secrets, account_id, &req("gpt-4o")).await;
        assert!(matches!(result, Err(AppError::InsufficientFunds)));
    }

    #[tokio::test]
    async fn bills_against_the_response_model_not_the_requested_one() {
        // Caller asks for gpt-3.5-turbo, upstream stub replies as gpt-4o
        // with usage (100, 50). Billed amount must be cost(gpt-4o, 100, 50),
        // not cost(gpt-3.5-turbo, 100, 50).
        let (store, account_id) = seeded_store(10_000_000).await;
        let secrets = SecretCache::new("unused".to_string(), reqwest::Client::new());
        let upstream = StubUpstream { response: openai_shaped_reply("gpt-4o", 100, 50) };

        let completion = complete(&store, &upstream, &secrets, account_id, &req("gpt-3.5-turbo"))
            .await
            .unwrap();

        let expected = crate::services::pricing_engine::cost("gpt-4o", 100, 50);
        assert_eq!(completion.cost_micros, expected);
        assert_ne!(expected, crate::services::pricing_engine::cost("gpt-3.5-turbo", 100, 50));
    }

    #[tokio::test]
    async fn upstream_status_error_propagates_with_its_status_code() {
        let (store, account_id) = seeded_store(10_000_000).await;
        let secrets = SecretCache::new("unused".to_string(), reqwest::Client::new());
        let upstream = FailingUpstream { status: 429 };
        let result = complete(&store, &upstream, &secrets, account_id, &req("gpt-4o")).await;
        assert!(matches!(result, Err(AppError::UpstreamStatus { status: 429, .. })));
    }

    #[tokio::test]
    async fn insufficient_funds_inside_the_transaction_is_not_charged_twice() {
        // Balance clears the pre-check floor but not the actual cost: the
        // debit transaction itself must be the authoritative check.
        let (store, account_id) = seeded_store(MIN_BALANCE_MICROS + 1).await;
        let secrets = SecretCache::new("unused".to_string(), reqwest::Client::new());
        let upstream = StubUpstream { response: openai_shaped_reply("gpt-4o", 1_000_000, 0) };
        let result = complete(&store, &upstream, &secrets, account_id, &req("gpt-4o")).await;
        assert!(matches!(result, Err(AppError::InsufficientFunds)));
    }
}
