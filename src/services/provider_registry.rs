use once_cell::sync::Lazy;

/// One of the upstream chat-completion providers the gateway forwards to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
    Mistral,
    Together,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
            Provider::Mistral => "mistral",
            Provider::Together => "together",
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1/chat/completions",
            Provider::Anthropic => "https://api.anthropic.com/v1/messages",
            Provider::Google => "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions",
            Provider::Mistral => "https://api.mistral.ai/v1/chat/completions",
            Provider::Together => "https://api.together.xyz/v1/chat/completions",
        }
    }

    /// Secret Manager secret id holding this provider's API key.
    pub fn secret_id(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai-api-key",
            Provider::Anthropic => "anthropic-api-key",
            Provider::Google => "google-api-key",
            Provider::Mistral => "mistral-api-key",
            Provider::Together => "together-api-key",
        }
    }

    /// `true` for providers whose wire format needs translation to/from the
    /// canonical OpenAI-shaped request/response. Only Anthropic needs this
    /// among the five supported providers today.
    pub fn needs_translation(self) -> bool {
        matches!(self, Provider::Anthropic)
    }

    /// The auth header(s) this provider expects on every upstream request.
    /// Every OpenAI-compatible provider accepts a standard bearer token;
    /// Anthropic's Messages API instead wants `x-api-key` plus a pinned API
    /// version header.
    pub fn auth_headers(self, api_key: &str) -> Vec<(&'static str, String)> {
        match self {
            Provider::Anthropic => vec![
                ("x-api-key", api_key.to_string()),
                ("anthropic-version", "2023-06-01".to_string()),
            ],
            _ => vec![("Authorization", format!("Bearer {api_key}"))],
        }
    }
}

struct RoutingRule {
    prefix: &'static str,
    provider: Provider,
}

/// Ordered prefix table. Order matters: rules are tried top-to-bottom and
/// the first match wins, so a more specific prefix must be listed before a
/// shorter one it would otherwise shadow. Built once and never mutated.
///
/// Prefix routing is inherently brittle against new model namespaces; this
/// table is the seam that addresses it - adding a provider's next model
/// family is one more entry, not a code change to `route` itself.
static ROUTING_TABLE: Lazy<Vec<RoutingRule>> = Lazy::new(|| {
    vec![
        RoutingRule { prefix: "gpt-", provider: Provider::OpenAi },
        RoutingRule { prefix: "o1", provider: Provider::OpenAi },
        RoutingRule { prefix: "o3", provider: Provider::OpenAi },
        RoutingRule { prefix: "o4", provider: Provider::OpenAi },
        RoutingRule { prefix: "claude-", provider: Provider::Anthropic },
        RoutingRule { prefix: "gemini-", provider: Provider::Google },
        RoutingRule { prefix: "mistral-", provider: Provider::Mistral },
    ]
});

/// Resolve a model name to the provider that serves it.
/// `Together` is the explicit catch-all for every model that matches no
/// more specific prefix - it is the only provider that serves arbitrary
/// open-source model slugs, so an unmatched model is never an error by
/// itself (a missing API key for the resolved provider is; see C4/C9).
pub fn route(model: &str) -> Provider {
    ROUTING_TABLE
        .iter()
        .find(|rule| model.starts_with(rule.prefix))
        .map(|rule| rule.provider)
        .unwrap_or(Provider::Together)
}

/// The full set of model names the gateway will route, for `/v1/models`.
pub fn known_models() -> Vec<&'static str> {
    vec![
        "gpt-4o",
        "gpt-4o-mini",
        "gpt-4-turbo",
        "gpt-3.5-turbo",
        "claude-3-5-sonnet-20241022",
        "claude-3-opus-20240229",
        "claude-3-haiku-20240307",
        "gemini-1.5-pro",
        "gemini-1.5-flash",
        "mistral-large-latest",
        "mistral-small-latest",
        "meta-llama/Llama-3-70b-chat-hf",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_each_known_prefix() {
        assert_eq!(route("gpt-4o"), Provider::OpenAi);
        assert_eq!(route("o1-preview"), Provider::OpenAi);
        assert_eq!(route("claude-3-5-sonnet-20241022"), Provider::Anthropic);
        assert_eq!(route("gemini-1.5-pro"), Provider::Google);
        assert_eq!(route("mistral-large-latest"), Provider::Mistral);
    }

    #[test]
    fn unmatched_model_falls_back_to_together() {
        assert_eq!(route("meta-llama/Llama-3-70b-chat-hf"), Provider::Together);
        assert_eq!(route("some-made-up-model"), Provider::Together);
    }

    #[test]
    fn only_anthropic_needs_translation() {
        assert!(Provider::Anthropic.needs_translation());
        assert!(!Provider::OpenAi.needs_translation());
        assert!(!Provider::Google.needs_translation());
    }

    #[test]
    fn anthropic_uses_x_api_key_not_bearer() {
        let headers = Provider::Anthropic.auth_headers("sk-test");
        assert!(headers.contains(&("x-api-key", "sk-test".to_string())));
        assert!(headers.iter().any(|(k, _)| *k == "anthropic-version"));
    }

    #[test]
    fn openai_compatible_providers_use_bearer() {
        let headers = Provider::OpenAi.auth_headers("sk-test");
        assert_eq!(headers, vec![("Authorization", "Bearer sk-test".to_string())]);
    }
}
