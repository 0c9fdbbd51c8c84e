use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Per-million-token rates, denominated in USD smallest units (micro-dollars:
/// 1 USD = 1_000_000 smallest units). Pulled from each provider's published
/// per-token pricing and rounded to the nearest whole smallest unit; this
/// table is immutable at runtime, so it lives behind a
/// `once_cell::sync::Lazy` static rather than being rebuilt per lookup.
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub input_rate_per_million: u64,
    pub output_rate_per_million: u64,
}

const FALLBACK_MODEL: &str = "gpt-4o";

static PRICING_TABLE: Lazy<HashMap<&'static str, ModelPricing>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(
        "gpt-4o",
        ModelPricing { input_rate_per_million: 5_000_000, output_rate_per_million: 15_000_000 },
    );
    m.insert(
        "gpt-4o-mini",
        ModelPricing { input_rate_per_million: 150_000, output_rate_per_million: 600_000 },
    );
    m.insert(
        "gpt-4-turbo",
        ModelPricing { input_rate_per_million: 10_000_000, output_rate_per_million: 30_000_000 },
    );
    m.insert(
        "gpt-3.5-turbo",
        ModelPricing { input_rate_per_million: 500_000, output_rate_per_million: 1_500_000 },
    );
    m.insert(
        "claude-3-5-sonnet-20241022",
        ModelPricing { input_rate_per_million: 3_000_000, output_rate_per_million: 15_000_000 },
    );
    m.insert(
        "claude-3-opus-20240229",
        ModelPricing { input_rate_per_million: 15_000_000, output_rate_per_million: 75_000_000 },
    );
    m.insert(
        "claude-3-haiku-20240307",
        ModelPricing { input_rate_per_million: 250_000, output_rate_per_million: 1_250_000 },
    );
    m.insert(
        "gemini-1.5-pro",
        ModelPricing { input_rate_per_million: 3_500_000, output_rate_per_million: 10_500_000 },
    );
    m.insert(
        "gemini-1.5-flash",
        ModelPricing { input_rate_per_million: 75_000, output_rate_per_million: 300_000 },
    );
    m.insert(
        "mistral-large-latest",
        ModelPricing { input_rate_per_million: 2_000_000, output_rate_per_million: 6_000_000 },
    );
    m.insert(
        "mistral-small-latest",
        ModelPricing { input_rate_per_million: 200_000, output_rate_per_million: 600_000 },
    );
    m.insert(
        "meta-llama/Llama-3-70b-chat-hf",
        ModelPricing { input_rate_per_million: 900_000, output_rate_per_million: 900_000 },
    );
    m
});

fn pricing_for(model: &str) -> ModelPricing {
    PRICING_TABLE
        .get(model)
        .copied()
        .unwrap_or_else(|| PRICING_TABLE[FALLBACK_MODEL])
}

/// Public lookup used by `GET /v1/models` to surface each listed model's
/// per-million-token rates without exposing the backing table itself.
pub fn pricing_for_model(model: &str) -> ModelPricing {
    pricing_for(model)
}

/// Cost of one completion, in USD smallest units, computed purely in
/// integer arithmetic to avoid float drift anywhere near the ledger.
/// `u128` keeps `tokens * rate` from overflowing even at the widest
/// plausible inputs (10^6 tokens times a 6*10^7 rate is still far below
/// `u128::MAX`).
///
/// Rounds up: a completion that costs a fraction of a smallest unit is
/// billed the whole unit, never free.
pub fn cost(model: &str, prompt_tokens: u64, completion_tokens: u64) -> u64 {
    let pricing = pricing_for(model);
    let numerator = prompt_tokens as u128 * pricing.input_rate_per_million as u128
        + completion_tokens as u128 * pricing.output_rate_per_million as u128;
    if numerator == 0 {
        return 0;
    }
    let cost = (numerator + 999_999) / 1_000_000;
    cost as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_tokens_is_zero_cost() {
        assert_eq!(cost("gpt-4o", 0, 0), 0);
    }

    #[test]
    fn known_model_uses_its_own_rate() {
        // 1,000,000 prompt tokens at 5,000,000/million = exactly 5,000,000.
        assert_eq!(cost("gpt-4o", 1_000_000, 0), 5_000_000);
    }

    #[test]
    fn unknown_model_falls_back_to_gpt_4o() {
        assert_eq!(cost("some-unlisted-model", 1_000_000, 0), cost("gpt-4o", 1_000_000, 0));
    }

    #[test]
    fn rounds_up_fractional_smallest_units() {
        // 1 token at 5,000,000/million = 5 smallest units exactly / 1e6 = rounds to 1.
        assert_eq!(cost("gpt-4o", 1, 0), 1);
    }

    #[test]
    fn combines_prompt_and_completion_cost() {
        let expected = cost("claude-3-5-sonnet-20241022", 1000, 0) + cost("claude-3-5-sonnet-20241022", 0, 500);
        assert_eq!(cost("claude-3-5-sonnet-20241022", 1000, 500), expected);
    }
}
