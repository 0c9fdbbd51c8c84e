//! Translation between the canonical OpenAI-shaped wire format and
//! Anthropic's Messages API. Anthropic is the only provider the gateway
//! supports that needs this: it has no `system` role inside `messages`,
//! requires `max_tokens`, and names fields differently (`stop_sequences`
//! vs `stop`, `stop_reason` vs `finish_reason`).

use crate::models::{
    AnthropicContentBlock, AnthropicMessage, AnthropicRequest, AnthropicResponse, ChatCompletionRequest,
    ChatCompletionResponse, ChatMessage, Choice, Usage,
};

/// Anthropic requires an explicit `max_tokens`. The per-model default for
/// the Claude family is 8192 when the caller omits it; since this function
/// only ever runs for requests already routed to Anthropic, that's the only
/// branch reachable here.
const CLAUDE_DEFAULT_MAX_TOKENS: u32 = 8192;

/// Build an Anthropic request from the canonical request.
///
/// - Every `system`-role message is pulled out of `messages` and
///   concatenated (newline-joined, in order) into the top-level `system`
///   field, since Anthropic has no `system` role inside the message list.
/// - Adjacent messages sharing the same role are coalesced into one
///   message (newline-joined content), since Anthropic rejects consecutive
///   same-role turns.
/// - `stop` becomes `stop_sequences`; `max_tokens` defaults to
///   [`CLAUDE_DEFAULT_MAX_TOKENS`] when absent.
pub fn to_anthropic_request(req: &ChatCompletionRequest) -> AnthropicRequest {
    let mut system_parts = Vec::new();
    let mut coalesced: Vec<AnthropicMessage> = Vec::new();

    for message in &req.messages {
        if message.role == "system" {
            system_parts.push(message.content.clone());
            continue;
        }
        match coalesced.last_mut() {
            Some(last) if last.role == message.role => {
                last.content.push('\n');
                last.content.push_str(&message.content);
            }
            _ => coalesced.push(AnthropicMessage {
                role: message.role.clone(),
                content: message.content.clone(),
            }),
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n"))
    };

    AnthropicRequest {
        model: req.model.clone(),
        max_tokens: req.max_tokens.unwrap_or(CLAUDE_DEFAULT_MAX_TOKENS),
        messages: coalesced,
        system,
        temperature: req.temperature,
        top_p: req.top_p,
        stop_sequences: req.stop.clone().map(|s| s.into_vec()),
    }
}

/// Map Anthropic's `stop_reason` vocabulary onto the OpenAI-shaped
/// `finish_reason` vocabulary clients already expect.
fn map_stop_reason(stop_reason: Option<&str>) -> Option<String> {
    stop_reason.map(|reason| {
        match reason {
            "end_turn" | "stop_sequence" => "stop",
            "max_tokens" => "length",
            "tool_use" => "tool_calls",
            other => other,
        }
        .to_string()
    })
}

/// Build a canonical response from Anthropic's response. The returned
/// `model` is Anthropic's own `resp.model`, not the model the caller
/// requested: billing runs against whatever model the *response* names, a
/// deliberate defense against a provider that upgrades or aliases a cheap
/// requested model to a more expensive one.
pub fn from_anthropic_response(resp: AnthropicResponse, request_id: String) -> ChatCompletionResponse {
    // The assistant message is the concatenation of every `text`-typed
    // content block, not just the first one.
    let content = resp
        .content
        .iter()
        .filter(|block| block.block_type == "text")
        .map(|block| block.text.as_str())
        .collect::<Vec<_>>()
        .join("");

    let prompt_tokens = resp.usage.input_tokens;
    let completion_tokens = resp.usage.output_tokens;

    ChatCompletionResponse {
        id: request_id,
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: resp.model,
        choices: vec![Choice {
            index: 0,
            message: ChatMessage { role: "assistant".to_string(), content },
            finish_reason: map_stop_reason(resp.stop_reason.as_deref()),
        }],
        usage: Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnthropicUsage, StopSequences};

    fn msg(role: &str, content: &str) -> ChatMessage {
        ChatMessage { role: role.to_string(), content: content.to_string() }
    }

    #[test]
    fn system_messages_are_extracted_and_concatenated() {
        let req = ChatCompletionRequest {
            model: "claude-3-5-sonnet-20241022".to_string(),
            messages: vec![
                msg("system", "Be terse."),
                msg("system", "Never apologize."),
                msg("user", "hi"),
            ],
            temperature: None,
            top_p: None,
            stop: None,
            max_tokens: None,
            tools: None,
        };
        let anthropic = to_anthropic_request(&req);
        assert_eq!(anthropic.system.as_deref(), Some("Be terse.\nNever apologize."));
        assert_eq!(anthropic.messages.len(), 1);
        assert_eq!(anthropic.max_tokens, CLAUDE_DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn default_max_tokens_for_claude_is_8192_not_4096() {
        // System message plus two adjacent user turns, no max_tokens supplied.
        let req = ChatCompletionRequest {
            model: "claude-sonnet-4-20250514".to_string(),
            messages: vec![msg("system", "You are helpful."), msg("user", "Part 1"), msg("user", "Part 2")],
            temperature: None,
            top_p: None,
            stop: None,
            max_tokens: None,
            tools: None,
        };
        let anthropic = to_anthropic_request(&req);
        assert_eq!(anthropic.system.as_deref(), Some("You are helpful."));
        assert_eq!(anthropic.messages.len(), 1);
        assert_eq!(anthropic.messages[0].content, "Part 1\nPart 2");
        assert_eq!(anthropic.max_tokens, 8192);
    }

    #[test]
    fn adjacent_same_role_messages_are_coalesced() {
        let req = ChatCompletionRequest {
            model: "claude-3-5-sonnet-20241022".to_string(),
            messages: vec![msg("user", "part one"), msg("user", "part two"), msg("assistant", "ok")],
            temperature: None,
            top_p: None,
            stop: None,
            max_tokens: Some(256),
            tools: None,
        };
        let anthropic = to_anthropic_request(&req);
        assert_eq!(anthropic.messages.len(), 2);
        assert_eq!(anthropic.messages[0].content, "part one\npart two");
        assert_eq!(anthropic.max_tokens, 256);
    }

    #[test]
    fn stop_is_renamed_to_stop_sequences() {
        let req = ChatCompletionRequest {
            model: "claude-3-5-sonnet-20241022".to_string(),
            messages: vec![msg("user", "hi")],
            temperature: None,
            top_p: None,
            stop: Some(StopSequences::Many(vec!["STOP".to_string()])),
            max_tokens: None,
            tools: None,
        };
        let anthropic = to_anthropic_request(&req);
        assert_eq!(anthropic.stop_sequences, Some(vec!["STOP".to_string()]));
    }

    #[test]
    fn stop_reason_is_mapped_to_finish_reason_vocabulary() {
        assert_eq!(map_stop_reason(Some("end_turn")), Some("stop".to_string()));
        assert_eq!(map_stop_reason(Some("max_tokens")), Some("length".to_string()));
        assert_eq!(map_stop_reason(None), None);
    }

    #[test]
    fn response_is_billed_against_the_model_the_response_names() {
        // Anthropic's own `model` field wins over whatever the caller
        // requested.
        let anthropic_resp = AnthropicResponse {
            id: "msg_123".to_string(),
            model: "claude-3-opus-20240229".to_string(),
            content: vec![AnthropicContentBlock { block_type: "text".to_string(), text: "hi there".to_string() }],
            stop_reason: Some("end_turn".to_string()),
            usage: AnthropicUsage { input_tokens: 10, output_tokens: 5 },
        };
        let resp = from_anthropic_response(anthropic_resp, "req-1".to_string());
        assert_eq!(resp.model, "claude-3-opus-20240229");
        assert_eq!(resp.usage.total_tokens, 15);
        assert_eq!(resp.choices[0].message.content, "hi there");
    }

    #[test]
    fn response_concatenates_every_text_block() {
        let anthropic_resp = AnthropicResponse {
            id: "msg_124".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            content: vec![
                AnthropicContentBlock { block_type: "text".to_string(), text: "Hello, ".to_string() },
                AnthropicContentBlock { block_type: "text".to_string(), text: "world.".to_string() },
            ],
            stop_reason: Some("end_turn".to_string()),
            usage: AnthropicUsage { input_tokens: 1, output_tokens: 1 },
        };
        let resp = from_anthropic_response(anthropic_resp, "req-2".to_string());
        assert_eq!(resp.choices[0].message.content, "Hello, world.");
    }
}
