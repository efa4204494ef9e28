//! Parsing the model's final reply into a [`ChatResponse`].

use crate::models::ChatResponse;
use serde_json::Value as JsonValue;

/// Structured JSON carrying both `response_type` and `description` is taken
/// as-is; anything else becomes a text response wrapping the raw reply.
///
/// A single surrounding Markdown code fence is ignored.
pub fn parse_response(text: &str) -> ChatResponse {
    let candidate = strip_code_fence(text.trim());

    if let Ok(value @ JsonValue::Object(_)) = serde_json::from_str::<JsonValue>(candidate) {
        let has_contract_keys = value.get("response_type").is_some_and(JsonValue::is_string)
            && value.get("description").is_some_and(JsonValue::is_string);
        if has_contract_keys {
            if let Ok(response) = serde_json::from_value(value) {
                return response;
            }
        }
    }

    ChatResponse::text(text)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening line
    match body.split_once('\n') {
        Some((info, code)) if !info.contains('{') => code.trim(),
        _ => body.trim(),
    }
}
