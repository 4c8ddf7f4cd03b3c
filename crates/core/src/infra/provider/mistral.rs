use serde_json::{json, Value};

use super::{prompts, PreparedRequest, ProviderAdapter};
use crate::domain::types::OperationKind;

const ENDPOINT: &str = "https://codestral.mistral.ai/v1/chat/completions";
const ENDPOINT_HOST: &str = "codestral.mistral.ai";
const MODEL: &str = "codestral-latest";

/// Mistral chat-completions アダプタ（codestralエンドポイント）
pub struct MistralAdapter;

impl ProviderAdapter for MistralAdapter {
    fn name(&self) -> &str {
        "mistral"
    }

    fn endpoint_host(&self) -> &'static str {
        ENDPOINT_HOST
    }

    fn build_request(&self, kind: OperationKind, text: &str, api_key: &str) -> PreparedRequest {
        let prompt = prompts::build_prompt(kind, text);
        PreparedRequest {
            url: ENDPOINT.to_string(),
            headers: vec![
                ("Content-Type", "application/json".to_string()),
                ("Authorization", format!("Bearer {api_key}")),
            ],
            body: json!({
                "model": MODEL,
                "messages": [{ "role": "user", "content": prompt }],
                "response_format": { "type": "json_object" },
            }),
        }
    }

    fn extract_raw_text(&self, body: &Value) -> Option<String> {
        body.get("choices")?
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()
            .map(|s| s.to_string())
    }
}
