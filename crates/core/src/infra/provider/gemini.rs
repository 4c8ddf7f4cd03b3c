use serde_json::{json, Value};

use super::{prompts, PreparedRequest, ProviderAdapter};
use crate::domain::types::OperationKind;

const ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent";
const ENDPOINT_HOST: &str = "generativelanguage.googleapis.com";

/// Gemini generateContent アダプタ
/// キーはクエリパラメータで渡し、JSON出力をMIMEタイプで指定する
pub struct GeminiAdapter;

impl ProviderAdapter for GeminiAdapter {
    fn name(&self) -> &str {
        "gemini"
    }

    fn endpoint_host(&self) -> &'static str {
        ENDPOINT_HOST
    }

    fn build_request(&self, kind: OperationKind, text: &str, api_key: &str) -> PreparedRequest {
        let prompt = prompts::build_prompt(kind, text);
        PreparedRequest {
            url: format!("{ENDPOINT}?key={api_key}"),
            headers: vec![("Content-Type", "application/json".to_string())],
            body: json!({
                "contents": [{ "parts": [{ "text": prompt }] }],
                "generationConfig": { "response_mime_type": "application/json" },
            }),
        }
    }

    fn extract_raw_text(&self, body: &Value) -> Option<String> {
        body.get("candidates")?
            .get(0)?
            .get("content")?
            .get("parts")?
            .get(0)?
            .get("text")?
            .as_str()
            .map(|s| s.to_string())
    }
}
