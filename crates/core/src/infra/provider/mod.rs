pub mod gemini;
pub mod mistral;
pub mod prompts;

use serde_json::Value;

use crate::domain::types::{OperationKind, Provider};

/// プロバイダへ送るHTTPリクエスト一式。送信はコントローラ側で行う
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

/// プロバイダアダプタ。リクエスト構築とレスポンス抽出のみを担い、I/Oは持たない
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// 到達性プローブ用のエンドポイントホスト
    fn endpoint_host(&self) -> &'static str;

    /// 操作種別とテキストからプロバイダ固有のリクエストを組み立てる
    fn build_request(&self, kind: OperationKind, text: &str, api_key: &str) -> PreparedRequest;

    /// レスポンスエンベロープから生成テキストを取り出す。フィールド欠落は None
    fn extract_raw_text(&self, body: &Value) -> Option<String>;
}

/// プロバイダに対応するアダプタを返す
pub fn adapter_for(provider: Provider) -> &'static dyn ProviderAdapter {
    match provider {
        Provider::Gemini => &gemini::GeminiAdapter,
        Provider::Mistral => &mistral::MistralAdapter,
    }
}
