use serde::Deserialize;
use serde_json::{json, Value};

use rp_core::domain::error::AppError;
use rp_core::domain::settings::{mask_key, AppSettings};
use rp_core::domain::types::{OperationKind, Provider};
use rp_core::usecase::rephrase_service::RephraseService;

/// 拡張から受け取るメッセージ（typeタグでディスパッチ）
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    Rephrase {
        #[serde(default = "default_operation")]
        operation: OperationKind,
        text: String,
    },
    Abort,
    GetHistory,
    SearchHistory {
        query: String,
    },
    ClearHistory,
    GetSettings,
    UpdateSettings {
        settings: AppSettings,
    },
    SetApiKey {
        provider: Provider,
        key: String,
    },
    DeleteApiKey {
        provider: Provider,
    },
    GetMetrics,
}

fn default_operation() -> OperationKind {
    OperationKind::Rephrase
}

/// リクエストエンベロープ。idは応答に折り返される
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub request: Request,
}

/// メッセージを処理して応答ペイロードを返す
pub async fn handle(service: &RephraseService, envelope: Envelope) -> Value {
    let id = envelope.id;
    let payload = match envelope.request {
        Request::Rephrase { operation, text } => {
            match service.rephrase(operation, &text).await {
                Ok(suggestions) => json!({ "suggestions": suggestions }),
                // キャンセルは失敗ではなく中断として返す
                Err(e) if e.is_aborted() => json!({ "aborted": true }),
                Err(e) => error_payload(&e),
            }
        }
        Request::Abort => json!({ "success": service.abort_current() }),
        Request::GetHistory => match service.history() {
            Ok(history) => json!({ "history": history }),
            Err(e) => error_payload(&e),
        },
        Request::SearchHistory { query } => match service.search_history(&query) {
            Ok(matches) => json!({ "history": matches }),
            Err(e) => error_payload(&e),
        },
        Request::ClearHistory => result_payload(service.clear_history()),
        Request::GetSettings => match service.get_settings() {
            Ok(settings) => json!({ "settings": settings_view(&settings) }),
            Err(e) => error_payload(&e),
        },
        Request::UpdateSettings { settings } => {
            // APIキーは setApiKey/deleteApiKey でのみ更新する。
            // getSettings が返すマスク値の書き戻しを防ぐ
            let result = service.get_settings().and_then(|mut current| {
                current.selected_provider = settings.selected_provider;
                current.force_offline = settings.force_offline;
                current.history_cap = settings.history_cap;
                current.history_write_mode = settings.history_write_mode;
                service.update_settings(&current)
            });
            result_payload(result)
        }
        Request::SetApiKey { provider, key } => {
            result_payload(service.set_api_key(provider, &key))
        }
        Request::DeleteApiKey { provider } => result_payload(service.delete_api_key(provider)),
        Request::GetMetrics => json!({ "metrics": service.metrics_summary() }),
    };

    attach_id(payload, id)
}

/// APIキーをマスクした設定ビュー。生のキーは拡張側へ返さない
fn settings_view(settings: &AppSettings) -> Value {
    json!({
        "selectedProvider": settings.selected_provider,
        "geminiApiKey": settings.gemini_api_key.as_deref().map(mask_key),
        "mistralApiKey": settings.mistral_api_key.as_deref().map(mask_key),
        "forceOffline": settings.force_offline,
        "historyCap": settings.history_cap,
        "historyWriteMode": settings.history_write_mode,
    })
}

fn result_payload(result: Result<(), AppError>) -> Value {
    match result {
        Ok(()) => json!({ "success": true }),
        Err(e) => error_payload(&e),
    }
}

fn error_payload(error: &AppError) -> Value {
    json!({ "error": error.message, "code": error.code })
}

fn attach_id(mut payload: Value, id: Option<u64>) -> Value {
    if let (Some(obj), Some(id)) = (payload.as_object_mut(), id) {
        obj.insert("id".to_string(), json!(id));
    }
    payload
}
