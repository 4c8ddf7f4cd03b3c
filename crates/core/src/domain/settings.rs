use serde::{Deserialize, Serialize};

use super::types::{HistoryWriteMode, Provider};

/// アプリケーション設定
/// キー名は拡張側の chrome.storage.local と互換のcamelCase
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// 選択中プロバイダ
    pub selected_provider: Provider,
    /// Gemini APIキー
    pub gemini_api_key: Option<String>,
    /// Mistral APIキー
    pub mistral_api_key: Option<String>,
    /// 旧バージョンが保存していたキー（Geminiのフォールバックとして読む）
    #[serde(rename = "apiKey")]
    pub legacy_api_key: Option<String>,
    /// オフライン強制フラグ
    pub force_offline: bool,
    /// 履歴エントリ上限
    pub history_cap: u32,
    /// 履歴書き込みモード
    pub history_write_mode: HistoryWriteMode,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            selected_provider: Provider::Gemini,
            gemini_api_key: None,
            mistral_api_key: None,
            legacy_api_key: None,
            force_offline: false,
            history_cap: 50,
            history_write_mode: HistoryWriteMode::PlaceholderThenUpdate,
        }
    }
}

impl AppSettings {
    /// プロバイダに対応するAPIキーを返す。未設定なら None
    pub fn api_key_for(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Gemini => self
                .gemini_api_key
                .as_deref()
                .or(self.legacy_api_key.as_deref()),
            Provider::Mistral => self.mistral_api_key.as_deref(),
        }
    }
}

/// APIキーのマスク表示（先頭4文字と末尾4文字のみ残す）
pub fn mask_key(key: &str) -> String {
    if key.len() > 8 && key.is_ascii() {
        format!("{}••••{}", &key[..4], &key[key.len() - 4..])
    } else {
        key.to_string()
    }
}
