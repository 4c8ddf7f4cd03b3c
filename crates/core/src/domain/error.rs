use serde::Serialize;

use super::types::Provider;

/// アプリケーション共通エラーコード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "E_CREDENTIAL")]
    Credential,
    #[serde(rename = "E_NETWORK")]
    Network,
    #[serde(rename = "E_PARSE")]
    Parse,
    #[serde(rename = "E_ABORTED")]
    Aborted,
    #[serde(rename = "E_CACHE_MISS")]
    CacheMiss,
    #[serde(rename = "E_INVALID_INPUT")]
    InvalidInput,
    #[serde(rename = "E_STORAGE")]
    Storage,
    #[serde(rename = "E_INTERNAL")]
    Internal,
}

/// アプリケーションエラー（ホストへのレスポンスペイロード兼用）
#[derive(Debug, Clone, Serialize)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub recoverable: bool,
}

impl AppError {
    /// 選択中プロバイダのAPIキー未設定。ネットワークアクセス前に検出される
    pub fn credential(provider: Provider) -> Self {
        Self {
            code: ErrorCode::Credential,
            message: format!("{} API Key not set.", provider.display_name()),
            recoverable: true,
        }
    }

    /// 非2xxステータス。本文は診断用にそのまま保持する
    pub fn http_status(status: u16, body: &str) -> Self {
        Self {
            code: ErrorCode::Network,
            message: format!("API call failed with status: {status}. Details: {body}"),
            recoverable: true,
        }
    }

    /// トランスポートレベルの失敗（接続エラー、タイムアウト等）
    pub fn network(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Network,
            message: format!("Failed to get suggestions: {}", msg.into()),
            recoverable: true,
        }
    }

    pub fn parse() -> Self {
        Self {
            code: ErrorCode::Parse,
            message: "Failed to parse AI response.".to_string(),
            recoverable: true,
        }
    }

    /// 意図的なキャンセル。失敗としては扱わない
    pub fn aborted() -> Self {
        Self {
            code: ErrorCode::Aborted,
            message: "Request aborted.".to_string(),
            recoverable: true,
        }
    }

    /// オフライン検索でキャッシュに一致なし
    pub fn cache_miss() -> Self {
        Self {
            code: ErrorCode::CacheMiss,
            message: "No cached result available offline.".to_string(),
            recoverable: true,
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidInput,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Storage,
            message: msg.into(),
            recoverable: false,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Internal,
            message: msg.into(),
            recoverable: false,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.code == ErrorCode::Aborted
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}
