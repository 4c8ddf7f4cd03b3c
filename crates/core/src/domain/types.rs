use serde::{Deserialize, Serialize};

/// 操作種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// 文法修正 + 翻訳 + 言い換え候補（最大3件）
    Rephrase,
    /// 定義 + 翻訳（2件）
    Dictionary,
}

/// LLMプロバイダ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Gemini,
    Mistral,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Mistral => "mistral",
        }
    }

    /// ユーザー向け表示名（エラーメッセージで使用）
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Gemini => "Gemini",
            Self::Mistral => "Mistral",
        }
    }
}

/// 履歴エントリ
/// フィールド名は拡張側が保存していたJSONと互換
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub original: String,
    pub suggestions: Vec<String>,
    /// ISO-8601 タイムスタンプ
    pub date: String,
}

/// 履歴書き込みモード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryWriteMode {
    /// ディスパッチ時に空サジェストのプレースホルダを追加し、
    /// 結果到着後に最後の一致エントリへ書き込む
    PlaceholderThenUpdate,
    /// 同一original（大文字小文字無視）の既存エントリを置き換えて追加する
    DedupReplace,
}
