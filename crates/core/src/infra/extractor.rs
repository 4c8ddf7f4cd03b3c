use serde_json::Value;

/// サジェスト抽出エラー
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// モデル出力がJSONとして解釈できない
    #[error("failed to parse model output as JSON")]
    Parse { raw: String },
}

/// モデル出力テキストからサジェスト一覧を取り出す。
///
/// コードフェンスを除去した上でJSONとして解釈し、文字列の配列または
/// `{"suggestions": [...]}` ラッパーの両方を受け付ける。どちらの形でも
/// なければ空のリストに落とす。呼び出し側にパニックは伝播しない
pub fn extract_suggestions(raw: &str) -> Result<Vec<String>, ExtractError> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();

    let value: Value = serde_json::from_str(cleaned).map_err(|_| ExtractError::Parse {
        raw: cleaned.to_string(),
    })?;

    let value = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => map.remove("suggestions").unwrap_or(Value::Null),
        _ => Value::Null,
    };

    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };

    // モデル出力順を保持。文字列以外の要素は落とす
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s),
            _ => None,
        })
        .collect())
}
