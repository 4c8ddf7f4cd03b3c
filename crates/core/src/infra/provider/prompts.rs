//! 操作種別ごとの固定プロンプトテンプレート

use crate::domain::types::OperationKind;

/// 操作種別に対応するプロンプトを構築する
pub fn build_prompt(kind: OperationKind, text: &str) -> String {
    match kind {
        OperationKind::Rephrase => rephrase_prompt(text),
        OperationKind::Dictionary => dictionary_prompt(text),
    }
}

/// Rephrase: 文法修正 + 英訳 + 言い換え候補（最大3件）をJSON配列で要求する
fn rephrase_prompt(text: &str) -> String {
    format!(
        r#"You are an expert multilingual text assistant. Your task is to correct and improve the following text. The text may be in English, 'Thanglish' (Tamil words written in English script), or Tamil.
1.  Correct all grammatical errors.
2.  Translate any Tamil or Thanglish words into their proper English equivalents.
3.  Provide up to 3 alternative, improved versions of the fully translated and corrected English text.
4.  Return ONLY the suggestions as a JSON array of strings, like this: ["suggestion 1", "suggestion 2", "suggestion 3"]. Do not include the original text or any other explanations.

The text to process is: "{text}""#
    )
}

/// Dictionary: 定義 + 翻訳の2件をJSON配列で要求する
fn dictionary_prompt(text: &str) -> String {
    format!(
        r#"You are an expert multilingual dictionary assistant. Your task is to explain the following word or phrase. The input may be in English, 'Thanglish' (Tamil words written in English script), or Tamil.
1.  Provide a concise English definition of the word or phrase.
2.  Provide its Tamil translation or closest equivalent.
3.  Return ONLY the two entries as a JSON array of strings, like this: ["definition", "translation"]. Do not include the original input or any other explanations.

The word or phrase to look up is: "{text}""#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rephrase_prompt_embeds_text() {
        let prompt = build_prompt(OperationKind::Rephrase, "naan veetuku poren");
        assert!(prompt.contains("The text to process is: \"naan veetuku poren\""));
        assert!(prompt.contains("JSON array of strings"));
        assert!(prompt.contains("up to 3 alternative"));
    }

    #[test]
    fn test_dictionary_prompt_embeds_text() {
        let prompt = build_prompt(OperationKind::Dictionary, "veedu");
        assert!(prompt.contains("The word or phrase to look up is: \"veedu\""));
        assert!(prompt.contains("definition"));
        assert!(prompt.contains("translation"));
    }
}
