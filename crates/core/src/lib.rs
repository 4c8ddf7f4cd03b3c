//! AI Rephraser コアエンジン。
//!
//! ブラウザ拡張のバックエンドとして、リクエストライフサイクル制御
//! （単一フライト + キャンセル）、プロバイダアダプタ、サジェスト抽出、
//! 履歴キャッシュ（オフラインフォールバック兼用）を提供する。

pub mod domain;
pub mod infra;
pub mod usecase;
