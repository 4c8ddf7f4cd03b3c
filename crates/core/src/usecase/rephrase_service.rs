use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::domain::error::{AppError, ErrorCode};
use crate::domain::settings::AppSettings;
use crate::domain::types::{HistoryEntry, HistoryWriteMode, OperationKind, Provider};
use crate::infra::extractor::{self, ExtractError};
use crate::infra::http::{HttpResponse, HttpTransport, TransportError};
use crate::infra::metrics::{Metrics, MetricsSummary};
use crate::infra::provider::{adapter_for, ProviderAdapter};
use crate::infra::storage::Storage;

/// 進行中リクエストのハンドル。プロセス全体で高々1つ
struct InFlight {
    epoch: u64,
    cancel_tx: oneshot::Sender<()>,
}

/// リフレーズサービス（リクエストコントローラ）
///
/// 単一フライトポリシーを持つ: 新しいリクエストの登録は既存の進行中
/// リクエストをキャンセルしてから行われ、追い越された側は Aborted として
/// 解決する。オフライン時は履歴キャッシュの部分一致検索へフォールバックする
pub struct RephraseService {
    storage: Mutex<Storage>,
    transport: Arc<dyn HttpTransport>,
    metrics: Metrics,
    current: Mutex<Option<InFlight>>,
    epoch: AtomicU64,
}

impl RephraseService {
    pub fn new(storage: Storage, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            storage: Mutex::new(storage),
            transport,
            metrics: Metrics::new(),
            current: Mutex::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    // ==================== Rephrase ====================

    /// テキストをプロバイダに送り、サジェスト一覧を返す。
    ///
    /// 進行中のリクエストがあれば先にキャンセルされる。強制オフライン時と
    /// ネットワーク到達不可時は履歴キャッシュ検索で代替する
    pub async fn rephrase(
        &self,
        kind: OperationKind,
        text: &str,
    ) -> Result<Vec<String>, AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::invalid_input(
                "Please enter some text to rephrase.",
            ));
        }

        let settings = {
            let storage = self.storage.lock().unwrap();
            storage.get_settings()?
        };
        let provider = settings.selected_provider;
        let adapter = adapter_for(provider);

        // 強制オフライン時はネットワークに一切触れない
        if settings.force_offline {
            log::info!("オフラインモード: キャッシュ検索 ({} 文字)", text.len());
            return self.lookup_cached(text);
        }

        let Some(api_key) = settings.api_key_for(provider) else {
            self.metrics.record_error(ErrorCode::Credential);
            return Err(AppError::credential(provider));
        };

        // 到達性がなければキャッシュへフォールバック
        if !self.transport.is_reachable(adapter.endpoint_host()).await {
            log::warn!(
                "{} に到達できないためキャッシュ検索へフォールバック",
                adapter.endpoint_host()
            );
            return self.lookup_cached(text);
        }

        let request = adapter.build_request(kind, text, api_key);

        if settings.history_write_mode == HistoryWriteMode::PlaceholderThenUpdate {
            let now = chrono::Utc::now().to_rfc3339();
            let storage = self.storage.lock().unwrap();
            storage.append_placeholder(text, &now, settings.history_cap)?;
        }

        let (epoch, mut cancel_rx) = self.begin_request();
        self.metrics.inc_requests_dispatched();
        let started = std::time::Instant::now();

        let result = tokio::select! {
            _ = &mut cancel_rx => {
                log::info!("リクエストはキャンセルされました (epoch {epoch})");
                Err(AppError::aborted())
            }
            response = self.transport.post_json(&request) => {
                self.handle_response(text, &settings, adapter, response, epoch)
            }
        };

        self.metrics
            .record_latency("request", started.elapsed().as_millis() as u64);
        self.finish_request(epoch);

        match &result {
            Ok(_) => self.metrics.inc_requests_fulfilled(),
            Err(e) => self.metrics.record_error(e.code),
        }
        result
    }

    /// 進行中リクエストを明示的に中断する。対象が無ければ false
    pub fn abort_current(&self) -> bool {
        let mut current = self.current.lock().unwrap();
        if let Some(prev) = current.take() {
            log::info!("進行中リクエストを中断 (epoch {})", prev.epoch);
            let _ = prev.cancel_tx.send(());
            true
        } else {
            false
        }
    }

    /// 新しい進行中ハンドルを登録する。既存のハンドルはキャンセルされる
    fn begin_request(&self) -> (u64, oneshot::Receiver<()>) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let mut current = self.current.lock().unwrap();
        if let Some(prev) = current.take() {
            log::info!("先行リクエストを破棄 (epoch {})", prev.epoch);
            let _ = prev.cancel_tx.send(());
        }
        *current = Some(InFlight { epoch, cancel_tx });

        (epoch, cancel_rx)
    }

    /// ハンドルを解放する。後続リクエストに差し替え済みなら何もしない
    fn finish_request(&self, epoch: u64) {
        let mut current = self.current.lock().unwrap();
        if current.as_ref().is_some_and(|c| c.epoch == epoch) {
            *current = None;
        }
    }

    /// 自分が最新のリクエストかどうか。古い応答の誤帰属を防ぐ
    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn handle_response(
        &self,
        text: &str,
        settings: &AppSettings,
        adapter: &dyn ProviderAdapter,
        response: Result<HttpResponse, TransportError>,
        epoch: u64,
    ) -> Result<Vec<String>, AppError> {
        // 応答待ちの間に後続へ差し替えられていたら結果ごと破棄する。
        // 破棄されたリクエストは履歴にも書き込まない
        if !self.is_current(epoch) {
            return Err(AppError::aborted());
        }

        let response = response.map_err(|e| AppError::network(e.to_string()))?;

        if !response.is_success() {
            log::error!("API Error Details: {}", response.body);
            return Err(AppError::http_status(response.status, &response.body));
        }

        let body: serde_json::Value = serde_json::from_str(&response.body)
            .map_err(|e| AppError::network(format!("invalid response body: {e}")))?;

        // 期待フィールドの欠落は空サジェスト扱い（失敗にはしない）
        let Some(raw_text) = adapter.extract_raw_text(&body) else {
            log::warn!("{}: レスポンスに生成テキストがありません", adapter.name());
            return Ok(Vec::new());
        };

        let suggestions = match extractor::extract_suggestions(&raw_text) {
            Ok(suggestions) => suggestions,
            Err(ExtractError::Parse { raw }) => {
                log::error!("Failed to parse JSON response: {raw}");
                return Err(AppError::parse());
            }
        };

        if !suggestions.is_empty() {
            self.record_history(text, &suggestions, settings)?;
        }
        Ok(suggestions)
    }

    /// 設定された書き込みモードで履歴に結果を反映する
    fn record_history(
        &self,
        original: &str,
        suggestions: &[String],
        settings: &AppSettings,
    ) -> Result<(), AppError> {
        let storage = self.storage.lock().unwrap();
        match settings.history_write_mode {
            HistoryWriteMode::PlaceholderThenUpdate => {
                let updated = storage.attach_suggestions(original, suggestions)?;
                if !updated {
                    log::debug!("プレースホルダ不在のため履歴更新をスキップ");
                }
            }
            HistoryWriteMode::DedupReplace => {
                let entry = HistoryEntry {
                    original: original.to_string(),
                    suggestions: suggestions.to_vec(),
                    date: chrono::Utc::now().to_rfc3339(),
                };
                storage.append_deduped(&entry, settings.history_cap)?;
            }
        }
        Ok(())
    }

    /// オフライン/フォールバック検索。最新の部分一致エントリを返す
    fn lookup_cached(&self, query: &str) -> Result<Vec<String>, AppError> {
        let storage = self.storage.lock().unwrap();
        match storage.find_cached(query)? {
            Some(entry) => {
                self.metrics.inc_cache_hits();
                Ok(entry.suggestions)
            }
            None => {
                self.metrics.inc_cache_misses();
                Err(AppError::cache_miss())
            }
        }
    }

    // ==================== Settings ====================

    pub fn get_settings(&self) -> Result<AppSettings, AppError> {
        let storage = self.storage.lock().unwrap();
        storage.get_settings()
    }

    pub fn update_settings(&self, settings: &AppSettings) -> Result<(), AppError> {
        let storage = self.storage.lock().unwrap();
        storage.save_settings(settings)
    }

    /// APIキーを保存し、そのプロバイダを選択状態にする
    pub fn set_api_key(&self, provider: Provider, key: &str) -> Result<(), AppError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::invalid_input("Please enter an API key to save."));
        }

        let storage = self.storage.lock().unwrap();
        let mut settings = storage.get_settings()?;
        match provider {
            Provider::Gemini => settings.gemini_api_key = Some(key.to_string()),
            Provider::Mistral => settings.mistral_api_key = Some(key.to_string()),
        }
        settings.selected_provider = provider;
        storage.save_settings(&settings)?;
        log::info!("{} のAPIキーを保存しました", provider.as_str());
        Ok(())
    }

    pub fn delete_api_key(&self, provider: Provider) -> Result<(), AppError> {
        let storage = self.storage.lock().unwrap();
        let mut settings = storage.get_settings()?;
        match provider {
            Provider::Gemini => settings.gemini_api_key = None,
            Provider::Mistral => settings.mistral_api_key = None,
        }
        storage.save_settings(&settings)?;
        log::info!("{} のAPIキーを削除しました", provider.as_str());
        Ok(())
    }

    // ==================== History ====================

    pub fn history(&self) -> Result<Vec<HistoryEntry>, AppError> {
        let storage = self.storage.lock().unwrap();
        storage.list_history()
    }

    /// オートコンプリート用の部分一致検索（挿入順）
    pub fn search_history(&self, query: &str) -> Result<Vec<HistoryEntry>, AppError> {
        let storage = self.storage.lock().unwrap();
        storage.search_history(query)
    }

    pub fn clear_history(&self) -> Result<(), AppError> {
        let storage = self.storage.lock().unwrap();
        storage.clear_history()
    }

    // ==================== Metrics ====================

    pub fn metrics_summary(&self) -> MetricsSummary {
        self.metrics.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use crate::infra::provider::PreparedRequest;

    /// Gemini形式のレスポンスエンベロープを組み立てる
    fn gemini_envelope(raw_text: &str) -> String {
        serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": raw_text }] } }]
        })
        .to_string()
    }

    /// 応答・遅延・到達性を差し替え可能なモックトランスポート
    struct MockTransport {
        status: u16,
        body: String,
        reachable: bool,
        /// 残り遅延回数。先行リクエストだけ遅くするために使う
        delayed_calls: AtomicUsize,
        delay: Duration,
    }

    impl MockTransport {
        fn ok(body: &str) -> Self {
            Self {
                status: 200,
                body: body.to_string(),
                reachable: true,
                delayed_calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn with_status(status: u16, body: &str) -> Self {
            Self {
                status,
                ..Self::ok(body)
            }
        }

        fn unreachable() -> Self {
            Self {
                reachable: false,
                ..Self::ok("")
            }
        }

        fn delay_first(mut self, delay: Duration) -> Self {
            self.delayed_calls = AtomicUsize::new(1);
            self.delay = delay;
            self
        }
    }

    #[async_trait::async_trait]
    impl HttpTransport for MockTransport {
        async fn post_json(
            &self,
            _request: &PreparedRequest,
        ) -> Result<HttpResponse, TransportError> {
            let delayed = self
                .delayed_calls
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if delayed {
                tokio::time::sleep(self.delay).await;
            }
            Ok(HttpResponse {
                status: self.status,
                body: self.body.clone(),
            })
        }

        async fn is_reachable(&self, _host: &str) -> bool {
            self.reachable
        }
    }

    fn service_with(transport: MockTransport) -> RephraseService {
        service_with_settings(transport, |settings| {
            settings.gemini_api_key = Some("test-key".to_string());
        })
    }

    fn service_with_settings(
        transport: MockTransport,
        configure: impl FnOnce(&mut AppSettings),
    ) -> RephraseService {
        let storage = Storage::open_in_memory().unwrap();
        let mut settings = AppSettings::default();
        configure(&mut settings);
        storage.save_settings(&settings).unwrap();
        RephraseService::new(storage, Arc::new(transport))
    }

    #[tokio::test]
    async fn test_rephrase_success() {
        let service = service_with(MockTransport::ok(&gemini_envelope(r#"["a","b"]"#)));

        let suggestions = service
            .rephrase(OperationKind::Rephrase, "helo wrld")
            .await
            .unwrap();
        assert_eq!(suggestions, vec!["a", "b"]);

        // プレースホルダが結果で埋められている
        let history = service.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].original, "helo wrld");
        assert_eq!(history[0].suggestions, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_fenced_response() {
        let service = service_with(MockTransport::ok(&gemini_envelope(
            "```json\n[\"x\"]\n```",
        )));

        let suggestions = service
            .rephrase(OperationKind::Rephrase, "text")
            .await
            .unwrap();
        assert_eq!(suggestions, vec!["x"]);
    }

    #[tokio::test]
    async fn test_wrapper_response() {
        let service = service_with(MockTransport::ok(&gemini_envelope(
            r#"{"suggestions": ["x","y"]}"#,
        )));

        let suggestions = service
            .rephrase(OperationKind::Rephrase, "text")
            .await
            .unwrap();
        assert_eq!(suggestions, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_empty_input_rejected() {
        let service = service_with(MockTransport::ok(""));
        let err = service
            .rephrase(OperationKind::Rephrase, "   ")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let service = service_with_settings(MockTransport::ok(""), |_| {});
        let err = service
            .rephrase(OperationKind::Rephrase, "text")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Credential);
        assert_eq!(err.message, "Gemini API Key not set.");
    }

    #[tokio::test]
    async fn test_missing_credential_selected_provider() {
        // Geminiキーがあっても、選択中のMistralのキーが無ければエラー
        let service = service_with_settings(MockTransport::ok(""), |settings| {
            settings.selected_provider = Provider::Mistral;
            settings.gemini_api_key = Some("g-key".to_string());
        });
        let err = service
            .rephrase(OperationKind::Rephrase, "text")
            .await
            .unwrap_err();
        assert_eq!(err.message, "Mistral API Key not set.");
    }

    #[tokio::test]
    async fn test_http_error_captures_body() {
        let service = service_with(MockTransport::with_status(500, "quota exceeded"));
        let err = service
            .rephrase(OperationKind::Rephrase, "text")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Network);
        assert!(err.message.contains("500"));
        assert!(err.message.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_parse_failure() {
        let service = service_with(MockTransport::ok(&gemini_envelope("not json")));
        let err = service
            .rephrase(OperationKind::Rephrase, "text")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Parse);
        assert_eq!(err.message, "Failed to parse AI response.");
    }

    #[tokio::test]
    async fn test_missing_envelope_field_yields_empty() {
        let service = service_with(MockTransport::ok("{}"));
        let suggestions = service
            .rephrase(OperationKind::Rephrase, "text")
            .await
            .unwrap();
        assert!(suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_force_offline_cache_hit() {
        let service = service_with_settings(MockTransport::ok(""), |settings| {
            settings.force_offline = true;
        });
        {
            let storage = service.storage.lock().unwrap();
            storage
                .append_deduped(
                    &HistoryEntry {
                        original: "hello world".to_string(),
                        suggestions: vec!["hi".to_string()],
                        date: "2026-01-01T00:00:00Z".to_string(),
                    },
                    50,
                )
                .unwrap();
        }

        let suggestions = service
            .rephrase(OperationKind::Rephrase, "hello")
            .await
            .unwrap();
        assert_eq!(suggestions, vec!["hi"]);
    }

    #[tokio::test]
    async fn test_force_offline_cache_miss() {
        let service = service_with_settings(MockTransport::ok(""), |settings| {
            settings.force_offline = true;
        });
        let err = service
            .rephrase(OperationKind::Rephrase, "zzz")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CacheMiss);
    }

    #[tokio::test]
    async fn test_unreachable_falls_back_to_cache() {
        let service = service_with_settings(MockTransport::unreachable(), |settings| {
            settings.gemini_api_key = Some("test-key".to_string());
        });
        {
            let storage = service.storage.lock().unwrap();
            storage
                .append_deduped(
                    &HistoryEntry {
                        original: "cached text".to_string(),
                        suggestions: vec!["cached".to_string()],
                        date: "2026-01-01T00:00:00Z".to_string(),
                    },
                    50,
                )
                .unwrap();
        }

        let suggestions = service
            .rephrase(OperationKind::Rephrase, "cached")
            .await
            .unwrap();
        assert_eq!(suggestions, vec!["cached"]);
    }

    #[tokio::test]
    async fn test_supersede_aborts_previous() {
        let transport = MockTransport::ok(&gemini_envelope(r#"["b"]"#))
            .delay_first(Duration::from_millis(500));
        let service = Arc::new(service_with(transport));

        let first = {
            let service = service.clone();
            tokio::spawn(async move { service.rephrase(OperationKind::Rephrase, "first").await })
        };
        // 先行リクエストがディスパッチされるまで待つ
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = service.rephrase(OperationKind::Rephrase, "second").await;
        assert_eq!(second.unwrap(), vec!["b"]);

        let first = first.await.unwrap();
        assert!(first.unwrap_err().is_aborted());
    }

    #[tokio::test]
    async fn test_superseded_request_never_writes_history() {
        let transport = MockTransport::ok(&gemini_envelope(r#"["b"]"#))
            .delay_first(Duration::from_millis(500));
        let service = Arc::new(service_with(transport));

        let first = {
            let service = service.clone();
            tokio::spawn(async move { service.rephrase(OperationKind::Rephrase, "first").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        service
            .rephrase(OperationKind::Rephrase, "second")
            .await
            .unwrap();
        first.await.unwrap().unwrap_err();

        let history = service.history().unwrap();
        assert_eq!(history.len(), 2);
        // 追い越された側のプレースホルダは空のまま
        assert_eq!(history[0].original, "first");
        assert!(history[0].suggestions.is_empty());
        assert_eq!(history[1].suggestions, vec!["b"]);
    }

    #[tokio::test]
    async fn test_abort_current() {
        let transport = MockTransport::ok(&gemini_envelope(r#"["a"]"#))
            .delay_first(Duration::from_millis(500));
        let service = Arc::new(service_with(transport));

        assert!(!service.abort_current());

        let pending = {
            let service = service.clone();
            tokio::spawn(async move { service.rephrase(OperationKind::Rephrase, "text").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(service.abort_current());
        let result = pending.await.unwrap();
        assert!(result.unwrap_err().is_aborted());

        // 中断後は対象なし
        assert!(!service.abort_current());
    }

    #[tokio::test]
    async fn test_dedup_mode_replaces_entry() {
        let transport = MockTransport::ok(&gemini_envelope(r#"["a"]"#));
        let service = service_with_settings(transport, |settings| {
            settings.gemini_api_key = Some("test-key".to_string());
            settings.history_write_mode = HistoryWriteMode::DedupReplace;
        });

        service
            .rephrase(OperationKind::Rephrase, "Hello")
            .await
            .unwrap();
        service
            .rephrase(OperationKind::Rephrase, "hello")
            .await
            .unwrap();

        let history = service.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].original, "hello");
    }

    #[tokio::test]
    async fn test_metrics_recorded() {
        let service = service_with(MockTransport::ok(&gemini_envelope(r#"["a"]"#)));
        service
            .rephrase(OperationKind::Rephrase, "text")
            .await
            .unwrap();

        let summary = service.metrics_summary();
        assert_eq!(summary.requests_dispatched, 1);
        assert_eq!(summary.requests_fulfilled, 1);
        assert_eq!(summary.requests_aborted, 0);
    }

    #[tokio::test]
    async fn test_set_and_delete_api_key() {
        let service = service_with_settings(MockTransport::ok(""), |_| {});

        service.set_api_key(Provider::Mistral, "m-key").unwrap();
        let settings = service.get_settings().unwrap();
        assert_eq!(settings.selected_provider, Provider::Mistral);
        assert_eq!(settings.mistral_api_key.as_deref(), Some("m-key"));

        service.delete_api_key(Provider::Mistral).unwrap();
        let settings = service.get_settings().unwrap();
        assert!(settings.mistral_api_key.is_none());

        let err = service.set_api_key(Provider::Gemini, "  ").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }
}
