mod commands;
mod protocol;

use std::sync::Arc;

use rp_core::infra::http::ReqwestTransport;
use rp_core::infra::storage::Storage;
use rp_core::usecase::rephrase_service::RephraseService;

/// DBパスはアプリデータディレクトリに配置
/// 開発時は RP_DB_PATH で差し替える
fn db_path() -> String {
    std::env::var("RP_DB_PATH").unwrap_or_else(|_| {
        let dir = dirs::data_local_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join("ai-rephraser");
        std::fs::create_dir_all(&dir).ok();
        dir.join("rephraser.db").to_string_lossy().to_string()
    })
}

#[tokio::main]
async fn main() {
    // stdout はメッセージチャネル専用なのでログは stderr へ。
    // RUST_LOG でフィルタ指定、既定は info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let storage = Storage::open(&db_path()).expect("SQLite の初期化に失敗しました");
    let transport = Arc::new(ReqwestTransport::new());
    let service = Arc::new(RephraseService::new(storage, transport));
    log::info!("ai-rephraser-host 起動");

    let mut stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<serde_json::Value>();

    // 応答は専用タスクで直列に書き込む
    let writer = tokio::spawn(async move {
        let mut stdout = stdout;
        while let Some(message) = rx.recv().await {
            if let Err(e) = protocol::write_message(&mut stdout, &message).await {
                log::error!("レスポンス書き込みに失敗: {e}");
                break;
            }
        }
    });

    loop {
        match protocol::read_message(&mut stdin).await {
            Ok(Some(value)) => {
                let envelope: commands::Envelope = match serde_json::from_value(value) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        log::warn!("不正なメッセージ: {e}");
                        let _ = tx.send(serde_json::json!({
                            "error": format!("invalid message: {e}"),
                        }));
                        continue;
                    }
                };

                // 進行中リクエストの追い越しや中断を受け付けるため、
                // メッセージごとに別タスクで処理する
                let service = service.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let response = commands::handle(&service, envelope).await;
                    let _ = tx.send(response);
                });
            }
            Ok(None) => {
                log::info!("拡張側がチャネルを閉じました");
                break;
            }
            Err(e) => {
                log::error!("メッセージ読み取りに失敗: {e}");
                break;
            }
        }
    }

    drop(tx);
    let _ = writer.await;
}
