use std::time::Duration;

use async_trait::async_trait;

use super::provider::PreparedRequest;

/// トランスポートエラー
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Request(String),
    #[error("HTTP request timeout")]
    Timeout,
}

/// HTTPレスポンス。非2xxもここに乗せて返し、扱いはコントローラに委ねる
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTPトランスポート（コントローラから見た送信口）
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// JSONボディをPOSTする
    async fn post_json(&self, request: &PreparedRequest) -> Result<HttpResponse, TransportError>;

    /// 到達性プローブ。ブラウザの navigator.onLine に相当する接続性シグナル
    async fn is_reachable(&self, host: &str) -> bool;
}

/// reqwestベースのトランスポート
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_json(&self, request: &PreparedRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = builder.json(&request.body).send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Request(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(HttpResponse { status, body })
    }

    async fn is_reachable(&self, host: &str) -> bool {
        let addr = format!("{host}:443");
        matches!(
            tokio::time::timeout(Duration::from_secs(3), tokio::net::TcpStream::connect(&addr))
                .await,
            Ok(Ok(_))
        )
    }
}
