use serde::Serialize;
use std::sync::Mutex;

use crate::domain::error::ErrorCode;

/// ローカルメトリクス収集器
pub struct Metrics {
    counters: Mutex<MetricsCounters>,
    latencies: Mutex<Vec<LatencyRecord>>,
}

#[derive(Debug, Default)]
struct MetricsCounters {
    requests_dispatched: u64,
    requests_fulfilled: u64,
    requests_aborted: u64,
    cache_hits: u64,
    cache_misses: u64,
    errors_credential: u64,
    errors_network: u64,
    errors_parse: u64,
    errors_other: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatencyRecord {
    pub phase: String,
    pub duration_ms: u64,
    pub timestamp: String,
}

/// メトリクスサマリー（ホスト経由でUIに返す用）
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub requests_dispatched: u64,
    pub requests_fulfilled: u64,
    pub requests_aborted: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub error_counts: ErrorCounts,
    pub avg_request_ms: Option<f64>,
    pub recent_latencies: Vec<LatencyRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorCounts {
    pub credential: u64,
    pub network: u64,
    pub parse: u64,
    pub other: u64,
}

/// 保持する直近レイテンシ件数
const MAX_LATENCY_RECORDS: usize = 50;

impl Metrics {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(MetricsCounters::default()),
            latencies: Mutex::new(Vec::new()),
        }
    }

    pub fn inc_requests_dispatched(&self) {
        self.counters.lock().unwrap().requests_dispatched += 1;
    }

    pub fn inc_requests_fulfilled(&self) {
        self.counters.lock().unwrap().requests_fulfilled += 1;
    }

    pub fn inc_cache_hits(&self) {
        self.counters.lock().unwrap().cache_hits += 1;
    }

    pub fn inc_cache_misses(&self) {
        self.counters.lock().unwrap().cache_misses += 1;
    }

    /// エラーコード別のカウント。キャンセルは失敗ではなく中断として数える
    pub fn record_error(&self, code: ErrorCode) {
        let mut counters = self.counters.lock().unwrap();
        match code {
            ErrorCode::Aborted => counters.requests_aborted += 1,
            ErrorCode::Credential => counters.errors_credential += 1,
            ErrorCode::Network => counters.errors_network += 1,
            ErrorCode::Parse => counters.errors_parse += 1,
            ErrorCode::CacheMiss => counters.cache_misses += 1,
            _ => counters.errors_other += 1,
        }
    }

    pub fn record_latency(&self, phase: &str, duration_ms: u64) {
        let mut latencies = self.latencies.lock().unwrap();
        latencies.push(LatencyRecord {
            phase: phase.to_string(),
            duration_ms,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
        if latencies.len() > MAX_LATENCY_RECORDS {
            let excess = latencies.len() - MAX_LATENCY_RECORDS;
            latencies.drain(..excess);
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let counters = self.counters.lock().unwrap();
        let latencies = self.latencies.lock().unwrap();

        let request_latencies: Vec<u64> = latencies
            .iter()
            .filter(|r| r.phase == "request")
            .map(|r| r.duration_ms)
            .collect();
        let avg_request_ms = if request_latencies.is_empty() {
            None
        } else {
            Some(request_latencies.iter().sum::<u64>() as f64 / request_latencies.len() as f64)
        };

        MetricsSummary {
            requests_dispatched: counters.requests_dispatched,
            requests_fulfilled: counters.requests_fulfilled,
            requests_aborted: counters.requests_aborted,
            cache_hits: counters.cache_hits,
            cache_misses: counters.cache_misses,
            error_counts: ErrorCounts {
                credential: counters.errors_credential,
                network: counters.errors_network,
                parse: counters.errors_parse,
                other: counters.errors_other,
            },
            avg_request_ms,
            recent_latencies: latencies.clone(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
