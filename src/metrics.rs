//! Lightweight in-memory engine counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;

#[derive(Default)]
struct EngineMetrics {
    connects: AtomicU64,
    connect_failures: AtomicU64,
    tls_fallbacks: AtomicU64,
    queries: AtomicU64,
    query_failures: AtomicU64,
    cancelled: AtomicU64,
    timeouts: AtomicU64,
    server_cancels: AtomicU64,
    query_ms_total: AtomicU64,
    query_ms_max: AtomicU64,
}

static ENGINE_METRICS: OnceLock<EngineMetrics> = OnceLock::new();

fn metrics() -> &'static EngineMetrics {
    ENGINE_METRICS.get_or_init(EngineMetrics::default)
}

pub fn record_connect(success: bool) {
    let metrics = metrics();
    metrics.connects.fetch_add(1, Ordering::Relaxed);
    if !success {
        metrics.connect_failures.fetch_add(1, Ordering::Relaxed);
    }
}

/// A postgres connect had to retry with `sslmode=require`.
pub fn record_tls_fallback() {
    metrics().tls_fallbacks.fetch_add(1, Ordering::Relaxed);
}

pub fn record_query(duration_ms: f64, success: bool) {
    let duration_ms = duration_ms.max(0.0) as u64;
    let metrics = metrics();
    metrics.queries.fetch_add(1, Ordering::Relaxed);
    if !success {
        metrics.query_failures.fetch_add(1, Ordering::Relaxed);
    }
    metrics
        .query_ms_total
        .fetch_add(duration_ms, Ordering::Relaxed);
    metrics
        .query_ms_max
        .fetch_max(duration_ms, Ordering::Relaxed);
}

pub fn record_cancel() {
    metrics().cancelled.fetch_add(1, Ordering::Relaxed);
}

pub fn record_timeout() {
    metrics().timeouts.fetch_add(1, Ordering::Relaxed);
}

/// An interrupted statement was stopped on the server.
pub fn record_server_cancel() {
    metrics().server_cancels.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineMetricsSnapshot {
    pub connects: u64,
    pub connect_failures: u64,
    pub tls_fallbacks: u64,
    pub queries: u64,
    pub query_failures: u64,
    pub cancelled: u64,
    pub timeouts: u64,
    pub server_cancels: u64,
    pub avg_query_ms: Option<f64>,
    pub max_query_ms: Option<u64>,
}

pub fn snapshot() -> EngineMetricsSnapshot {
    let metrics = metrics();
    let queries = metrics.queries.load(Ordering::Relaxed);
    let total_ms = metrics.query_ms_total.load(Ordering::Relaxed);
    let max_ms = metrics.query_ms_max.load(Ordering::Relaxed);

    EngineMetricsSnapshot {
        connects: metrics.connects.load(Ordering::Relaxed),
        connect_failures: metrics.connect_failures.load(Ordering::Relaxed),
        tls_fallbacks: metrics.tls_fallbacks.load(Ordering::Relaxed),
        queries,
        query_failures: metrics.query_failures.load(Ordering::Relaxed),
        cancelled: metrics.cancelled.load(Ordering::Relaxed),
        timeouts: metrics.timeouts.load(Ordering::Relaxed),
        server_cancels: metrics.server_cancels.load(Ordering::Relaxed),
        avg_query_ms: (queries > 0).then(|| total_ms as f64 / queries as f64),
        max_query_ms: (max_ms > 0).then_some(max_ms),
    }
}
