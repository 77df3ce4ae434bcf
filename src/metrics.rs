// Prometheus metrics definitions for the arena backend.

use std::time::Instant;

use axum::{body::Body, extract::MatchedPath, http::Request, middleware::Next, response::Response};
use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Counters ─────────────────────────────────────────────────────

    /// Resolved battles, by outcome (win, draw) and verdict source (oracle, fallback).
    pub static ref BATTLES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("arena_battles_total", "Total resolved battles"),
        &["outcome", "source"],
    )
    .unwrap();

    /// Battle requests turned away before any write, by reason.
    pub static ref BATTLE_REJECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("arena_battle_rejections_total", "Battle requests rejected before resolution"),
        &["reason"],
    )
    .unwrap();

    /// Oracle verdicts that decoded successfully.
    pub static ref ORACLE_VERDICTS_TOTAL: IntCounter = IntCounter::new(
        "arena_oracle_verdicts_total",
        "Oracle verdicts used to resolve a battle",
    )
    .unwrap();

    /// Battles resolved by the local fallback, by reason (disabled, transport, timeout, decode).
    pub static ref ORACLE_FALLBACKS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("arena_oracle_fallbacks_total", "Battles resolved by the local fallback"),
        &["reason"],
    )
    .unwrap();

    /// Store writes that failed partway through a battle.
    pub static ref PERSISTENCE_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "arena_persistence_failures_total",
        "Battle persistence sequences that failed partway",
    )
    .unwrap();

    pub static ref CHARACTERS_CREATED_TOTAL: IntCounter = IntCounter::new(
        "arena_characters_created_total",
        "Characters created",
    )
    .unwrap();

    pub static ref CHARACTERS_DELETED_TOTAL: IntCounter = IntCounter::new(
        "arena_characters_deleted_total",
        "Characters deleted",
    )
    .unwrap();

    /// Index entries rewritten or pruned by reconciliation.
    pub static ref INDEX_REPAIRS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("arena_index_repairs_total", "Ranking index entries repaired"),
        &["action"],
    )
    .unwrap();

    /// Total API requests, by method/endpoint/status.
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("arena_api_requests_total", "Total API requests"),
        &["method", "endpoint", "status"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Wall-clock time of the oracle call, including timeouts.
    pub static ref ORACLE_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("arena_oracle_latency_seconds", "Oracle call latency in seconds")
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0]),
    )
    .unwrap();

    /// End-to-end battle resolution time.
    pub static ref BATTLE_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("arena_battle_duration_seconds", "Battle resolution time in seconds")
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )
    .unwrap();

    /// API request duration in seconds, by endpoint.
    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "arena_api_request_duration_seconds",
            "API request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
        &["endpoint"],
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(BATTLES_TOTAL.clone()),
        Box::new(BATTLE_REJECTIONS_TOTAL.clone()),
        Box::new(ORACLE_VERDICTS_TOTAL.clone()),
        Box::new(ORACLE_FALLBACKS_TOTAL.clone()),
        Box::new(PERSISTENCE_FAILURES_TOTAL.clone()),
        Box::new(CHARACTERS_CREATED_TOTAL.clone()),
        Box::new(CHARACTERS_DELETED_TOTAL.clone()),
        Box::new(INDEX_REPAIRS_TOTAL.clone()),
        Box::new(API_REQUESTS_TOTAL.clone()),
        Box::new(ORACLE_LATENCY_SECONDS.clone()),
        Box::new(BATTLE_DURATION_SECONDS.clone()),
        Box::new(API_REQUEST_DURATION_SECONDS.clone()),
    ];

    for c in collectors {
        if let Err(e) = REGISTRY.register(c) {
            tracing::warn!("Metric registration skipped: {e}");
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Normalize a URL path for metric labels: replace id segments with `:id`
/// to prevent cardinality explosion. Character ids look like `<owner>_<ms>`.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            let is_character_id = segment
                .rsplit_once('_')
                .is_some_and(|(owner, ts)| !owner.is_empty() && ts.parse::<i64>().is_ok());
            if segment.parse::<i64>().is_ok() || is_character_id {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Axum middleware recording request counts and latencies.
pub async fn track_requests(req: Request<Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| normalize_path(req.uri().path()));
    let started = Instant::now();

    let response = next.run(req).await;

    API_REQUEST_DURATION_SECONDS
        .with_label_values(&[&endpoint])
        .observe(started.elapsed().as_secs_f64());
    API_REQUESTS_TOTAL
        .with_label_values(&[&method, &endpoint, response.status().as_str()])
        .inc();
    response
}
