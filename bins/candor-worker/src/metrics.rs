// Prometheus metrics for the Candor worker

use candor_common::types::{ExecutionMode, ExecutionReport};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Suites run (mode: sandboxed | fallback-mock, status: success | partial | error)
    pub static ref SUITES_RUN: CounterVec = CounterVec::new(
        Opts::new("candor_suites_total", "Total number of test suites executed"),
        &["mode", "status"]
    )
    .expect("metric can be created");

    pub static ref TEST_OUTCOMES: CounterVec = CounterVec::new(
        Opts::new("candor_test_outcomes_total", "Per-test outcomes"),
        &["status"]
    )
    .expect("metric can be created");

    // Slowest single test per suite, in milliseconds
    pub static ref SUITE_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("candor_suite_latency_ms", "Suite execution time in milliseconds")
            .buckets(vec![50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]),
        &["mode"]
    )
    .expect("metric can be created");

    // 1 when the isolation backend was unavailable at startup
    pub static ref FALLBACK_MODE: IntGauge = IntGauge::new(
        "candor_fallback_mode",
        "Whether submissions run without container isolation"
    )
    .expect("metric can be created");

    pub static ref SUITES_CANCELLED: IntCounter = IntCounter::new(
        "candor_suites_cancelled_total",
        "Suites cut short by cancellation or session deadline"
    )
    .expect("metric can be created");

    pub static ref STORAGE_FAILURES: IntCounter = IntCounter::new(
        "candor_storage_failures_total",
        "Reports that could not be persisted"
    )
    .expect("metric can be created");
}

/// Initialize metrics registry
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(SUITES_RUN.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(TEST_OUTCOMES.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(SUITE_LATENCY.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(FALLBACK_MODE.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(SUITES_CANCELLED.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(STORAGE_FAILURES.clone()))
        .expect("collector can be registered");
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn set_mode(mode: ExecutionMode) {
    FALLBACK_MODE.set(i64::from(mode == ExecutionMode::FallbackMock));
}

fn label<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn record_report(report: &ExecutionReport) {
    let mode = report.mode.to_string();
    SUITES_RUN
        .with_label_values(&[mode.as_str(), label(&report.status).as_str()])
        .inc();
    SUITE_LATENCY
        .with_label_values(&[mode.as_str()])
        .observe(report.execution_time_ms as f64);
    for result in &report.results {
        TEST_OUTCOMES.with_label_values(&[label(&result.status).as_str()]).inc();
    }
    if !report.complete {
        SUITES_CANCELLED.inc();
    }
}

pub fn record_storage_failure() {
    STORAGE_FAILURES.inc();
}
