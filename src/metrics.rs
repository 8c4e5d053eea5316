//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Store Metrics
    pub static ref STORE_TRANSACTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("artisan_graph_store_transactions_total", "Total number of store transactions"),
        &["status"]
    ).expect("metric can be created");
    pub static ref STORE_TRANSACTION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "artisan_graph_store_transaction_duration_seconds",
            "Store transaction duration in seconds"
        ).buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        &["status"]
    ).expect("metric can be created");

    // Graph Metrics
    pub static ref FOLLOW_OPERATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "artisan_graph_follow_operations_total",
            "Total number of follow graph mutations"
        ),
        &["operation", "outcome"]
    ).expect("metric can be created");
    pub static ref COUNTER_DRIFT_DETECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("artisan_graph_counter_drift_detected_total", "Counter audits that found drift"),
        &["counter"]
    ).expect("metric can be created");

    // Subscription Metrics
    pub static ref SUBSCRIPTIONS_ACTIVE: IntGauge = IntGauge::new(
        "artisan_graph_subscriptions_active",
        "Current number of open live subscriptions"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("artisan_graph_errors_total", "Total number of errors returned to clients"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(STORE_TRANSACTIONS_TOTAL.clone()))
        .expect("STORE_TRANSACTIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(STORE_TRANSACTION_DURATION_SECONDS.clone()))
        .expect("STORE_TRANSACTION_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(FOLLOW_OPERATIONS_TOTAL.clone()))
        .expect("FOLLOW_OPERATIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(COUNTER_DRIFT_DETECTED_TOTAL.clone()))
        .expect("COUNTER_DRIFT_DETECTED_TOTAL can be registered");
    REGISTRY
        .register(Box::new(SUBSCRIPTIONS_ACTIVE.clone()))
        .expect("SUBSCRIPTIONS_ACTIVE can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}

/// Record one store transaction.
pub fn observe_store_transaction(status: &str, elapsed: Duration) {
    STORE_TRANSACTIONS_TOTAL.with_label_values(&[status]).inc();
    STORE_TRANSACTION_DURATION_SECONDS
        .with_label_values(&[status])
        .observe(elapsed.as_secs_f64());
}

/// Record one follow/unfollow call.
pub fn record_follow_operation(operation: &str, outcome: &str) {
    FOLLOW_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}
