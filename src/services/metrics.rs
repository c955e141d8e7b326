//! Prometheus metrics for the supplementary billing engine.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Histogram for database query duration.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "billing_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Histogram for Charging Module request duration.
pub static CM_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "billing_cm_request_duration_seconds",
        "Charging Module request duration in seconds",
        &["operation"],
        vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register CM_REQUEST_DURATION")
});

/// Counter for transactions staged for persistence.
pub static TRANSACTIONS_STAGED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_transactions_staged_total",
        "Total number of transactions staged for persistence",
        &["kind"]
    )
    .expect("Failed to register TRANSACTIONS_STAGED")
});

/// Counter for invoices derived from Charging Module reissues.
pub static INVOICES_REISSUED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_invoices_reissued_total",
        "Total number of invoices derived from Charging Module reissues",
        &["rebilled_type"]
    )
    .expect("Failed to register INVOICES_REISSUED")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "billing_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&CM_REQUEST_DURATION);
    Lazy::force(&TRANSACTIONS_STAGED);
    Lazy::force(&INVOICES_REISSUED);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Record a Charging Module request duration.
pub fn record_cm_request_duration(operation: &str, duration_secs: f64) {
    CM_REQUEST_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// Record transactions staged for persistence.
pub fn record_transactions_staged(kind: &str, count: u64) {
    TRANSACTIONS_STAGED
        .with_label_values(&[kind])
        .inc_by(count as f64);
}

/// Record an invoice derived from a Charging Module reissue.
pub fn record_invoice_reissued(rebilled_type: &str) {
    INVOICES_REISSUED.with_label_values(&[rebilled_type]).inc();
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}
