//! Prometheus metrics for installment-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Ledger mutation counter (posted / updated / deleted).
pub static INSTALLMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "installment_ledger_mutations_total",
        "Total number of installment ledger mutations",
        &["operation"]
    )
    .expect("Failed to register installment_ledger_mutations_total")
});

/// Outstanding refresh counter (ok / error / skipped).
pub static OUTSTANDING_REFRESH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "installment_outstanding_refresh_total",
        "Total number of outstanding snapshot refreshes",
        &["status"]
    )
    .expect("Failed to register installment_outstanding_refresh_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "installment_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register installment_errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "installment_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register installment_db_query_duration_seconds")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&INSTALLMENTS_TOTAL);
    Lazy::force(&OUTSTANDING_REFRESH_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
