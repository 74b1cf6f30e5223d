//! Prometheus metrics for contact-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Contact and profile operations by outcome (`ok` or an error kind).
pub static OPERATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "contact_operations_total",
        "Total number of contact operations",
        &["operation", "outcome"]
    )
    .expect("Failed to register operations_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "contact_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Avatar token refreshes.
pub static AVATAR_TOKEN_REFRESHES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "contact_avatar_token_refreshes_total",
        "Total number of avatar token refreshes",
        &["status"] // ok, issue_failed, persist_failed, timeout, gone
    )
    .expect("Failed to register avatar_token_refreshes")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "contact_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&OPERATIONS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&AVATAR_TOKEN_REFRESHES);
    Lazy::force(&ERRORS_TOTAL);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}

/// Count one finished operation.
pub fn record_operation<T, E>(
    operation: &str,
    result: &Result<T, E>,
    error_kind: impl Fn(&E) -> &'static str,
) {
    match result {
        Ok(_) => OPERATIONS_TOTAL
            .with_label_values(&[operation, "ok"])
            .inc(),
        Err(e) => {
            let kind = error_kind(e);
            OPERATIONS_TOTAL.with_label_values(&[operation, kind]).inc();
            ERRORS_TOTAL.with_label_values(&[kind]).inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_are_counted_by_outcome() {
        init_metrics();
        let before = OPERATIONS_TOTAL
            .with_label_values(&["metrics_test", "not_found"])
            .get();
        let failed: Result<(), &str> = Err("x");
        record_operation("metrics_test", &failed, |_| "not_found");
        let after = OPERATIONS_TOTAL
            .with_label_values(&["metrics_test", "not_found"])
            .get();
        assert_eq!(after - before, 1.0);
        assert!(get_metrics().contains("contact_operations_total"));
    }
}
