// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the Pi-hole reconciler.
//!
//! This module provides metrics collection with the namespace prefix
//! `pihole_reconciler_`.
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - One observation per instance per pass
//! - **Action Metrics** - Outcome of every (instance, kind, key)
//! - **Error Metrics** - Failures by kind and reason code
//!
//! The binary renders [`gather_metrics`] into a node-exporter textfile when
//! asked to; nothing here serves HTTP.
//!
//! # Example
//!
//! ```rust,no_run
//! use pihole_reconciler::metrics::record_instance_reconciled;
//!
//! record_instance_reconciled("pihole-a", true, std::time::Duration::from_secs(1));
//! ```

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

use crate::constants::METRICS_NAMESPACE;

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of instance reconciliations by instance and status
///
/// Labels:
/// - `instance`: Instance name
/// - `status`: `success` when no result failed, `error` otherwise
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of instance reconciliations by instance and status",
    );
    let counter = CounterVec::new(opts, &["instance", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of one instance's reconciliation in seconds
///
/// Labels:
/// - `instance`: Instance name
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of instance reconciliations in seconds",
    )
    .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]);
    let histogram = HistogramVec::new(opts, &["instance"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Action Metrics
// ============================================================================

/// Total number of per-entity outcomes
///
/// Labels:
/// - `kind`: Entity kind (`group`, `dns_record`, `list`, `client`)
/// - `outcome`: `unchanged`, `created`, `updated`, `deleted` or `failed`
pub static ACTIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_actions_total"),
        "Total number of per-entity outcomes by kind and outcome",
    );
    let counter = CounterVec::new(opts, &["kind", "outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Total number of failures by kind and reason code
///
/// Labels:
/// - `kind`: Entity kind
/// - `reason`: Reason code from [`crate::status_reasons`]
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of failures by kind and reason",
    );
    let counter = CounterVec::new(opts, &["kind", "reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record one instance's pass
///
/// # Arguments
/// * `instance` - Instance name
/// * `success` - Whether every result for the instance converged
/// * `duration` - Wall time spent on the instance
pub fn record_instance_reconciled(instance: &str, success: bool, duration: Duration) {
    let status = if success { "success" } else { "error" };
    RECONCILIATION_TOTAL
        .with_label_values(&[instance, status])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[instance])
        .observe(duration.as_secs_f64());
}

/// Record a per-entity outcome
pub fn record_action(kind: &str, outcome: &str) {
    ACTIONS_TOTAL.with_label_values(&[kind, outcome]).inc();
}

/// Record a failure reason
pub fn record_error(kind: &str, reason: &str) {
    ERRORS_TOTAL.with_label_values(&[kind, reason]).inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
