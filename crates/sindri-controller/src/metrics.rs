/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Metrics Module
//!
//! Prometheus metrics for the Sindri controller: reconciliations, plan
//! applications, task phase transitions, snapshot inventories and admission
//! decisions.

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all controller metrics
static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Reconciliation counter
/// Labels: controller (snapshot/restore/inventory), result (success/error)
pub fn reconciliations_total() -> &'static CounterVec {
    static COUNTER: OnceLock<CounterVec> = OnceLock::new();
    COUNTER.get_or_init(|| {
        let opts = Opts::new(
            "sindri_controller_reconciliations_total",
            "Total number of reconciliations by controller and result",
        );
        let counter = CounterVec::new(opts, &["controller", "result"])
            .expect("Failed to create reconciliations counter");
        registry()
            .register(Box::new(counter.clone()))
            .expect("Failed to register reconciliations counter");
        counter
    })
}

/// Reconciliation failures by error kind
pub fn reconcile_errors_total() -> &'static IntCounterVec {
    static COUNTER: OnceLock<IntCounterVec> = OnceLock::new();
    COUNTER.get_or_init(|| {
        let opts = Opts::new(
            "sindri_controller_reconcile_errors_total",
            "Total number of failed reconciliations by controller and error kind",
        );
        let counter = IntCounterVec::new(opts, &["controller", "kind"])
            .expect("Failed to create reconcile errors counter");
        registry()
            .register(Box::new(counter.clone()))
            .expect("Failed to register reconcile errors counter");
        counter
    })
}

/// Reconciliation duration histogram
/// Labels: controller
pub fn reconcile_duration_seconds() -> &'static HistogramVec {
    static HISTOGRAM: OnceLock<HistogramVec> = OnceLock::new();
    HISTOGRAM.get_or_init(|| {
        let opts = HistogramOpts::new(
            "sindri_controller_reconcile_duration_seconds",
            "Reconciliation latency distribution in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]);
        let histogram = HistogramVec::new(opts, &["controller"])
            .expect("Failed to create reconcile duration histogram");
        registry()
            .register(Box::new(histogram.clone()))
            .expect("Failed to register reconcile duration histogram");
        histogram
    })
}

/// Plan applications
/// Labels: operation (snapshot/restore), outcome (pending/applied/failed/malformed)
pub fn plan_applications_total() -> &'static IntCounterVec {
    static COUNTER: OnceLock<IntCounterVec> = OnceLock::new();
    COUNTER.get_or_init(|| {
        let opts = Opts::new(
            "sindri_controller_plan_applications_total",
            "Total number of plan applications by operation and outcome",
        );
        let counter = IntCounterVec::new(opts, &["operation", "outcome"])
            .expect("Failed to create plan applications counter");
        registry()
            .register(Box::new(counter.clone()))
            .expect("Failed to register plan applications counter");
        counter
    })
}

/// Task phase transitions
/// Labels: kind (snapshot/restore), phase (the phase entered)
pub fn phase_transitions_total() -> &'static IntCounterVec {
    static COUNTER: OnceLock<IntCounterVec> = OnceLock::new();
    COUNTER.get_or_init(|| {
        let opts = Opts::new(
            "sindri_controller_phase_transitions_total",
            "Total number of task phase transitions by kind and entered phase",
        );
        let counter = IntCounterVec::new(opts, &["kind", "phase"])
            .expect("Failed to create phase transitions counter");
        registry()
            .register(Box::new(counter.clone()))
            .expect("Failed to register phase transitions counter");
        counter
    })
}

/// Snapshots published in the latest inventory of each cluster
/// Labels: cluster, storage (local/s3)
pub fn inventory_entries() -> &'static IntGaugeVec {
    static GAUGE: OnceLock<IntGaugeVec> = OnceLock::new();
    GAUGE.get_or_init(|| {
        let opts = Opts::new(
            "sindri_controller_inventory_entries",
            "Number of snapshots in the latest published inventory",
        );
        let gauge = IntGaugeVec::new(opts, &["cluster", "storage"])
            .expect("Failed to create inventory entries gauge");
        registry()
            .register(Box::new(gauge.clone()))
            .expect("Failed to register inventory entries gauge");
        gauge
    })
}

/// Drops the inventory series of a cluster that no longer exists.
pub fn forget_inventory(cluster: &str) {
    for storage in ["local", "s3"] {
        let _ = inventory_entries().remove_label_values(&[cluster, storage]);
    }
}

/// Admission decisions
/// Labels: allowed (true/false)
pub fn admission_decisions_total() -> &'static IntCounterVec {
    static COUNTER: OnceLock<IntCounterVec> = OnceLock::new();
    COUNTER.get_or_init(|| {
        let opts = Opts::new(
            "sindri_controller_admission_decisions_total",
            "Total number of admission decisions",
        );
        let counter = IntCounterVec::new(opts, &["allowed"])
            .expect("Failed to create admission decisions counter");
        registry()
            .register(Box::new(counter.clone()))
            .expect("Failed to register admission decisions counter");
        counter
    })
}

/// Encodes all registered metrics in Prometheus text format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# failed to encode metrics: {}\n", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
