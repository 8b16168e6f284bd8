//! Metrics collection.
//!
//! # Metrics
//! - `farm_router_connect_attempts_total` (counter): physical connects by endpoint, outcome
//! - `farm_router_lag_skips_total` (counter): candidates skipped as behind
//! - `farm_router_probes_total` (counter): probe verdicts by endpoint, reachable, cached
//! - `farm_router_pool_evictions_total` (counter): handles dropped by reason
//! - `farm_router_exhausted_total` (counter): routing decisions that found no server
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; the embedding process installs
//!   an exporter if it wants one
//! - Labels are endpoint and dataset strings, never query text

use crate::topology::{Endpoint, Operation};

pub fn record_connect(endpoint: &Endpoint, outcome: &'static str) {
    metrics::counter!(
        "farm_router_connect_attempts_total",
        "endpoint" => endpoint.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_lag_skip(endpoint: &Endpoint) {
    metrics::counter!("farm_router_lag_skips_total", "endpoint" => endpoint.to_string())
        .increment(1);
}

pub fn record_probe(endpoint: &Endpoint, reachable: bool, cached: bool) {
    metrics::counter!(
        "farm_router_probes_total",
        "endpoint" => endpoint.to_string(),
        "reachable" => if reachable { "true" } else { "false" },
        "cached" => if cached { "true" } else { "false" }
    )
    .increment(1);
}

pub fn record_eviction(reason: &'static str) {
    metrics::counter!("farm_router_pool_evictions_total", "reason" => reason).increment(1);
}

pub fn record_exhausted(dataset: &str, operation: Operation) {
    metrics::counter!(
        "farm_router_exhausted_total",
        "dataset" => dataset.to_string(),
        "operation" => operation.as_str()
    )
    .increment(1);
}
