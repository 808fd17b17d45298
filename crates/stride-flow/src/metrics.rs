//! Observability metrics for the pipeline.
//!
//! Prometheus-compatible metrics exposed through the `metrics` crate facade.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `stride_flow_job_ticks_total` | Counter | `job`, `status` | Job tick outcomes |
//! | `stride_flow_job_tick_duration_seconds` | Histogram | `job` | Tick processing time |
//! | `stride_flow_records_discovered_total` | Counter | `job` | Ledger records persisted |
//! | `stride_flow_records_skipped_total` | Counter | `job` | Idempotent skips of known records |
//! | `stride_flow_payouts_total` | Counter | `mosaic`, `state` | Payout records by reached state |
//! | `stride_flow_webhooks_total` | Counter | `provider`, `result` | Webhook ingestion outcomes |
//! | `stride_flow_enrichments_total` | Counter | `provider`, `result` | Enrichment outcomes |

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Job tick outcomes.
    pub const JOB_TICKS_TOTAL: &str = "stride_flow_job_ticks_total";
    /// Histogram: Tick processing time in seconds.
    pub const JOB_TICK_DURATION_SECONDS: &str = "stride_flow_job_tick_duration_seconds";
    /// Counter: Ledger records persisted by discovery.
    pub const RECORDS_DISCOVERED_TOTAL: &str = "stride_flow_records_discovered_total";
    /// Counter: Idempotent skips of already-known records.
    pub const RECORDS_SKIPPED_TOTAL: &str = "stride_flow_records_skipped_total";
    /// Counter: Payout records by reached state.
    pub const PAYOUTS_TOTAL: &str = "stride_flow_payouts_total";
    /// Counter: Webhook ingestion outcomes.
    pub const WEBHOOKS_TOTAL: &str = "stride_flow_webhooks_total";
    /// Counter: Enrichment outcomes.
    pub const ENRICHMENTS_TOTAL: &str = "stride_flow_enrichments_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Job name.
    pub const JOB: &str = "job";
    /// Outcome status (succeeded, failed, lease_held).
    pub const STATUS: &str = "status";
    /// Mosaic identifier.
    pub const MOSAIC: &str = "mosaic";
    /// Payout state label.
    pub const STATE: &str = "state";
    /// Provider name.
    pub const PROVIDER: &str = "provider";
    /// Result label (ingested, duplicate, rejected, processed, failed).
    pub const RESULT: &str = "result";
}

/// Metrics facade for the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowMetrics;

impl FlowMetrics {
    /// Creates the metrics facade.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Records one job tick outcome.
    pub fn record_tick(&self, job: &str, status: &'static str, duration_secs: f64) {
        counter!(
            names::JOB_TICKS_TOTAL,
            labels::JOB => job.to_string(),
            labels::STATUS => status,
        )
        .increment(1);
        histogram!(
            names::JOB_TICK_DURATION_SECONDS,
            labels::JOB => job.to_string(),
        )
        .record(duration_secs);
    }

    /// Records persisted and skipped record counts for one discovery tick.
    pub fn record_discovery(&self, job: &str, persisted: u64, skipped: u64) {
        counter!(
            names::RECORDS_DISCOVERED_TOTAL,
            labels::JOB => job.to_string(),
        )
        .increment(persisted);
        counter!(
            names::RECORDS_SKIPPED_TOTAL,
            labels::JOB => job.to_string(),
        )
        .increment(skipped);
    }

    /// Records a payout record reaching a state.
    pub fn record_payout(&self, mosaic: &str, state: &'static str) {
        counter!(
            names::PAYOUTS_TOTAL,
            labels::MOSAIC => mosaic.to_string(),
            labels::STATE => state,
        )
        .increment(1);
    }

    /// Records a webhook ingestion outcome.
    pub fn record_webhook(&self, provider: &str, result: &'static str) {
        counter!(
            names::WEBHOOKS_TOTAL,
            labels::PROVIDER => provider.to_string(),
            labels::RESULT => result,
        )
        .increment(1);
    }

    /// Records an enrichment outcome.
    pub fn record_enrichment(&self, provider: &str, result: &'static str) {
        counter!(
            names::ENRICHMENTS_TOTAL,
            labels::PROVIDER => provider.to_string(),
            labels::RESULT => result,
        )
        .increment(1);
    }
}
