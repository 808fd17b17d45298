//! Job scheduling runtime.
//!
//! The job graph is constructed once at process start from a [`FlowConfig`]
//! and wired by explicit dependency injection; there is no global registry.
//! Every scheduled job implements [`Job`] and is driven by a [`JobRunner`]
//! that wraps each tick in lease acquisition, heartbeat renewal, a tick
//! timeout budget, metrics, and structured logging. A tick that cannot
//! acquire its lease is a no-op.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::Instrument;

use crate::chain::with_timeout;
use crate::error::{Error, Result};
use crate::lease::{JobLease, LeaseResult, RenewResult};
use crate::metrics::FlowMetrics;

/// Counts of work units handled by one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Units processed successfully (persisted, prepared, announced, ...).
    pub processed: u64,
    /// Units skipped as idempotent no-ops.
    pub skipped: u64,
    /// Units that failed and were isolated from the rest of the tick.
    pub failed: u64,
}

/// A named scheduled job.
#[async_trait]
pub trait Job: Send + Sync {
    /// The job's name; keys its cursor row and lease.
    fn name(&self) -> &str;

    /// Runs one tick.
    async fn tick(&self) -> Result<TickSummary>;
}

/// Outcome of one scheduled run attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick ran to completion.
    Completed(TickSummary),
    /// The lease is held by another instance; nothing ran.
    LeaseHeld,
}

/// Reads a required environment variable.
///
/// # Errors
///
/// Returns a configuration error if the variable is unset or empty.
pub fn required_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::configuration(format!(
            "required environment variable {name} is not set"
        ))),
    }
}

/// Reads an optional environment variable with a default.
#[must_use]
pub fn optional_env(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_duration_secs(name: &str, default_secs: u64) -> Result<Duration> {
    let raw = optional_env(name, &default_secs.to_string());
    let secs: u64 = raw
        .parse()
        .map_err(|_| Error::configuration(format!("{name} must be an integer, got '{raw}'")))?;
    Ok(Duration::from_secs(secs))
}

/// Process configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Unique identifier of this process instance, used as the lease holder.
    pub instance_id: String,
    /// How often discovery jobs tick.
    pub discovery_interval: Duration,
    /// How often payout prepare/broadcast jobs tick.
    pub payout_interval: Duration,
    /// How often the confirmation pass ticks.
    pub confirm_interval: Duration,
    /// Hard budget for one tick; an elapsed budget fails the tick.
    pub tick_budget: Duration,
}

impl FlowConfig {
    /// Loads configuration from the environment.
    ///
    /// `STRIDE_INSTANCE_ID` is required; intervals fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for missing or malformed variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            instance_id: required_env("STRIDE_INSTANCE_ID")?,
            discovery_interval: env_duration_secs("STRIDE_DISCOVERY_INTERVAL_SECS", 30)?,
            payout_interval: env_duration_secs("STRIDE_PAYOUT_INTERVAL_SECS", 60)?,
            confirm_interval: env_duration_secs("STRIDE_CONFIRM_INTERVAL_SECS", 120)?,
            tick_budget: env_duration_secs("STRIDE_TICK_BUDGET_SECS", 300)?,
        })
    }
}

/// Drives jobs under lease exclusion and a tick budget.
pub struct JobRunner {
    lease: Arc<dyn JobLease>,
    instance_id: String,
    tick_budget: Duration,
    metrics: FlowMetrics,
}

impl JobRunner {
    /// Creates a runner for one process instance.
    pub fn new(lease: Arc<dyn JobLease>, instance_id: impl Into<String>, tick_budget: Duration) -> Self {
        Self {
            lease,
            instance_id: instance_id.into(),
            tick_budget,
            metrics: FlowMetrics::new(),
        }
    }

    /// Runs one guarded tick of a job.
    ///
    /// Acquires the job's lease, renews it on a heartbeat while the tick
    /// runs, and releases it afterwards even if the tick failed. If the
    /// heartbeat observes the lease lost mid-tick, the tick is abandoned
    /// rather than allowed to overlap with the lease's next holder.
    ///
    /// # Errors
    ///
    /// Returns the tick's error, a timeout error if the tick budget elapsed,
    /// or a lease error if the lease was lost mid-tick. Lease contention at
    /// acquisition is not an error.
    pub async fn run_once(&self, job: &dyn Job) -> Result<TickOutcome> {
        let acquired = self.lease.try_acquire(job.name(), &self.instance_id).await?;
        let LeaseResult::Acquired {
            lease_token,
            lease_duration,
        } = acquired
        else {
            tracing::debug!(job = job.name(), "lease held elsewhere, skipping tick");
            return Ok(TickOutcome::LeaseHeld);
        };

        let mut heartbeat = self.spawn_heartbeat(job.name(), &lease_token, lease_duration);
        let started = Instant::now();
        let span = stride_core::observability::job_span(job.name());
        let tick = with_timeout(job.name(), self.tick_budget, job.tick()).instrument(span);
        tokio::pin!(tick);

        // The heartbeat task only finishes when renewal fails, so its
        // completion means the lease is gone and the tick must stop.
        let result = tokio::select! {
            result = &mut tick => {
                heartbeat.abort();
                result
            }
            _ = &mut heartbeat => {
                tracing::warn!(job = job.name(), "abandoning tick after lease loss");
                Err(Error::LeaseUnavailable {
                    job_name: job.name().to_string(),
                })
            }
        };

        let elapsed = started.elapsed().as_secs_f64();
        if !self.lease.release(job.name(), &lease_token).await? {
            tracing::warn!(job = job.name(), "lease expired before release");
        }

        match result {
            Ok(summary) => {
                self.metrics.record_tick(job.name(), "ok", elapsed);
                Ok(TickOutcome::Completed(summary))
            }
            Err(err) => {
                self.metrics.record_tick(job.name(), "error", elapsed);
                Err(err)
            }
        }
    }

    /// Renews the lease at half-TTL intervals so a slow tick cannot outlive
    /// it.
    fn spawn_heartbeat(
        &self,
        job_name: &str,
        lease_token: &str,
        lease_duration: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let lease = Arc::clone(&self.lease);
        let job_name = job_name.to_string();
        let lease_token = lease_token.to_string();
        let period = lease_duration / 2;

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                match lease.renew(&job_name, &lease_token).await {
                    Ok(RenewResult::Renewed { .. }) => {}
                    Ok(RenewResult::Lost | RenewResult::InvalidToken) => {
                        tracing::warn!(job = %job_name, "lease lost during tick");
                        break;
                    }
                    Err(err) => {
                        tracing::warn!(job = %job_name, error = %err, "lease renewal failed");
                        break;
                    }
                }
            }
        })
    }
}

/// The set of scheduled jobs and their periods.
#[derive(Default)]
pub struct JobGraph {
    jobs: Vec<(Arc<dyn Job>, Duration)>,
}

impl JobGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a job on a fixed period.
    pub fn schedule(&mut self, job: Arc<dyn Job>, every: Duration) -> &mut Self {
        self.jobs.push((job, every));
        self
    }

    /// Returns the number of scheduled jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if no jobs are scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Runs every job on its own interval until the process stops.
    ///
    /// Tick errors are logged, never fatal; the next interval retries.
    pub async fn run(self, runner: Arc<JobRunner>) {
        let mut handles = Vec::new();
        for (job, every) in self.jobs {
            let runner = Arc::clone(&runner);
            handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(every);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    match runner.run_once(job.as_ref()).await {
                        Ok(TickOutcome::Completed(summary)) => {
                            tracing::debug!(job = job.name(), ?summary, "tick complete");
                        }
                        Ok(TickOutcome::LeaseHeld) => {}
                        Err(err) if err.is_transient() => {
                            tracing::warn!(job = job.name(), error = %err, "tick failed, will retry");
                        }
                        Err(err) => {
                            tracing::error!(job = job.name(), error = %err, "tick failed");
                        }
                    }
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}
