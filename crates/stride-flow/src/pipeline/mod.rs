//! Generic payout pipeline.
//!
//! A pipeline is parameterized by a [`PayoutSource`], the capability
//! interface that knows how to select candidate subjects, gate them through
//! the single-attribution check, and derive reward amounts. The pipeline
//! itself runs three independent scheduled phases:
//!
//! - [`PayoutPipeline::prepare`]: select subjects, verify allowance, compute
//!   the amount, sign, and conditionally insert a `Prepared` record
//! - [`PayoutPipeline::broadcast`]: announce `Prepared` records to the
//!   ledger, moving them to `Broadcast`
//! - [`PayoutPipeline::confirm`]: look `Broadcast` transactions up on the
//!   ledger, moving them to `Confirmed` or, past the confirmation budget,
//!   to `Failed`
//!
//! ## Design Principles
//!
//! - **Single attribution**: the allowance check is a pre-filter; the
//!   conditional insert at the storage layer is the critical section. A
//!   subject selected twice in one tick produces exactly one record
//! - **Per-subject isolation**: a signing or remote failure for one subject
//!   never aborts the batch
//! - **No skipped states**: every record passes through `Prepared`

pub mod booster;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use stride_core::{Address, MosaicId};

use crate::chain::{with_timeout, LedgerClient, TransactionFilter};
use crate::error::Result;
use crate::metrics::FlowMetrics;
use crate::payout::{PayoutRecord, PayoutState};
use crate::runtime::{Job, TickSummary};
use crate::signer::Signer;
use crate::store::PayoutStore;

/// Maximum subjects considered per prepare tick.
pub const MAX_SUBJECTS_PER_TICK: usize = 10;

/// Maximum records announced or checked per broadcast/confirm tick.
const BATCH_LIMIT: usize = 10;

/// Default per-call budget for remote node calls.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time a `Broadcast` record may wait for confirmation before it is
/// marked `Failed`.
const DEFAULT_CONFIRMATION_BUDGET: Duration = Duration::from_secs(60 * 60);

/// Capability interface a payout specialization provides.
#[async_trait]
pub trait PayoutSource: Send + Sync {
    /// The entity evaluated for reward eligibility.
    type Subject: Send + Sync;

    /// The pipeline's name; prefixes its job names.
    fn pipeline_name(&self) -> &str;

    /// The asset this pipeline attributes.
    fn asset_id(&self) -> &MosaicId;

    /// The subject's reward address.
    fn subject_address(subject: &Self::Subject) -> &Address;

    /// Returns a bounded, deterministically ordered candidate list.
    ///
    /// Implementations must return at most [`MAX_SUBJECTS_PER_TICK`]
    /// subjects; the pipeline truncates defensively.
    async fn fetch_subjects(&self) -> Result<Vec<Self::Subject>>;

    /// Returns false if the asset was already attributed to the subject's
    /// address, by an existing payout record or a confirmed ledger transfer.
    async fn verify_attribution_allowance(&self, subject: &Self::Subject) -> Result<bool>;

    /// Per-address reward multiplier.
    async fn multiplier(&self, address: &Address) -> Result<f64>;

    /// Derives the reward amount for a subject.
    fn asset_amount(&self, subject: &Self::Subject, multiplier: f64) -> u64;
}

/// Generic prepare/broadcast/confirm payout pipeline.
pub struct PayoutPipeline<S> {
    source: S,
    payouts: Arc<dyn PayoutStore>,
    node: Arc<dyn LedgerClient>,
    signer: Arc<dyn Signer>,
    metrics: FlowMetrics,
    call_timeout: Duration,
    confirmation_budget: chrono::Duration,
}

impl<S: PayoutSource> PayoutPipeline<S> {
    /// Creates a pipeline over a source, payout store, node and signer.
    pub fn new(
        source: S,
        payouts: Arc<dyn PayoutStore>,
        node: Arc<dyn LedgerClient>,
        signer: Arc<dyn Signer>,
    ) -> Self {
        Self {
            source,
            payouts,
            node,
            signer,
            metrics: FlowMetrics::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            confirmation_budget: chrono::Duration::from_std(DEFAULT_CONFIRMATION_BUDGET)
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Overrides the confirmation budget.
    #[must_use]
    pub fn with_confirmation_budget(mut self, budget: chrono::Duration) -> Self {
        self.confirmation_budget = budget;
        self
    }

    /// Returns the pipeline's name.
    pub fn name(&self) -> &str {
        self.source.pipeline_name()
    }

    /// Selects, verifies, signs and persists `Prepared` payout records.
    ///
    /// Subjects that fail the allowance check are skipped without error;
    /// subjects that fail signing are logged and skipped. One failing
    /// subject never aborts the batch.
    ///
    /// # Errors
    ///
    /// Returns an error only if subject selection itself fails.
    #[tracing::instrument(skip(self), fields(pipeline = %self.source.pipeline_name()))]
    pub async fn prepare(&self) -> Result<TickSummary> {
        let mut subjects = self.source.fetch_subjects().await?;
        subjects.truncate(MAX_SUBJECTS_PER_TICK);

        let mut summary = TickSummary::default();
        for subject in &subjects {
            let address = S::subject_address(subject);

            match self.prepare_one(subject).await {
                Ok(true) => {
                    self.metrics
                        .record_payout(self.source.asset_id().as_str(), "prepared");
                    summary.processed += 1;
                }
                Ok(false) => {
                    tracing::debug!(address = %address, "attribution denied, skipping");
                    summary.skipped += 1;
                }
                Err(err) => {
                    tracing::warn!(address = %address, error = %err, "subject skipped");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            prepared = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            "prepare tick complete"
        );
        Ok(summary)
    }

    /// Prepares one subject. Returns false when attribution is denied.
    async fn prepare_one(&self, subject: &S::Subject) -> Result<bool> {
        if !self.source.verify_attribution_allowance(subject).await? {
            return Ok(false);
        }

        let address = S::subject_address(subject);
        let multiplier = self.source.multiplier(address).await?;
        let amount = self.source.asset_amount(subject, multiplier);

        let signed = self
            .signer
            .sign(self.source.asset_id(), amount, address)
            .await?;

        let record =
            PayoutRecord::prepared(address.clone(), self.source.asset_id().clone(), amount, signed);

        // The conditional insert is the critical section: if a concurrent
        // preparer won the race since the allowance check, nothing is
        // written and the subject counts as skipped.
        Ok(self.payouts.insert_prepared(record).await?.is_inserted())
    }

    /// Announces `Prepared` records to the ledger.
    ///
    /// A failed announcement leaves the record `Prepared` with its attempt
    /// count incremented; the next tick retries it.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or updating records fails.
    #[tracing::instrument(skip(self), fields(pipeline = %self.source.pipeline_name()))]
    pub async fn broadcast(&self) -> Result<TickSummary> {
        let records = self
            .payouts
            .list_in_state(PayoutState::Prepared, BATCH_LIMIT)
            .await?;

        let mut summary = TickSummary::default();
        for mut record in records {
            record.broadcast_attempts += 1;

            let announced = with_timeout(
                "announce",
                self.call_timeout,
                self.node.announce(&record.signed),
            )
            .await;

            match announced {
                Ok(()) => {
                    record.transition_to(PayoutState::Broadcast)?;
                    self.metrics
                        .record_payout(record.mosaic_id.as_str(), "broadcast");
                    summary.processed += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        payout = %record.id,
                        attempts = record.broadcast_attempts,
                        error = %err,
                        "announce failed, will retry"
                    );
                    summary.failed += 1;
                }
            }

            self.payouts.update_payout(&record).await?;
        }

        Ok(summary)
    }

    /// Resolves `Broadcast` records against the ledger.
    ///
    /// A record whose transaction is found moves to `Confirmed`. A record
    /// still unconfirmed past the confirmation budget moves to `Failed`.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or updating records fails.
    #[tracing::instrument(skip(self), fields(pipeline = %self.source.pipeline_name()))]
    pub async fn confirm(&self) -> Result<TickSummary> {
        let records = self
            .payouts
            .list_in_state(PayoutState::Broadcast, BATCH_LIMIT)
            .await?;

        let mut summary = TickSummary::default();
        for mut record in records {
            let filter = TransactionFilter::by_hash(record.signed.tx_hash.clone());
            let found = with_timeout(
                "search_transactions",
                self.call_timeout,
                self.node.search_transactions(filter),
            )
            .await;

            match found {
                Ok(page) if !page.data.is_empty() => {
                    record.transition_to(PayoutState::Confirmed)?;
                    self.payouts.update_payout(&record).await?;
                    self.metrics
                        .record_payout(record.mosaic_id.as_str(), "confirmed");
                    summary.processed += 1;
                }
                Ok(_) => {
                    let waiting_since = record.last_transition_at.unwrap_or(record.created_at);
                    if chrono::Utc::now() - waiting_since > self.confirmation_budget {
                        record.fail("not confirmed within budget")?;
                        self.payouts.update_payout(&record).await?;
                        self.metrics
                            .record_payout(record.mosaic_id.as_str(), "failed");
                        summary.failed += 1;
                    } else {
                        summary.skipped += 1;
                    }
                }
                Err(err) => {
                    tracing::warn!(payout = %record.id, error = %err, "confirmation check failed");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}

/// [`Job`] adapter for the prepare phase.
pub struct PreparePayouts<S> {
    pipeline: Arc<PayoutPipeline<S>>,
    name: String,
}

impl<S: PayoutSource> PreparePayouts<S> {
    /// Wraps a pipeline's prepare phase as a named job.
    pub fn new(pipeline: Arc<PayoutPipeline<S>>) -> Self {
        let name = format!("{}-prepare", pipeline.name());
        Self { pipeline, name }
    }
}

#[async_trait]
impl<S: PayoutSource + 'static> Job for PreparePayouts<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn tick(&self) -> Result<TickSummary> {
        self.pipeline.prepare().await
    }
}

/// [`Job`] adapter for the broadcast phase.
pub struct BroadcastPayouts<S> {
    pipeline: Arc<PayoutPipeline<S>>,
    name: String,
}

impl<S: PayoutSource> BroadcastPayouts<S> {
    /// Wraps a pipeline's broadcast phase as a named job.
    pub fn new(pipeline: Arc<PayoutPipeline<S>>) -> Self {
        let name = format!("{}-broadcast", pipeline.name());
        Self { pipeline, name }
    }
}

#[async_trait]
impl<S: PayoutSource + 'static> Job for BroadcastPayouts<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn tick(&self) -> Result<TickSummary> {
        self.pipeline.broadcast().await
    }
}

/// [`Job`] adapter for the confirm phase.
pub struct ConfirmPayouts<S> {
    pipeline: Arc<PayoutPipeline<S>>,
    name: String,
}

impl<S: PayoutSource> ConfirmPayouts<S> {
    /// Wraps a pipeline's confirm phase as a named job.
    pub fn new(pipeline: Arc<PayoutPipeline<S>>) -> Self {
        let name = format!("{}-confirm", pipeline.name());
        Self { pipeline, name }
    }
}

#[async_trait]
impl<S: PayoutSource + 'static> Job for ConfirmPayouts<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn tick(&self) -> Result<TickSummary> {
        self.pipeline.confirm().await
    }
}
