//! Cursor-driven discovery of remote ledger records.
//!
//! A discovery job runs on a timer. Each tick walks the phases
//! `Syncing → Fetching → Persisting`:
//!
//! 1. **Syncing**: load the job's cursor (or initialize defaults)
//! 2. **Fetching**: scan one page of local source heights, derive height
//!    ranges, and fetch remote records for at most
//!    [`MAX_RANGES_PER_TICK`] ranges with bounded concurrency
//! 3. **Persisting**: skip records already stored (idempotent, counted),
//!    batch-upsert the rest in one operation, then commit the cursor
//!
//! The cursor is committed only after the batch upsert succeeds, so a crash
//! mid-tick replays from the last fully committed unit of work. A fetch
//! error for one range is isolated from the others; the cursor advances only
//! through the unbroken prefix of successful ranges so no range is skipped.

pub mod block_range;

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;

use stride_core::BlockHeight;

use crate::chain::Page;
use crate::cursor::{CursorState, DiscoveryCursor};
use crate::error::Result;
use crate::metrics::FlowMetrics;
use crate::runtime::{Job, TickSummary};
use crate::store::CursorStore;

/// Maximum height ranges processed per tick (bounded remote fan-out).
pub const MAX_RANGES_PER_TICK: usize = 5;

/// A half-open height range `(upper - WIDTH, upper]` of fixed width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HeightRange {
    upper: BlockHeight,
}

impl HeightRange {
    /// Fixed range width in blocks.
    pub const WIDTH: u64 = 100;

    /// Returns the range covering the given height.
    ///
    /// The upper bound is the smallest multiple of [`Self::WIDTH`] that is
    /// greater than or equal to the height.
    #[must_use]
    pub fn covering(height: BlockHeight) -> Self {
        let h = height.value().max(1);
        let upper = h.div_ceil(Self::WIDTH) * Self::WIDTH;
        Self {
            upper: BlockHeight::new(upper),
        }
    }

    /// Inclusive upper bound.
    #[must_use]
    pub const fn upper(&self) -> BlockHeight {
        self.upper
    }

    /// Inclusive lower bound of the half-open range.
    #[must_use]
    pub fn lower(&self) -> BlockHeight {
        BlockHeight::new(self.upper.value() - Self::WIDTH + 1)
    }

    /// Returns true if the height falls inside this range.
    #[must_use]
    pub fn contains(&self, height: BlockHeight) -> bool {
        height >= self.lower() && height <= self.upper
    }
}

impl std::fmt::Display for HeightRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}]", self.upper.value() - Self::WIDTH, self.upper)
    }
}

/// Derives work-unit ranges from ascending source heights.
///
/// Scans the heights in ascending order and opens a new range only when the
/// next height exceeds the current range's upper bound. Heights at or below
/// `resume_after` are skipped; their ranges were already fully processed.
#[must_use]
pub fn plan_ranges(
    heights: &[BlockHeight],
    resume_after: Option<BlockHeight>,
) -> Vec<HeightRange> {
    let mut sorted: Vec<BlockHeight> = heights.to_vec();
    sorted.sort_unstable();

    let mut ranges = Vec::new();
    let mut current: Option<HeightRange> = None;

    for height in sorted {
        if resume_after.is_some_and(|r| height <= r) {
            continue;
        }
        match current {
            Some(range) if range.contains(height) => {}
            _ => {
                let range = HeightRange::covering(height);
                ranges.push(range);
                current = Some(range);
            }
        }
    }

    ranges
}

/// Capability interface a discovery specialization provides.
///
/// The generic [`DiscoveryJob`] drives the phase machine; the source knows
/// how to read local source heights, fetch one range from the remote node,
/// test local existence, and persist a staged batch.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Remote record type produced by a work unit.
    type Record: Send + 'static;

    /// The job's name; keys the cursor row and the lease.
    fn job_name(&self) -> &str;

    /// Fetches one ascending page of local source heights.
    async fn source_heights(&self, page_number: u32) -> Result<Page<BlockHeight>>;

    /// Fetches all remote records within one height range.
    async fn fetch_range(&self, range: HeightRange) -> Result<Vec<Self::Record>>;

    /// The natural-key height of a fetched record.
    fn record_height(record: &Self::Record) -> BlockHeight;

    /// Returns true if the record is already stored locally.
    async fn is_known(&self, record: &Self::Record) -> Result<bool>;

    /// Upserts the staged batch in one all-or-nothing operation.
    async fn persist(&self, records: Vec<Self::Record>) -> Result<()>;
}

/// Generic cursor-driven discovery job.
pub struct DiscoveryJob<S> {
    source: S,
    cursors: Arc<dyn CursorStore>,
    metrics: FlowMetrics,
    max_ranges: usize,
}

impl<S: DiscoverySource> DiscoveryJob<S> {
    /// Creates a discovery job over a source and cursor store.
    pub fn new(source: S, cursors: Arc<dyn CursorStore>) -> Self {
        Self {
            source,
            cursors,
            metrics: FlowMetrics::new(),
            max_ranges: MAX_RANGES_PER_TICK,
        }
    }

    /// Overrides the per-tick range budget.
    #[must_use]
    pub fn with_max_ranges(mut self, max_ranges: usize) -> Self {
        self.max_ranges = max_ranges;
        self
    }

    /// Returns the job's name.
    pub fn name(&self) -> &str {
        self.source.job_name()
    }

    /// Runs one tick.
    ///
    /// # Errors
    ///
    /// Returns an error if syncing, source fetching, or persistence fails;
    /// the cursor is not advanced in that case and the next tick retries
    /// from the same point.
    #[tracing::instrument(skip(self), fields(job = %self.source.job_name()))]
    pub async fn tick(&self) -> Result<TickSummary> {
        // Syncing: load the cursor or initialize defaults.
        let cursor: DiscoveryCursor = match self.cursors.get_cursor(self.source.job_name()).await? {
            Some(row) => row.decode()?,
            None => DiscoveryCursor::default(),
        };
        tracing::debug!(page = cursor.page, last_range = ?cursor.last_range, "cursor synced");

        // Fetching: scan the current source page; if it yields no new work
        // and is not the last page, advance the page and retry once.
        let mut page_number = cursor.page;
        let mut page = self.source.source_heights(page_number).await?;
        let mut ranges = plan_ranges(&page.data, cursor.last_range);

        if ranges.is_empty() && !page.is_last_page() {
            page_number += 1;
            page = self.source.source_heights(page_number).await?;
            ranges = plan_ranges(&page.data, cursor.last_range);
        }

        ranges.truncate(self.max_ranges);

        if ranges.is_empty() {
            let next = DiscoveryCursor {
                page: page_number,
                ..cursor
            };
            self.commit(next).await?;
            tracing::debug!("no new work");
            return Ok(TickSummary::default());
        }

        // Fetch ranges with bounded concurrency, preserving ascending order
        // so the cursor can advance through the successful prefix.
        let fetched: Vec<(HeightRange, Result<Vec<S::Record>>)> =
            futures::stream::iter(ranges.iter().copied())
                .map(|range| async move { (range, self.source.fetch_range(range).await) })
                .buffered(MAX_RANGES_PER_TICK)
                .collect()
                .await;

        let mut summary = TickSummary::default();
        let mut staged: Vec<S::Record> = Vec::new();
        let mut committed_upper: Option<BlockHeight> = None;
        let mut prefix_intact = true;

        for (range, outcome) in fetched {
            match outcome {
                Ok(records) => {
                    let expected: Vec<S::Record> = records
                        .into_iter()
                        .filter(|r| range.contains(S::record_height(r)))
                        .collect();

                    for record in expected {
                        if self.source.is_known(&record).await? {
                            tracing::debug!(
                                height = %S::record_height(&record),
                                "skipping known record"
                            );
                            summary.skipped += 1;
                        } else {
                            staged.push(record);
                        }
                    }

                    if prefix_intact {
                        committed_upper = Some(range.upper());
                    }
                }
                Err(err) => {
                    // Unit failure: isolated from other ranges, but the
                    // cursor must not advance past it.
                    tracing::warn!(range = %range, error = %err, "range fetch failed");
                    summary.failed += 1;
                    prefix_intact = false;
                }
            }
        }

        // Persisting: one batch upsert, then commit the cursor.
        summary.processed = staged.len() as u64;
        if !staged.is_empty() {
            self.source.persist(staged).await?;
        }

        self.metrics
            .record_discovery(self.source.job_name(), summary.processed, summary.skipped);

        let mut next = cursor;
        next.page = page_number;
        if let Some(upper) = committed_upper {
            next = next.advanced(upper, summary.processed);
        }
        self.commit(next).await?;

        tracing::info!(
            persisted = summary.processed,
            skipped = summary.skipped,
            failed_ranges = summary.failed,
            "discovery tick complete"
        );
        Ok(summary)
    }

    async fn commit(&self, cursor: DiscoveryCursor) -> Result<()> {
        let row = CursorState::encode(self.source.job_name(), &cursor)?;
        self.cursors.set_cursor(row).await
    }
}

#[async_trait]
impl<S: DiscoverySource> Job for DiscoveryJob<S> {
    fn name(&self) -> &str {
        self.source.job_name()
    }

    async fn tick(&self) -> Result<TickSummary> {
        Self::tick(self).await
    }
}
