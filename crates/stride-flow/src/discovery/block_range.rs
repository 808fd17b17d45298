//! Block discovery keyed on locally known transaction heights.
//!
//! Locally recorded transactions reference block heights whose full block
//! records may not be stored yet. This specialization maps those heights to
//! fixed-width ranges and backfills the missing blocks from the remote node
//! with one descending range query per unit of work.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use stride_core::BlockHeight;

use crate::chain::{with_timeout, Block, BlockFilter, LedgerClient, Page};
use crate::discovery::{DiscoveryJob, DiscoverySource, HeightRange};
use crate::error::Result;
use crate::runtime::{Job, TickSummary};
use crate::store::{ChainStore, CursorStore};

/// Job name; keys the cursor row and the lease.
pub const JOB_NAME: &str = "discover-blocks";

/// Page size used when scanning local source heights.
const SOURCE_PAGE_SIZE: u32 = 100;

/// Default per-call budget for remote node queries.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// [`DiscoverySource`] backed by a [`ChainStore`] and a remote node.
pub struct BlockRangeSource {
    chain: Arc<dyn ChainStore>,
    node: Arc<dyn LedgerClient>,
    call_timeout: Duration,
}

#[async_trait]
impl DiscoverySource for BlockRangeSource {
    type Record = Block;

    fn job_name(&self) -> &str {
        JOB_NAME
    }

    async fn source_heights(&self, page_number: u32) -> Result<Page<BlockHeight>> {
        self.chain.known_heights(page_number, SOURCE_PAGE_SIZE).await
    }

    /// Walks descending pages of the range query until the last page.
    async fn fetch_range(&self, range: HeightRange) -> Result<Vec<Block>> {
        let mut blocks = Vec::new();
        let mut filter = BlockFilter::height_range(range.lower(), range.upper());

        loop {
            let page = with_timeout(
                "search_blocks",
                self.call_timeout,
                self.node.search_blocks(filter.clone()),
            )
            .await?;
            let last = page.is_last_page();
            blocks.extend(page.data);
            if last {
                break;
            }
            filter.page_number += 1;
        }

        Ok(blocks)
    }

    fn record_height(record: &Block) -> BlockHeight {
        record.height
    }

    async fn is_known(&self, record: &Block) -> Result<bool> {
        self.chain.block_exists(record.height).await
    }

    async fn persist(&self, records: Vec<Block>) -> Result<()> {
        self.chain.upsert_blocks(records).await
    }
}

/// Scheduled job that backfills block records for known heights.
pub struct BlockRangeDiscovery {
    job: DiscoveryJob<BlockRangeSource>,
}

impl BlockRangeDiscovery {
    /// Creates the job over a store (chain records + cursors) and a node.
    pub fn new<S, N>(store: Arc<S>, node: Arc<N>) -> Self
    where
        S: ChainStore + CursorStore + 'static,
        N: LedgerClient + 'static,
    {
        Self::with_call_timeout(store, node, DEFAULT_CALL_TIMEOUT)
    }

    /// Creates the job with an explicit per-call timeout budget.
    pub fn with_call_timeout<S, N>(store: Arc<S>, node: Arc<N>, call_timeout: Duration) -> Self
    where
        S: ChainStore + CursorStore + 'static,
        N: LedgerClient + 'static,
    {
        let source = BlockRangeSource {
            chain: Arc::clone(&store) as Arc<dyn ChainStore>,
            node: node as Arc<dyn LedgerClient>,
            call_timeout,
        };
        Self {
            job: DiscoveryJob::new(source, store as Arc<dyn CursorStore>),
        }
    }

    /// Runs one discovery tick.
    ///
    /// # Errors
    ///
    /// Returns an error if the cursor, local source scan, or batch upsert
    /// fails; the cursor is not advanced in that case.
    pub async fn tick(&self) -> Result<TickSummary> {
        self.job.tick().await
    }
}

#[async_trait]
impl Job for BlockRangeDiscovery {
    fn name(&self) -> &str {
        JOB_NAME
    }

    async fn tick(&self) -> Result<TickSummary> {
        Self::tick(self).await
    }
}
