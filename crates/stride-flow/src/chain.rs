//! Remote ledger abstraction.
//!
//! This module provides:
//!
//! - [`LedgerClient`]: Trait for paginated block / transaction search and
//!   transaction announcement
//! - [`Page`]: Cursor-friendly result page with last-page detection
//! - [`memory::InMemoryLedgerNode`]: Scriptable fake node for testing
//!
//! ## Design Principles
//!
//! - **Backend agnostic**: Same interface for a real node REST gateway or an
//!   in-memory fake
//! - **Bounded calls**: Every remote call is wrapped in a per-call timeout by
//!   callers via [`with_timeout`]
//! - **Natural keys**: Blocks are keyed by height, transactions by hash

pub mod memory;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stride_core::{Address, BlockHeight, MosaicId, TxHash};

use crate::error::{Error, Result};
use crate::signer::SignedPayload;

/// A block fetched from the remote ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Block height, the natural unique key.
    pub height: BlockHeight,
    /// Block hash.
    pub hash: String,
    /// Block timestamp.
    pub timestamp: DateTime<Utc>,
    /// Number of transactions in the block.
    pub transaction_count: u32,
}

/// A transaction fetched from the remote ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Transaction hash, the natural unique key.
    pub hash: TxHash,
    /// Height of the block containing the transaction.
    pub height: BlockHeight,
    /// Recipient address.
    pub recipient: Address,
    /// Transferred mosaic, if the transaction carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mosaic_id: Option<MosaicId>,
    /// Transferred amount in the mosaic's smallest unit.
    pub amount: u64,
}

/// Sort order for paginated searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending by natural key.
    #[default]
    Asc,
    /// Descending by natural key.
    Desc,
}

/// Filter for block searches.
#[derive(Debug, Clone, Default)]
pub struct BlockFilter {
    /// Inclusive lower height bound.
    pub from_height: Option<BlockHeight>,
    /// Inclusive upper height bound.
    pub to_height: Option<BlockHeight>,
    /// 1-indexed page number.
    pub page_number: u32,
    /// Page size.
    pub page_size: u32,
    /// Sort order by height.
    pub order: SortOrder,
}

impl BlockFilter {
    /// Creates a filter for one height range query.
    #[must_use]
    pub fn height_range(from: BlockHeight, to: BlockHeight) -> Self {
        Self {
            from_height: Some(from),
            to_height: Some(to),
            page_number: 1,
            page_size: 100,
            order: SortOrder::Desc,
        }
    }
}

/// Filter for transaction searches.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Restrict to this recipient.
    pub recipient: Option<Address>,
    /// Restrict to transfers of this mosaic.
    pub mosaic_id: Option<MosaicId>,
    /// Restrict to this transaction hash.
    pub hash: Option<TxHash>,
    /// 1-indexed page number.
    pub page_number: u32,
    /// Page size.
    pub page_size: u32,
    /// Sort order by height.
    pub order: SortOrder,
}

impl TransactionFilter {
    /// Creates a filter that looks up a single transaction by hash.
    #[must_use]
    pub fn by_hash(hash: TxHash) -> Self {
        Self {
            hash: Some(hash),
            page_number: 1,
            page_size: 1,
            ..Self::default()
        }
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// The records on this page.
    pub data: Vec<T>,
    /// 1-indexed page number.
    pub page_number: u32,
    /// Whether this is the final page of the result set.
    is_last: bool,
}

impl<T> Page<T> {
    /// Creates a page.
    #[must_use]
    pub fn new(data: Vec<T>, page_number: u32, is_last: bool) -> Self {
        Self {
            data,
            page_number,
            is_last,
        }
    }

    /// Creates an empty terminal page.
    #[must_use]
    pub fn empty(page_number: u32) -> Self {
        Self {
            data: Vec::new(),
            page_number,
            is_last: true,
        }
    }

    /// Returns true if this is the final page of the result set.
    #[must_use]
    pub const fn is_last_page(&self) -> bool {
        self.is_last
    }
}

/// Remote ledger node abstraction.
///
/// Implementations may target a node REST gateway or an in-memory fake.
/// All calls are potentially blocking I/O; callers wrap them in
/// [`with_timeout`] and treat an elapsed deadline as a unit failure.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Searches blocks matching the filter.
    async fn search_blocks(&self, filter: BlockFilter) -> Result<Page<Block>>;

    /// Searches transactions matching the filter.
    async fn search_transactions(&self, filter: TransactionFilter) -> Result<Page<Transaction>>;

    /// Announces a signed transaction payload for inclusion on the ledger.
    async fn announce(&self, payload: &SignedPayload) -> Result<()>;
}

/// Wraps a remote call in a per-call timeout budget.
///
/// # Errors
///
/// Returns [`Error::Timeout`] if the budget elapses before the call
/// completes, or the call's own error otherwise.
pub async fn with_timeout<F, T>(operation: &str, budget: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: operation.to_string(),
            elapsed_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_last_detection() {
        let page: Page<Block> = Page::new(Vec::new(), 3, true);
        assert!(page.is_last_page());
        assert_eq!(page.page_number, 3);

        let page: Page<Block> = Page::new(Vec::new(), 1, false);
        assert!(!page.is_last_page());
    }

    #[test]
    fn height_range_filter_defaults() {
        let filter = BlockFilter::height_range(BlockHeight::new(101), BlockHeight::new(200));
        assert_eq!(filter.page_number, 1);
        assert_eq!(filter.order, SortOrder::Desc);
        assert_eq!(filter.from_height, Some(BlockHeight::new(101)));
        assert_eq!(filter.to_height, Some(BlockHeight::new(200)));
    }

    #[tokio::test]
    async fn with_timeout_passes_through() {
        let result = with_timeout("noop", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn with_timeout_maps_elapsed() {
        let result: Result<()> = with_timeout("slow", Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(Error::Timeout { .. })));
    }
}
