//! In-memory ledger node for testing.
//!
//! [`InMemoryLedgerNode`] implements [`LedgerClient`](super::LedgerClient)
//! against vectors of scripted blocks and transactions. Failure injection
//! makes every remote call return [`Error::RemoteUnavailable`] so tick-level
//! abort semantics can be exercised.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::signer::SignedPayload;

use super::{Block, BlockFilter, LedgerClient, Page, SortOrder, Transaction, TransactionFilter};

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

/// Scriptable in-memory ledger node.
#[derive(Debug, Default)]
pub struct InMemoryLedgerNode {
    blocks: RwLock<Vec<Block>>,
    transactions: RwLock<Vec<Transaction>>,
    announced: RwLock<Vec<SignedPayload>>,
    failing: AtomicBool,
}

impl InMemoryLedgerNode {
    /// Creates an empty node.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds blocks to the node.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn add_blocks(&self, blocks: impl IntoIterator<Item = Block>) -> Result<()> {
        let mut guard = self.blocks.write().map_err(poison_err)?;
        guard.extend(blocks);
        Ok(())
    }

    /// Adds transactions to the node.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn add_transactions(&self, txs: impl IntoIterator<Item = Transaction>) -> Result<()> {
        let mut guard = self.transactions.write().map_err(poison_err)?;
        guard.extend(txs);
        Ok(())
    }

    /// Makes subsequent remote calls fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns all payloads announced so far, in announcement order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn announced(&self) -> Result<Vec<SignedPayload>> {
        let guard = self.announced.read().map_err(poison_err)?;
        Ok(guard.clone())
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::remote("node unreachable"));
        }
        Ok(())
    }

    fn paginate<T: Clone>(records: Vec<T>, page_number: u32, page_size: u32) -> Page<T> {
        let page_number = page_number.max(1);
        let page_size = if page_size == 0 { 100 } else { page_size };
        let start = (page_number as usize - 1) * page_size as usize;

        if start >= records.len() {
            return Page::empty(page_number);
        }

        let end = (start + page_size as usize).min(records.len());
        let is_last = end == records.len();
        Page::new(records[start..end].to_vec(), page_number, is_last)
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedgerNode {
    async fn search_blocks(&self, filter: BlockFilter) -> Result<Page<Block>> {
        self.check_available()?;

        let mut matched: Vec<Block> = {
            let guard = self.blocks.read().map_err(poison_err)?;
            guard
                .iter()
                .filter(|b| filter.from_height.is_none_or(|from| b.height >= from))
                .filter(|b| filter.to_height.is_none_or(|to| b.height <= to))
                .cloned()
                .collect()
        };

        match filter.order {
            SortOrder::Asc => matched.sort_by_key(|b| b.height),
            SortOrder::Desc => matched.sort_by_key(|b| std::cmp::Reverse(b.height)),
        }

        Ok(Self::paginate(matched, filter.page_number, filter.page_size))
    }

    async fn search_transactions(&self, filter: TransactionFilter) -> Result<Page<Transaction>> {
        self.check_available()?;

        let mut matched: Vec<Transaction> = {
            let guard = self.transactions.read().map_err(poison_err)?;
            guard
                .iter()
                .filter(|t| filter.recipient.as_ref().is_none_or(|r| &t.recipient == r))
                .filter(|t| {
                    filter
                        .mosaic_id
                        .as_ref()
                        .is_none_or(|m| t.mosaic_id.as_ref() == Some(m))
                })
                .filter(|t| filter.hash.as_ref().is_none_or(|h| &t.hash == h))
                .cloned()
                .collect()
        };

        match filter.order {
            SortOrder::Asc => matched.sort_by_key(|t| t.height),
            SortOrder::Desc => matched.sort_by_key(|t| std::cmp::Reverse(t.height)),
        }

        Ok(Self::paginate(matched, filter.page_number, filter.page_size))
    }

    async fn announce(&self, payload: &SignedPayload) -> Result<()> {
        self.check_available()?;

        let mut guard = self.announced.write().map_err(poison_err)?;
        guard.push(payload.clone());
        Ok(())
    }
}
