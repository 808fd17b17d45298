//! Pluggable storage for pipeline state.
//!
//! These traits define the query/update contracts the pipeline requires from
//! its document store. Storage engine internals are out of scope; the
//! in-memory implementation in [`memory`] backs tests and local development.
//!
//! ## Design Principles
//!
//! - **Conditional inserts**: Single-attribution and slug uniqueness are
//!   enforced at the storage layer, not by optimistic application logic
//! - **Atomic counters**: Daily activity indexes come from a conditional
//!   increment, never from count-then-create
//! - **Separation of concerns**: Cursors, ledger records, payouts and
//!   activities are independent contracts

pub mod memory;

use async_trait::async_trait;

use stride_core::{Address, BlockHeight, MosaicId, PayoutId, Slug};

use crate::activity::{ActivityRecord, DateSlug};
use crate::chain::{Block, Page, Transaction};
use crate::cursor::CursorState;
use crate::error::Result;
use crate::payout::{PayoutRecord, PayoutState};

/// Result of a conditional payout insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was inserted; the attribution is now reserved.
    Inserted,
    /// A record for `(address, mosaic)` already exists; nothing was written.
    AlreadyAttributed,
}

impl InsertOutcome {
    /// Returns true if the record was inserted.
    #[must_use]
    pub const fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted)
    }
}

/// Persists named job cursors.
///
/// One row per job name, owned exclusively by that job. Read at tick start,
/// written only after the tick's batch has been durably persisted.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Gets the cursor row for a job, if one exists.
    async fn get_cursor(&self, job_name: &str) -> Result<Option<CursorState>>;

    /// Replaces the cursor row for a job.
    async fn set_cursor(&self, state: CursorState) -> Result<()>;
}

/// Local copies of discovered ledger records.
///
/// Records are immutable once written and keyed by their natural unique
/// identifier (block height, transaction hash, or
/// `(address, mosaic, tx hash)` for transfers).
#[async_trait]
pub trait ChainStore: Send + Sync {
    /// Returns one ascending page of block heights referenced by locally
    /// known transactions.
    async fn known_heights(&self, page_number: u32, page_size: u32) -> Result<Page<BlockHeight>>;

    /// Returns true if a block at this height is already stored.
    async fn block_exists(&self, height: BlockHeight) -> Result<bool>;

    /// Upserts a batch of blocks in one operation.
    ///
    /// The batch is all-or-nothing: either every staged block is persisted
    /// or the call fails and the caller must not advance its cursor. Upserts
    /// are keyed by height and idempotent, so replaying a batch is safe.
    async fn upsert_blocks(&self, blocks: Vec<Block>) -> Result<()>;

    /// Records locally discovered transactions (discovery source records).
    async fn record_transactions(&self, transactions: Vec<Transaction>) -> Result<()>;

    /// Returns true if a confirmed transfer of `mosaic_id` to `address` is
    /// already on record.
    async fn mosaic_transfer_exists(&self, address: &Address, mosaic_id: &MosaicId)
        -> Result<bool>;
}

/// Referral relationships between accounts.
#[async_trait]
pub trait ReferralStore: Send + Sync {
    /// Records that `referee` was referred by `referrer`.
    async fn add_referral(&self, referrer: &Address, referee: &Address) -> Result<()>;

    /// Aggregates referral counts per referrer, ordered by address for
    /// deterministic candidate selection.
    async fn referral_counts(&self) -> Result<Vec<(Address, u64)>>;
}

/// Payout records and the single-attribution gate.
#[async_trait]
pub trait PayoutStore: Send + Sync {
    /// Conditionally inserts a `Prepared` record.
    ///
    /// The insert succeeds only if no record exists for the record's
    /// `(address, mosaic)` pair. This is the critical section that makes
    /// `verify allowance → create record` atomic with respect to concurrent
    /// preparers.
    async fn insert_prepared(&self, record: PayoutRecord) -> Result<InsertOutcome>;

    /// Returns true if any payout record exists for `(address, mosaic)`.
    async fn attribution_exists(&self, address: &Address, mosaic_id: &MosaicId) -> Result<bool>;

    /// Lists records in the given state, bounded, in creation order.
    async fn list_in_state(&self, state: PayoutState, limit: usize) -> Result<Vec<PayoutRecord>>;

    /// Gets a record by ID.
    async fn get_payout(&self, id: &PayoutId) -> Result<Option<PayoutRecord>>;

    /// Replaces a record (state transitions, attempt bookkeeping).
    async fn update_payout(&self, record: &PayoutRecord) -> Result<()>;
}

/// Activity records ingested from provider webhooks.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Returns true if an activity with this provider-side ID was already
    /// ingested.
    async fn remote_id_exists(&self, provider: &str, remote_id: u64) -> Result<bool>;

    /// Atomically allocates the next daily index for `(address, date)`.
    ///
    /// The first call for a pair returns 1; every subsequent call returns
    /// the previous value plus one. Concurrent callers never observe the
    /// same index. This replaces the racy count-then-create derivation.
    async fn allocate_daily_index(&self, address: &Address, date_slug: &DateSlug) -> Result<u32>;

    /// Inserts a new record.
    ///
    /// The insert is conditional on both uniqueness keys: the slug and the
    /// `(provider, remote_id)` pair. Concurrent deliveries of one provider
    /// event race here, and exactly one wins.
    ///
    /// # Errors
    ///
    /// Returns a duplicate error if either key is already taken.
    async fn insert_activity(&self, record: ActivityRecord) -> Result<()>;

    /// Gets a record by slug.
    async fn get_activity(&self, slug: &Slug) -> Result<Option<ActivityRecord>>;

    /// Replaces a record (terminal state updates).
    async fn update_activity(&self, record: &ActivityRecord) -> Result<()>;
}
