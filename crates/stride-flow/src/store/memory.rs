//! In-memory store implementation for testing.
//!
//! [`InMemoryStore`] implements every storage contract in [`super`] using
//! `RwLock`-guarded maps. Conditional operations (payout insert, daily index
//! allocation, activity insert) each run under a single write lock, which
//! gives them the same atomicity the production store provides through
//! unique indexes and conditional updates.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No durability, no cross-process
//!   coordination
//! - **Single-process only**: State is not shared across process boundaries

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use stride_core::{Address, BlockHeight, MosaicId, PayoutId, Slug, TxHash};

use crate::activity::{ActivityRecord, DateSlug};
use crate::chain::{Block, Page, Transaction};
use crate::cursor::CursorState;
use crate::error::{Error, Result};
use crate::payout::{PayoutRecord, PayoutState};

use super::{
    ActivityStore, ChainStore, CursorStore, InsertOutcome, PayoutStore, ReferralStore,
};

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

/// In-memory store for testing and local development.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    cursors: RwLock<HashMap<String, CursorState>>,
    blocks: RwLock<BTreeMap<BlockHeight, Block>>,
    transactions: RwLock<HashMap<TxHash, Transaction>>,
    referrals: RwLock<BTreeMap<Address, BTreeSet<Address>>>,
    payouts: RwLock<PayoutShard>,
    daily_counters: RwLock<HashMap<(Address, String), u32>>,
    activities: RwLock<ActivityShard>,
}

#[derive(Debug, Default)]
struct PayoutShard {
    records: Vec<PayoutRecord>,
    attributed: HashSet<(Address, MosaicId)>,
}

#[derive(Debug, Default)]
struct ActivityShard {
    records: HashMap<Slug, ActivityRecord>,
    remote_ids: HashSet<(String, u64)>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of blocks currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn block_count(&self) -> Result<usize> {
        let blocks = self.blocks.read().map_err(poison_err)?;
        Ok(blocks.len())
    }

    /// Returns the number of payout records currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn payout_count(&self) -> Result<usize> {
        let shard = self.payouts.read().map_err(poison_err)?;
        Ok(shard.records.len())
    }
}

#[async_trait]
impl CursorStore for InMemoryStore {
    async fn get_cursor(&self, job_name: &str) -> Result<Option<CursorState>> {
        let cursors = self.cursors.read().map_err(poison_err)?;
        Ok(cursors.get(job_name).cloned())
    }

    async fn set_cursor(&self, state: CursorState) -> Result<()> {
        let mut cursors = self.cursors.write().map_err(poison_err)?;
        cursors.insert(state.job_name.clone(), state);
        Ok(())
    }
}

#[async_trait]
impl ChainStore for InMemoryStore {
    async fn known_heights(&self, page_number: u32, page_size: u32) -> Result<Page<BlockHeight>> {
        let heights: Vec<BlockHeight> = {
            let transactions = self.transactions.read().map_err(poison_err)?;
            let unique: BTreeSet<BlockHeight> =
                transactions.values().map(|t| t.height).collect();
            unique.into_iter().collect()
        };

        let page_number = page_number.max(1);
        let page_size = if page_size == 0 { 100 } else { page_size };
        let start = (page_number as usize - 1) * page_size as usize;

        if start >= heights.len() {
            return Ok(Page::empty(page_number));
        }

        let end = (start + page_size as usize).min(heights.len());
        let is_last = end == heights.len();
        Ok(Page::new(heights[start..end].to_vec(), page_number, is_last))
    }

    async fn block_exists(&self, height: BlockHeight) -> Result<bool> {
        let blocks = self.blocks.read().map_err(poison_err)?;
        Ok(blocks.contains_key(&height))
    }

    async fn upsert_blocks(&self, staged: Vec<Block>) -> Result<()> {
        // A single write lock makes the batch all-or-nothing, matching the
        // contract callers rely on before committing their cursor.
        let mut blocks = self.blocks.write().map_err(poison_err)?;
        for block in staged {
            blocks.insert(block.height, block);
        }
        Ok(())
    }

    async fn record_transactions(&self, staged: Vec<Transaction>) -> Result<()> {
        let mut transactions = self.transactions.write().map_err(poison_err)?;
        for tx in staged {
            transactions.insert(tx.hash.clone(), tx);
        }
        Ok(())
    }

    async fn mosaic_transfer_exists(
        &self,
        address: &Address,
        mosaic_id: &MosaicId,
    ) -> Result<bool> {
        let transactions = self.transactions.read().map_err(poison_err)?;
        Ok(transactions.values().any(|t| {
            &t.recipient == address && t.mosaic_id.as_ref() == Some(mosaic_id)
        }))
    }
}

#[async_trait]
impl ReferralStore for InMemoryStore {
    async fn add_referral(&self, referrer: &Address, referee: &Address) -> Result<()> {
        let mut referrals = self.referrals.write().map_err(poison_err)?;
        referrals
            .entry(referrer.clone())
            .or_default()
            .insert(referee.clone());
        Ok(())
    }

    async fn referral_counts(&self) -> Result<Vec<(Address, u64)>> {
        let referrals = self.referrals.read().map_err(poison_err)?;
        // BTreeMap iteration gives the deterministic address ordering the
        // payout candidate selection depends on.
        Ok(referrals
            .iter()
            .map(|(referrer, referees)| (referrer.clone(), referees.len() as u64))
            .collect())
    }
}

#[async_trait]
impl PayoutStore for InMemoryStore {
    async fn insert_prepared(&self, record: PayoutRecord) -> Result<InsertOutcome> {
        let key = (record.address.clone(), record.mosaic_id.clone());

        // Check and insert under one write lock; concurrent preparers for
        // the same (address, mosaic) cannot both succeed.
        let mut shard = self.payouts.write().map_err(poison_err)?;
        if shard.attributed.contains(&key) {
            return Ok(InsertOutcome::AlreadyAttributed);
        }
        shard.attributed.insert(key);
        shard.records.push(record);
        Ok(InsertOutcome::Inserted)
    }

    async fn attribution_exists(&self, address: &Address, mosaic_id: &MosaicId) -> Result<bool> {
        let shard = self.payouts.read().map_err(poison_err)?;
        Ok(shard
            .attributed
            .contains(&(address.clone(), mosaic_id.clone())))
    }

    async fn list_in_state(&self, state: PayoutState, limit: usize) -> Result<Vec<PayoutRecord>> {
        let shard = self.payouts.read().map_err(poison_err)?;
        Ok(shard
            .records
            .iter()
            .filter(|r| r.state == state)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_payout(&self, id: &PayoutId) -> Result<Option<PayoutRecord>> {
        let shard = self.payouts.read().map_err(poison_err)?;
        Ok(shard.records.iter().find(|r| &r.id == id).cloned())
    }

    async fn update_payout(&self, record: &PayoutRecord) -> Result<()> {
        let mut shard = self.payouts.write().map_err(poison_err)?;
        let Some(existing) = shard.records.iter_mut().find(|r| r.id == record.id) else {
            return Err(Error::storage(format!(
                "payout record {} not found",
                record.id
            )));
        };
        *existing = record.clone();
        Ok(())
    }
}

#[async_trait]
impl ActivityStore for InMemoryStore {
    async fn remote_id_exists(&self, provider: &str, remote_id: u64) -> Result<bool> {
        let shard = self.activities.read().map_err(poison_err)?;
        Ok(shard
            .remote_ids
            .contains(&(provider.to_string(), remote_id)))
    }

    async fn allocate_daily_index(
        &self,
        address: &Address,
        date_slug: &DateSlug,
    ) -> Result<u32> {
        // Fetch-and-increment under one write lock. A production store does
        // the same with a conditional update on a counter document.
        let mut counters = self.daily_counters.write().map_err(poison_err)?;
        let counter = counters
            .entry((address.clone(), date_slug.as_str().to_string()))
            .or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn insert_activity(&self, record: ActivityRecord) -> Result<()> {
        // Both uniqueness checks and the insert run under one write lock,
        // so concurrent deliveries of the same provider event cannot both
        // pass the dedupe gate.
        let mut shard = self.activities.write().map_err(poison_err)?;
        let remote_key = (record.provider.clone(), record.remote_id);
        if shard.remote_ids.contains(&remote_key) {
            return Err(Error::duplicate(format!(
                "provider activity {}/{} already ingested",
                record.provider, record.remote_id
            )));
        }
        if shard.records.contains_key(&record.slug) {
            return Err(Error::duplicate(format!(
                "activity slug {} already exists",
                record.slug
            )));
        }
        shard.remote_ids.insert(remote_key);
        shard.records.insert(record.slug.clone(), record);
        Ok(())
    }

    async fn get_activity(&self, slug: &Slug) -> Result<Option<ActivityRecord>> {
        let shard = self.activities.read().map_err(poison_err)?;
        Ok(shard.records.get(slug).cloned())
    }

    async fn update_activity(&self, record: &ActivityRecord) -> Result<()> {
        let mut shard = self.activities.write().map_err(poison_err)?;
        let Some(existing) = shard.records.get_mut(&record.slug) else {
            return Err(Error::storage(format!(
                "activity {} not found",
                record.slug
            )));
        };
        *existing = record.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::SignedPayload;
    use chrono::Utc;
    use std::sync::Arc;

    fn block(height: u64) -> Block {
        Block {
            height: BlockHeight::new(height),
            hash: format!("B{height}"),
            timestamp: Utc::now(),
            transaction_count: 0,
        }
    }

    fn transaction(hash: &str, height: u64) -> Transaction {
        Transaction {
            hash: TxHash::new(hash),
            height: BlockHeight::new(height),
            recipient: Address::new("TADDR"),
            mosaic_id: None,
            amount: 1,
        }
    }

    fn prepared(address: &str, mosaic: &str) -> PayoutRecord {
        PayoutRecord::prepared(
            Address::new(address),
            MosaicId::new(mosaic),
            10,
            SignedPayload {
                tx_hash: TxHash::new(format!("H-{address}-{mosaic}")),
                payload: "p".into(),
            },
        )
    }

    #[tokio::test]
    async fn cursor_roundtrip() -> Result<()> {
        let store = InMemoryStore::new();
        assert!(store.get_cursor("discover-blocks").await?.is_none());

        let state = CursorState {
            job_name: "discover-blocks".into(),
            data: serde_json::json!({"page": 2}),
        };
        store.set_cursor(state.clone()).await?;

        assert_eq!(store.get_cursor("discover-blocks").await?, Some(state));
        Ok(())
    }

    #[tokio::test]
    async fn known_heights_are_ascending_and_deduplicated() -> Result<()> {
        let store = InMemoryStore::new();
        store
            .record_transactions(vec![
                transaction("A", 150),
                transaction("B", 5),
                transaction("C", 150),
                transaction("D", 42),
            ])
            .await?;

        let page = store.known_heights(1, 100).await?;
        let heights: Vec<u64> = page.data.iter().map(|h| h.value()).collect();
        assert_eq!(heights, vec![5, 42, 150]);
        assert!(page.is_last_page());
        Ok(())
    }

    #[tokio::test]
    async fn block_upsert_is_idempotent() -> Result<()> {
        let store = InMemoryStore::new();
        store.upsert_blocks(vec![block(5), block(42)]).await?;
        store.upsert_blocks(vec![block(5)]).await?;

        assert_eq!(store.block_count()?, 2);
        assert!(store.block_exists(BlockHeight::new(5)).await?);
        assert!(!store.block_exists(BlockHeight::new(100)).await?);
        Ok(())
    }

    #[tokio::test]
    async fn conditional_payout_insert_gates_attribution() -> Result<()> {
        let store = InMemoryStore::new();

        let first = store.insert_prepared(prepared("TADDR", "boost.5")).await?;
        assert_eq!(first, InsertOutcome::Inserted);

        let second = store.insert_prepared(prepared("TADDR", "boost.5")).await?;
        assert_eq!(second, InsertOutcome::AlreadyAttributed);
        assert_eq!(store.payout_count()?, 1);

        // Different mosaic for the same address is allowed.
        let other = store.insert_prepared(prepared("TADDR", "boost.10")).await?;
        assert_eq!(other, InsertOutcome::Inserted);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_payout_inserts_only_one_wins() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.insert_prepared(prepared("TADDR", "boost.50")).await
            }));
        }

        let mut inserted = 0;
        for handle in handles {
            let outcome = handle.await.map_err(|e| Error::storage(e.to_string()))??;
            if outcome.is_inserted() {
                inserted += 1;
            }
        }

        assert_eq!(inserted, 1);
        assert_eq!(store.payout_count()?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn daily_index_allocation_is_sequential() -> Result<()> {
        let store = InMemoryStore::new();
        let address = Address::new("TADDR");
        let date = DateSlug::from_unix_seconds(1_736_900_000)?;

        assert_eq!(store.allocate_daily_index(&address, &date).await?, 1);
        assert_eq!(store.allocate_daily_index(&address, &date).await?, 2);

        // Another owner starts its own sequence.
        let other = Address::new("TOTHER");
        assert_eq!(store.allocate_daily_index(&other, &date).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_daily_index_allocation_never_duplicates() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let date = DateSlug::from_unix_seconds(1_736_900_000)?;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let date = date.clone();
            handles.push(tokio::spawn(async move {
                store
                    .allocate_daily_index(&Address::new("TADDR"), &date)
                    .await
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            let index = handle.await.map_err(|e| Error::storage(e.to_string()))??;
            assert!(seen.insert(index), "index {index} allocated twice");
        }
        assert_eq!(seen.len(), 16);
        Ok(())
    }

    #[tokio::test]
    async fn activity_insert_rejects_duplicate_slug() -> Result<()> {
        let store = InMemoryStore::new();
        let record = ActivityRecord::pending(
            Slug::build("20250115", 1, 987, 42),
            Address::new("TADDR"),
            DateSlug::from_unix_seconds(1_736_900_000)?,
            987,
            "strava",
        );

        store.insert_activity(record.clone()).await?;
        let result = store.insert_activity(record).await;
        assert!(matches!(result, Err(Error::Duplicate { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn activity_insert_rejects_duplicate_remote_id() -> Result<()> {
        let store = InMemoryStore::new();
        let date = DateSlug::from_unix_seconds(1_736_900_000)?;
        store
            .insert_activity(ActivityRecord::pending(
                Slug::build("20250115", 1, 987, 42),
                Address::new("TADDR"),
                date.clone(),
                987,
                "strava",
            ))
            .await?;

        // Same provider event, different slug.
        let replay = ActivityRecord::pending(
            Slug::build("20250115", 2, 987, 42),
            Address::new("TADDR"),
            date,
            987,
            "strava",
        );
        let result = store.insert_activity(replay).await;
        assert!(matches!(result, Err(Error::Duplicate { .. })));
        assert!(store.remote_id_exists("strava", 987).await?);
        Ok(())
    }

    #[tokio::test]
    async fn referral_counts_are_address_ordered() -> Result<()> {
        let store = InMemoryStore::new();
        store
            .add_referral(&Address::new("TBBB"), &Address::new("R1"))
            .await?;
        store
            .add_referral(&Address::new("TAAA"), &Address::new("R2"))
            .await?;
        store
            .add_referral(&Address::new("TAAA"), &Address::new("R3"))
            .await?;
        // Re-adding the same referee does not inflate the count.
        store
            .add_referral(&Address::new("TAAA"), &Address::new("R3"))
            .await?;

        let counts = store.referral_counts().await?;
        assert_eq!(
            counts,
            vec![
                (Address::new("TAAA"), 2),
                (Address::new("TBBB"), 1),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn mosaic_transfer_lookup() -> Result<()> {
        let store = InMemoryStore::new();
        store
            .record_transactions(vec![Transaction {
                hash: TxHash::new("T1"),
                height: BlockHeight::new(10),
                recipient: Address::new("TADDR"),
                mosaic_id: Some(MosaicId::new("boost.5")),
                amount: 1,
            }])
            .await?;

        assert!(
            store
                .mosaic_transfer_exists(&Address::new("TADDR"), &MosaicId::new("boost.5"))
                .await?
        );
        assert!(
            !store
                .mosaic_transfer_exists(&Address::new("TADDR"), &MosaicId::new("boost.10"))
                .await?
        );
        Ok(())
    }
}
