//! Referral booster payout source.
//!
//! A booster tier rewards referrers whose referral count lands exactly on a
//! configured threshold. The booster asset is non-transferable and may be
//! attributed to an address at most once, so qualification at count 50 does
//! not re-qualify at 51 and a tier never pays the same address twice.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use stride_core::math::RewardRandomizer;
use stride_core::{Address, MosaicId};

use crate::error::Result;
use crate::pipeline::{PayoutSource, MAX_SUBJECTS_PER_TICK};
use crate::store::{ChainStore, PayoutStore, ReferralStore};

/// One booster tier: the exact referral count it rewards and the asset it
/// attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoosterTier {
    /// Referral count that qualifies, matched exactly.
    pub threshold: u64,
    /// The booster asset this tier attributes.
    pub mosaic_id: MosaicId,
    /// Base reward amount in the asset's smallest unit.
    pub amount: u64,
}

impl BoosterTier {
    /// Creates a tier.
    #[must_use]
    pub fn new(threshold: u64, mosaic_id: MosaicId, amount: u64) -> Self {
        Self {
            threshold,
            mosaic_id,
            amount,
        }
    }

    /// The standard 5 / 10 / 100 referral tiers.
    #[must_use]
    pub fn standard() -> Vec<Self> {
        vec![
            Self::new(5, MosaicId::new("booster.ref5"), 1),
            Self::new(10, MosaicId::new("booster.ref10"), 1),
            Self::new(100, MosaicId::new("booster.ref100"), 1),
        ]
    }
}

/// Optional stochastic variance applied to the base amount.
struct Variance {
    randomizer: Mutex<RewardRandomizer>,
    deviation: f64,
    skewness: f64,
}

/// A qualifying referrer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referrer {
    /// The referrer's reward address.
    pub address: Address,
    /// Referral count at selection time.
    pub referral_count: u64,
}

/// [`PayoutSource`] that selects referrers at an exact referral threshold.
pub struct BoosterSource {
    tier: BoosterTier,
    name: String,
    referrals: Arc<dyn ReferralStore>,
    payouts: Arc<dyn PayoutStore>,
    chain: Arc<dyn ChainStore>,
    variance: Option<Variance>,
}

impl BoosterSource {
    /// Creates a source for one tier.
    pub fn new(
        tier: BoosterTier,
        referrals: Arc<dyn ReferralStore>,
        payouts: Arc<dyn PayoutStore>,
        chain: Arc<dyn ChainStore>,
    ) -> Self {
        let name = format!("boost-{}", tier.threshold);
        Self {
            tier,
            name,
            referrals,
            payouts,
            chain,
            variance: None,
        }
    }

    /// Adds skew-normal variance around the base amount.
    #[must_use]
    pub fn with_variance(mut self, randomizer: RewardRandomizer, deviation: f64, skewness: f64) -> Self {
        self.variance = Some(Variance {
            randomizer: Mutex::new(randomizer),
            deviation,
            skewness,
        });
        self
    }
}

#[async_trait]
impl PayoutSource for BoosterSource {
    type Subject = Referrer;

    fn pipeline_name(&self) -> &str {
        &self.name
    }

    fn asset_id(&self) -> &MosaicId {
        &self.tier.mosaic_id
    }

    fn subject_address(subject: &Referrer) -> &Address {
        &subject.address
    }

    /// Aggregates referral counts, keeps groups whose count equals the tier
    /// threshold exactly, and pre-filters through the allowance check.
    async fn fetch_subjects(&self) -> Result<Vec<Referrer>> {
        let counts = self.referrals.referral_counts().await?;

        let mut subjects = Vec::new();
        for (address, referral_count) in counts {
            if referral_count != self.tier.threshold {
                continue;
            }
            let subject = Referrer {
                address,
                referral_count,
            };
            if self.verify_attribution_allowance(&subject).await? {
                subjects.push(subject);
            }
            if subjects.len() == MAX_SUBJECTS_PER_TICK {
                break;
            }
        }

        Ok(subjects)
    }

    async fn verify_attribution_allowance(&self, subject: &Referrer) -> Result<bool> {
        let attributed = self
            .payouts
            .attribution_exists(&subject.address, &self.tier.mosaic_id)
            .await?
            || self
                .chain
                .mosaic_transfer_exists(&subject.address, &self.tier.mosaic_id)
                .await?;
        Ok(!attributed)
    }

    /// Boosters carry no per-address multiplier.
    async fn multiplier(&self, _address: &Address) -> Result<f64> {
        Ok(1.0)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn asset_amount(&self, _subject: &Referrer, multiplier: f64) -> u64 {
        let base = self.tier.amount as f64 * multiplier;
        let amount = match &self.variance {
            Some(variance) => match variance.randomizer.lock() {
                Ok(mut randomizer) => {
                    randomizer.draw(base, variance.deviation, variance.skewness)
                }
                Err(_) => base,
            },
            None => base,
        };
        amount.round().max(1.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::chain::memory::InMemoryLedgerNode;
    use crate::payout::PayoutState;
    use crate::pipeline::PayoutPipeline;
    use crate::signer::StaticSigner;
    use crate::store::memory::InMemoryStore;
    use crate::store::{PayoutStore as _, ReferralStore as _};

    fn tier_50() -> BoosterTier {
        BoosterTier::new(50, MosaicId::new("booster.ref50"), 1)
    }

    async fn refer(store: &InMemoryStore, referrer: &str, count: u64) -> Result<()> {
        let referrer = Address::new(referrer);
        for i in 0..count {
            store
                .add_referral(&referrer, &Address::new(format!("{referrer}-ref-{i}")))
                .await?;
        }
        Ok(())
    }

    fn source(store: &Arc<InMemoryStore>) -> BoosterSource {
        BoosterSource::new(
            tier_50(),
            Arc::clone(store) as Arc<dyn ReferralStore>,
            Arc::clone(store) as Arc<dyn PayoutStore>,
            Arc::clone(store) as Arc<dyn ChainStore>,
        )
    }

    fn pipeline(store: &Arc<InMemoryStore>) -> PayoutPipeline<BoosterSource> {
        PayoutPipeline::new(
            source(store),
            Arc::clone(store) as Arc<dyn PayoutStore>,
            Arc::new(InMemoryLedgerNode::new()),
            Arc::new(StaticSigner::new()),
        )
    }

    #[tokio::test]
    async fn threshold_is_matched_exactly() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        refer(&store, "ALICE", 49).await?;
        refer(&store, "BOB", 50).await?;
        refer(&store, "CAROL", 51).await?;

        let subjects = source(&store).fetch_subjects().await?;
        let addresses: Vec<&str> = subjects.iter().map(|s| s.address.as_str()).collect();
        assert_eq!(addresses, vec!["BOB"]);
        Ok(())
    }

    #[tokio::test]
    async fn attributed_address_is_filtered_out() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        refer(&store, "BOB", 50).await?;

        let pipeline = pipeline(&store);
        let first = pipeline.prepare().await?;
        assert_eq!(first.processed, 1);

        // Selected again next tick, but the attribution already exists.
        let second = pipeline.prepare().await?;
        assert_eq!(second.processed, 0);
        assert_eq!(store.payout_count()?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn prepared_record_carries_tier_asset() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        refer(&store, "BOB", 50).await?;

        pipeline(&store).prepare().await?;

        let records = store.list_in_state(PayoutState::Prepared, 10).await?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].address, Address::new("BOB"));
        assert_eq!(records[0].mosaic_id, MosaicId::new("booster.ref50"));
        assert_eq!(records[0].amount, 1);
        Ok(())
    }

    #[tokio::test]
    async fn signing_failure_skips_subject_without_aborting() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        refer(&store, "BOB", 50).await?;

        let signer = Arc::new(StaticSigner::new());
        signer.set_failing(true);
        let pipeline = PayoutPipeline::new(
            source(&store),
            Arc::clone(&store) as Arc<dyn PayoutStore>,
            Arc::new(InMemoryLedgerNode::new()),
            Arc::clone(&signer) as Arc<dyn crate::signer::Signer>,
        );

        let summary = pipeline.prepare().await?;
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.failed, 1);
        assert_eq!(store.payout_count()?, 0);

        // The subject is retried once the signer recovers.
        signer.set_failing(false);
        let summary = pipeline.prepare().await?;
        assert_eq!(summary.processed, 1);
        Ok(())
    }

    #[tokio::test]
    async fn broadcast_and_confirm_drive_records_to_terminal_state() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        refer(&store, "BOB", 50).await?;

        let node = Arc::new(InMemoryLedgerNode::new());
        let pipeline = PayoutPipeline::new(
            source(&store),
            Arc::clone(&store) as Arc<dyn PayoutStore>,
            Arc::clone(&node) as Arc<dyn crate::chain::LedgerClient>,
            Arc::new(StaticSigner::new()),
        );

        pipeline.prepare().await?;
        let summary = pipeline.broadcast().await?;
        assert_eq!(summary.processed, 1);
        assert_eq!(node.announced()?.len(), 1);

        // Mirror the announced payload onto the fake ledger so the
        // confirmation pass can find it.
        let announced = node.announced()?;
        node.add_transactions([crate::chain::Transaction {
            hash: announced[0].tx_hash.clone(),
            height: stride_core::BlockHeight::new(1),
            recipient: Address::new("BOB"),
            mosaic_id: Some(MosaicId::new("booster.ref50")),
            amount: 1,
        }])?;

        let summary = pipeline.confirm().await?;
        assert_eq!(summary.processed, 1);

        let confirmed = store.list_in_state(PayoutState::Confirmed, 10).await?;
        assert_eq!(confirmed.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn unconfirmed_record_fails_past_budget() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        refer(&store, "BOB", 50).await?;

        let pipeline = pipeline(&store).with_confirmation_budget(chrono::Duration::zero());
        pipeline.prepare().await?;
        pipeline.broadcast().await?;

        // Nothing on the ledger and a zero budget: the record fails.
        let summary = pipeline.confirm().await?;
        assert_eq!(summary.failed, 1);

        let failed = store.list_in_state(PayoutState::Failed, 10).await?;
        assert_eq!(failed.len(), 1);
        assert!(failed[0].failure.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn failed_announce_leaves_record_prepared_for_retry() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        refer(&store, "BOB", 50).await?;

        let node = Arc::new(InMemoryLedgerNode::new());
        let pipeline = PayoutPipeline::new(
            source(&store),
            Arc::clone(&store) as Arc<dyn PayoutStore>,
            Arc::clone(&node) as Arc<dyn crate::chain::LedgerClient>,
            Arc::new(StaticSigner::new()),
        );

        pipeline.prepare().await?;
        node.set_failing(true);
        let summary = pipeline.broadcast().await?;
        assert_eq!(summary.failed, 1);

        let prepared = store.list_in_state(PayoutState::Prepared, 10).await?;
        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared[0].broadcast_attempts, 1);

        node.set_failing(false);
        let summary = pipeline.broadcast().await?;
        assert_eq!(summary.processed, 1);
        Ok(())
    }

    #[tokio::test]
    async fn variance_perturbs_amount_deterministically() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let source = source(&store).with_variance(RewardRandomizer::seeded(7), 0.0, 0.0);

        let subject = Referrer {
            address: Address::new("BOB"),
            referral_count: 50,
        };
        // Zero deviation collapses the draw onto the base amount.
        assert_eq!(source.asset_amount(&subject, 1.0), 1);
        Ok(())
    }

    #[test]
    fn standard_tiers_cover_expected_thresholds() {
        let thresholds: Vec<u64> = BoosterTier::standard().iter().map(|t| t.threshold).collect();
        assert_eq!(thresholds, vec![5, 10, 100]);
    }
}
