//! Asynchronous activity enrichment.
//!
//! The enricher consumes `activity.created` events, fetches full activity
//! detail from the provider API through the user's OAuth integration, and
//! finalizes the `Pending` record as `Processed` or `Failed`. Delivery is
//! at-least-once, so a redelivered event for an already-terminal record is a
//! safe no-op. No automatic retry is scheduled for failed enrichments.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use stride_core::Slug;

use crate::activity::{ActivityDetail, ActivityRecord};
use crate::bus::ActivityEvents;
use crate::chain::with_timeout;
use crate::error::{Error, Result};
use crate::metrics::FlowMetrics;
use crate::provider::{IntegrationStore, OAuthDriver};
use crate::store::ActivityStore;

/// Default per-call budget for provider API calls.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Activity detail in the provider's wire shape.
#[derive(Debug, Deserialize)]
struct ProviderActivity {
    name: String,
    sport_type: String,
    distance: f64,
    moving_time: u64,
    elapsed_time: u64,
    start_date: DateTime<Utc>,
}

/// Maps the provider's JSON shape into the internal detail shape.
fn map_detail(value: &serde_json::Value) -> Result<ActivityDetail> {
    let wire: ProviderActivity = serde_json::from_value(value.clone())
        .map_err(|e| Error::serialization(format!("unexpected provider activity shape: {e}")))?;
    Ok(ActivityDetail {
        name: wire.name,
        sport_type: wire.sport_type,
        distance_meters: wire.distance,
        moving_time_seconds: wire.moving_time,
        elapsed_time_seconds: wire.elapsed_time,
        started_at: wire.start_date,
    })
}

/// Terminal outcome of one enrichment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichOutcome {
    /// Detail was fetched and the record is `Processed`.
    Processed,
    /// The record is `Failed` with a recorded reason.
    Failed,
    /// The record was already terminal; nothing was changed.
    AlreadyTerminal,
}

/// Event consumer that finalizes pending activity records.
pub struct ActivityEnricher {
    activities: Arc<dyn ActivityStore>,
    integrations: Arc<dyn IntegrationStore>,
    driver: Arc<dyn OAuthDriver>,
    metrics: FlowMetrics,
    call_timeout: Duration,
}

impl ActivityEnricher {
    /// Creates an enricher over an activity store, integration store, and
    /// provider driver.
    pub fn new(
        activities: Arc<dyn ActivityStore>,
        integrations: Arc<dyn IntegrationStore>,
        driver: Arc<dyn OAuthDriver>,
    ) -> Self {
        Self {
            activities,
            integrations,
            driver,
            metrics: FlowMetrics::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Consumes events until the bus closes.
    ///
    /// Per-event failures are logged and do not stop the loop; the webhook
    /// side already acknowledged the provider.
    pub async fn run(&self, mut events: ActivityEvents) {
        while let Some(event) = events.recv().await {
            if let Err(err) = self.on_activity_created(&event.slug).await {
                tracing::error!(slug = %event.slug, error = %err, "enrichment failed");
            }
        }
        tracing::info!("activity event bus closed, enricher stopping");
    }

    /// Handles one `activity.created` event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActivityNotFound`] if no record exists for the slug,
    /// or a storage error if persisting the outcome fails. Provider and
    /// integration failures are recorded on the activity, not returned.
    #[tracing::instrument(skip(self), fields(slug = %slug))]
    pub async fn on_activity_created(&self, slug: &Slug) -> Result<EnrichOutcome> {
        let Some(mut record) = self.activities.get_activity(slug).await? else {
            return Err(Error::ActivityNotFound { slug: slug.clone() });
        };

        // Redelivery of an already-finalized record is a no-op.
        if record.state.is_terminal() {
            tracing::debug!(state = %record.state, "record already terminal");
            return Ok(EnrichOutcome::AlreadyTerminal);
        }

        let integration = self
            .integrations
            .get_integration(&record.provider, &record.address)
            .await?;

        let Some(integration) = integration else {
            // Terminal: the user has to re-link the provider.
            let reason = Error::IntegrationMissing {
                provider: record.provider.clone(),
                address: record.address.clone(),
            }
            .to_string();
            return self.finalize_failed(&mut record, reason).await;
        };

        let fetched = with_timeout(
            "fetch_activity",
            self.call_timeout,
            self.driver.fetch_activity(&integration, record.remote_id),
        )
        .await;

        match fetched.and_then(|value| map_detail(&value)) {
            Ok(detail) => {
                record.mark_processed(detail)?;
                self.activities.update_activity(&record).await?;
                self.metrics.record_enrichment(&record.provider, "processed");
                tracing::info!("activity enriched");
                Ok(EnrichOutcome::Processed)
            }
            Err(err) => {
                tracing::error!(error = ?err, "provider detail fetch failed");
                self.finalize_failed(&mut record, err.to_string()).await
            }
        }
    }

    async fn finalize_failed(
        &self,
        record: &mut ActivityRecord,
        reason: String,
    ) -> Result<EnrichOutcome> {
        record.mark_failed(reason)?;
        self.activities.update_activity(record).await?;
        self.metrics.record_enrichment(&record.provider, "failed");
        Ok(EnrichOutcome::Failed)
    }
}
