//! Provider webhook ingestion.
//!
//! The HTTP layer acknowledges provider webhooks immediately and hands the
//! payload to [`WebhookIngestor::ingest`], which deduplicates at the
//! provider-event level, creates the `Pending` activity record, and emits an
//! `activity.created` event for asynchronous enrichment. Ingestion is the
//! only component that creates activity records.
//!
//! ## Idempotency
//!
//! - Events that are not activity creations are ignored, not errors
//! - A replayed event for an already-ingested provider activity is an
//!   idempotent no-op; the record insert is conditional on the provider ID,
//!   so concurrent deliveries of one event create at most one record
//! - The daily index comes from an atomic per-`(address, date)` counter, so
//!   concurrent same-day ingests for one owner never collide on a slug

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use stride_core::{Address, Slug};

use crate::activity::{ActivityRecord, DateSlug};
use crate::bus::{ActivityCreated, ActivityEventBus};
use crate::error::{Error, Result};
use crate::metrics::FlowMetrics;
use crate::store::ActivityStore;

/// Inbound webhook event in the provider's wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Kind of object the event concerns (`"activity"`, `"athlete"`, ...).
    pub object_type: String,
    /// Provider-side identifier of the object.
    pub object_id: u64,
    /// Kind of change (`"create"`, `"update"`, `"delete"`).
    pub aspect_type: String,
    /// Provider-side identifier of the owning athlete.
    pub owner_id: u64,
    /// Event timestamp in unix seconds.
    pub event_time: i64,
}

impl WebhookPayload {
    /// Parses and validates a raw webhook body.
    ///
    /// # Errors
    ///
    /// Returns a validation error if required fields are missing or empty.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let payload: Self = serde_json::from_value(value)
            .map_err(|e| Error::validation(format!("malformed webhook payload: {e}")))?;
        payload.validate()?;
        Ok(payload)
    }

    fn validate(&self) -> Result<()> {
        if self.object_type.is_empty() || self.aspect_type.is_empty() {
            return Err(Error::validation(
                "webhook payload missing object_type or aspect_type",
            ));
        }
        if self.object_id == 0 || self.owner_id == 0 {
            return Err(Error::validation(
                "webhook payload missing object_id or owner_id",
            ));
        }
        Ok(())
    }

    fn is_activity_creation(&self) -> bool {
        self.object_type == "activity" && self.aspect_type == "create"
    }
}

/// Why an event produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The event is not an activity creation.
    NotAnActivityCreation,
    /// An activity with this provider-side ID was already ingested.
    DuplicateRemoteId,
}

/// Outcome of one ingestion attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// A `Pending` record was created and the event emitted.
    Created(ActivityRecord),
    /// The event was ignored; nothing was written.
    Ignored(IgnoreReason),
}

/// Ingests provider webhook events into `Pending` activity records.
pub struct WebhookIngestor {
    activities: Arc<dyn ActivityStore>,
    bus: ActivityEventBus,
    metrics: FlowMetrics,
}

impl WebhookIngestor {
    /// Creates an ingestor over an activity store and event bus.
    pub fn new(activities: Arc<dyn ActivityStore>, bus: ActivityEventBus) -> Self {
        Self {
            activities,
            bus,
            metrics: FlowMetrics::new(),
        }
    }

    /// Ingests one provider event.
    ///
    /// Non-creation events and replayed events are ignored without error.
    /// Storage failures while deriving the slug or creating the record are
    /// wrapped with the provider object ID for context; the caller
    /// acknowledges the webhook regardless.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed payloads, or a storage
    /// error if record creation fails.
    #[tracing::instrument(skip(self, payload), fields(provider = %provider, object_id = payload.object_id))]
    pub async fn ingest(
        &self,
        provider: &str,
        address: &Address,
        payload: &WebhookPayload,
    ) -> Result<IngestOutcome> {
        payload.validate()?;

        if !payload.is_activity_creation() {
            tracing::debug!(
                object_type = %payload.object_type,
                aspect_type = %payload.aspect_type,
                "ignoring non-creation event"
            );
            self.metrics.record_webhook(provider, "ignored");
            return Ok(IngestOutcome::Ignored(IgnoreReason::NotAnActivityCreation));
        }

        if self
            .activities
            .remote_id_exists(provider, payload.object_id)
            .await?
        {
            tracing::debug!("ignoring already-ingested event");
            self.metrics.record_webhook(provider, "duplicate");
            return Ok(IngestOutcome::Ignored(IgnoreReason::DuplicateRemoteId));
        }

        let record = match self.create_record(provider, address, payload).await {
            Ok(record) => record,
            // A concurrent delivery of the same event won the conditional
            // insert between our dedupe check and this one.
            Err(err) if err.is_duplicate() => {
                tracing::debug!("ignoring concurrently ingested event");
                self.metrics.record_webhook(provider, "duplicate");
                return Ok(IngestOutcome::Ignored(IgnoreReason::DuplicateRemoteId));
            }
            Err(err) => return Err(wrap_with_object(payload.object_id, err)),
        };

        // Enrichment is asynchronous; a dead consumer must not turn a
        // durably created record into an ingestion failure.
        if let Err(err) = self.bus.emit(ActivityCreated {
            slug: record.slug.clone(),
        }) {
            tracing::warn!(slug = %record.slug, error = %err, "event emission failed");
        }

        self.metrics.record_webhook(provider, "created");
        tracing::info!(slug = %record.slug, "activity ingested");
        Ok(IngestOutcome::Created(record))
    }

    async fn create_record(
        &self,
        provider: &str,
        address: &Address,
        payload: &WebhookPayload,
    ) -> Result<ActivityRecord> {
        let date_slug = DateSlug::from_unix_seconds(payload.event_time)?;
        let daily_index = self
            .activities
            .allocate_daily_index(address, &date_slug)
            .await?;
        let slug = Slug::build(
            date_slug.as_str(),
            daily_index,
            payload.object_id,
            payload.owner_id,
        );

        let record = ActivityRecord::pending(
            slug,
            address.clone(),
            date_slug,
            payload.object_id,
            provider,
        );
        self.activities.insert_activity(record.clone()).await?;
        Ok(record)
    }
}

fn wrap_with_object(object_id: u64, err: Error) -> Error {
    match err {
        Error::Validation { message } => Error::validation(format!("object {object_id}: {message}")),
        other => Error::storage_with_source(format!("failed to ingest object {object_id}"), other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::activity::ProcessingState;
    use crate::store::memory::InMemoryStore;
    use crate::store::ActivityStore as _;

    fn creation_event(object_id: u64, owner_id: u64) -> WebhookPayload {
        WebhookPayload {
            object_type: "activity".into(),
            object_id,
            aspect_type: "create".into(),
            owner_id,
            // 2025-01-15T00:30:00Z
            event_time: 1_736_900_200,
        }
    }

    fn ingestor() -> (WebhookIngestor, Arc<InMemoryStore>, crate::bus::ActivityEvents) {
        let store = Arc::new(InMemoryStore::new());
        let (bus, events) = ActivityEventBus::channel();
        let ingestor = WebhookIngestor::new(Arc::clone(&store) as Arc<dyn ActivityStore>, bus);
        (ingestor, store, events)
    }

    #[tokio::test]
    async fn creation_event_yields_pending_record_and_event() -> Result<()> {
        let (ingestor, store, mut events) = ingestor();
        let address = Address::new("TADDR");

        let outcome = ingestor
            .ingest("strava", &address, &creation_event(987, 42))
            .await?;

        let IngestOutcome::Created(record) = outcome else {
            panic!("expected a created record");
        };
        assert_eq!(record.slug.as_str(), "20250115-1-987-42");
        assert_eq!(record.state, ProcessingState::Pending);

        let event = events.try_recv().expect("event emitted");
        assert_eq!(event.slug, record.slug);

        let stored = store.get_activity(&record.slug).await?.expect("stored");
        assert_eq!(stored.state, ProcessingState::Pending);
        Ok(())
    }

    #[tokio::test]
    async fn same_day_events_get_sequential_indexes() -> Result<()> {
        let (ingestor, _, _events) = ingestor();
        let address = Address::new("TADDR");

        let first = ingestor
            .ingest("strava", &address, &creation_event(100, 42))
            .await?;
        let second = ingestor
            .ingest("strava", &address, &creation_event(200, 42))
            .await?;

        let IngestOutcome::Created(first) = first else {
            panic!("expected first record");
        };
        let IngestOutcome::Created(second) = second else {
            panic!("expected second record");
        };
        assert_eq!(first.slug.as_str(), "20250115-1-100-42");
        assert_eq!(second.slug.as_str(), "20250115-2-200-42");
        Ok(())
    }

    #[tokio::test]
    async fn replayed_event_is_ignored() -> Result<()> {
        let (ingestor, store, _events) = ingestor();
        let address = Address::new("TADDR");
        let event = creation_event(987, 42);

        ingestor.ingest("strava", &address, &event).await?;
        let outcome = ingestor.ingest("strava", &address, &event).await?;

        assert_eq!(
            outcome,
            IngestOutcome::Ignored(IgnoreReason::DuplicateRemoteId)
        );
        assert!(store.remote_id_exists("strava", 987).await?);
        Ok(())
    }

    #[tokio::test]
    async fn non_creation_events_are_ignored() -> Result<()> {
        let (ingestor, _, mut events) = ingestor();
        let address = Address::new("TADDR");

        let mut update = creation_event(987, 42);
        update.aspect_type = "update".into();
        let outcome = ingestor.ingest("strava", &address, &update).await?;
        assert_eq!(
            outcome,
            IngestOutcome::Ignored(IgnoreReason::NotAnActivityCreation)
        );

        let mut athlete = creation_event(988, 42);
        athlete.object_type = "athlete".into();
        let outcome = ingestor.ingest("strava", &address, &athlete).await?;
        assert_eq!(
            outcome,
            IngestOutcome::Ignored(IgnoreReason::NotAnActivityCreation)
        );

        assert!(events.try_recv().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let (ingestor, _, _events) = ingestor();
        let address = Address::new("TADDR");

        let mut bad = creation_event(987, 42);
        bad.object_type = String::new();
        let result = ingestor.ingest("strava", &address, &bad).await;
        assert!(matches!(result, Err(Error::Validation { .. })));
    }

    #[test]
    fn from_value_validates_shape() {
        let value = serde_json::json!({
            "object_type": "activity",
            "object_id": 987,
            "aspect_type": "create",
            "owner_id": 42,
            "event_time": 1_736_900_200,
        });
        assert!(WebhookPayload::from_value(value).is_ok());

        let missing = serde_json::json!({ "object_type": "activity" });
        assert!(WebhookPayload::from_value(missing).is_err());
    }

    #[tokio::test]
    async fn dropped_consumer_does_not_fail_ingestion() -> Result<()> {
        let (ingestor, _, events) = ingestor();
        drop(events);

        let outcome = ingestor
            .ingest("strava", &Address::new("TADDR"), &creation_event(987, 42))
            .await?;
        assert!(matches!(outcome, IngestOutcome::Created(_)));
        Ok(())
    }
}
