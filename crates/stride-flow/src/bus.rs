//! Internal event channel for the webhook → enrichment hop.
//!
//! The ingestor publishes an [`ActivityCreated`] event after it durably
//! persists the pending record; the enricher consumes events in a separate
//! execution context. Delivery is at-least-once: consumers must treat a
//! re-delivered slug for an already-terminal record as a safe no-op, which
//! [`crate::enrich::ActivityEnricher`] does.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use stride_core::Slug;

use crate::error::{Error, Result};

/// Event emitted after an activity record is created.
///
/// Carries only the slug; consumers load the record themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityCreated {
    /// The created record's slug.
    pub slug: Slug,
}

/// Publisher half of the `activity.created` topic.
#[derive(Debug, Clone)]
pub struct ActivityEventBus {
    sender: mpsc::UnboundedSender<ActivityCreated>,
}

/// Consumer half of the `activity.created` topic.
#[derive(Debug)]
pub struct ActivityEvents {
    receiver: mpsc::UnboundedReceiver<ActivityCreated>,
}

impl ActivityEventBus {
    /// Creates a connected publisher/consumer pair.
    #[must_use]
    pub fn channel() -> (Self, ActivityEvents) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, ActivityEvents { receiver })
    }

    /// Publishes an `activity.created` event.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the consumer side has shut down.
    pub fn emit(&self, event: ActivityCreated) -> Result<()> {
        self.sender
            .send(event)
            .map_err(|e| Error::storage(format!("activity event bus closed: {e}")))
    }
}

impl ActivityEvents {
    /// Receives the next event, or `None` when all publishers have dropped.
    pub async fn recv(&mut self) -> Option<ActivityCreated> {
        self.receiver.recv().await
    }

    /// Receives an event without waiting, if one is queued.
    pub fn try_recv(&mut self) -> Option<ActivityCreated> {
        self.receiver.try_recv().ok()
    }
}
