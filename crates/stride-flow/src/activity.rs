//! Activity records ingested from provider webhooks.
//!
//! An [`ActivityRecord`] is created in `Pending` state by the webhook
//! ingestor and mutated exactly once to `Processed` (with detail populated)
//! or `Failed` by the enricher. The slug is immutable and globally unique;
//! it is the idempotency key for the entire activity lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stride_core::{Address, Slug};

use crate::error::{Error, Result};

/// A UTC `YYYYMMDD` date slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DateSlug(String);

impl DateSlug {
    /// Derives the date slug from a unix-seconds event timestamp.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the timestamp is out of range.
    pub fn from_unix_seconds(seconds: i64) -> Result<Self> {
        let ts = DateTime::<Utc>::from_timestamp(seconds, 0).ok_or_else(|| {
            Error::validation(format!("event timestamp out of range: {seconds}"))
        })?;
        Ok(Self(ts.format("%Y%m%d").to_string()))
    }

    /// Returns the slug as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DateSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Processing state of an activity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingState {
    /// Created by ingestion, awaiting enrichment.
    Pending,
    /// Enriched with provider detail. Terminal.
    Processed,
    /// Enrichment failed. Terminal.
    Failed,
}

impl ProcessingState {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Failed)
    }

    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Processed => write!(f, "PROCESSED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Provider activity detail mapped into the internal shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDetail {
    /// Activity title.
    pub name: String,
    /// Sport type reported by the provider.
    pub sport_type: String,
    /// Distance in meters.
    pub distance_meters: f64,
    /// Moving time in seconds.
    pub moving_time_seconds: u64,
    /// Elapsed time in seconds.
    pub elapsed_time_seconds: u64,
    /// When the activity started.
    pub started_at: DateTime<Utc>,
}

/// An ingested provider activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    /// Deterministic unique slug; the lifecycle idempotency key.
    pub slug: Slug,
    /// The owning subject's address.
    pub address: Address,
    /// UTC date slug of the event.
    pub date_slug: DateSlug,
    /// Provider-side activity identifier.
    pub remote_id: u64,
    /// Provider name (e.g. "strava").
    pub provider: String,
    /// Processing state.
    pub state: ProcessingState,
    /// Enriched detail, populated on `Processed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<ActivityDetail>,
    /// Failure description for `Failed` records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// When the record was ingested.
    pub created_at: DateTime<Utc>,
    /// When the record reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ActivityRecord {
    /// Creates a new record in `Pending` state.
    #[must_use]
    pub fn pending(
        slug: Slug,
        address: Address,
        date_slug: DateSlug,
        remote_id: u64,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            slug,
            address,
            date_slug,
            remote_id,
            provider: provider.into(),
            state: ProcessingState::Pending,
            detail: None,
            failure: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Marks the record processed with enriched detail.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStateTransition`] if the record is already
    /// terminal.
    pub fn mark_processed(&mut self, detail: ActivityDetail) -> Result<()> {
        self.ensure_pending(ProcessingState::Processed)?;
        self.state = ProcessingState::Processed;
        self.detail = Some(detail);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Marks the record failed with a description.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStateTransition`] if the record is already
    /// terminal.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<()> {
        self.ensure_pending(ProcessingState::Failed)?;
        self.state = ProcessingState::Failed;
        self.failure = Some(reason.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn ensure_pending(&self, target: ProcessingState) -> Result<()> {
        if self.state.is_terminal() {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: target.to_string(),
                reason: "activity records are mutated exactly once".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail() -> ActivityDetail {
        ActivityDetail {
            name: "Morning Run".into(),
            sport_type: "Run".into(),
            distance_meters: 5012.3,
            moving_time_seconds: 1620,
            elapsed_time_seconds: 1700,
            started_at: Utc::now(),
        }
    }

    fn pending_record() -> ActivityRecord {
        ActivityRecord::pending(
            Slug::build("20250115", 1, 987, 42),
            Address::new("TADDR"),
            DateSlug::from_unix_seconds(1_736_900_000).unwrap(),
            987,
            "strava",
        )
    }

    #[test]
    fn date_slug_is_utc_yyyymmdd() -> Result<()> {
        // 2025-01-15T00:30:00Z
        let slug = DateSlug::from_unix_seconds(1_736_900_200)?;
        assert_eq!(slug.as_str(), "20250115");
        Ok(())
    }

    #[test]
    fn date_slug_rejects_out_of_range() {
        assert!(DateSlug::from_unix_seconds(i64::MAX).is_err());
    }

    #[test]
    fn processed_transition_populates_detail() -> Result<()> {
        let mut rec = pending_record();
        rec.mark_processed(detail())?;

        assert_eq!(rec.state, ProcessingState::Processed);
        assert!(rec.detail.is_some());
        assert!(rec.finished_at.is_some());
        Ok(())
    }

    #[test]
    fn failed_transition_has_no_detail() -> Result<()> {
        let mut rec = pending_record();
        rec.mark_failed("provider 500")?;

        assert_eq!(rec.state, ProcessingState::Failed);
        assert!(rec.detail.is_none());
        assert_eq!(rec.failure.as_deref(), Some("provider 500"));
        Ok(())
    }

    #[test]
    fn terminal_records_reject_further_mutation() -> Result<()> {
        let mut rec = pending_record();
        rec.mark_processed(detail())?;

        assert!(rec.mark_failed("late failure").is_err());
        assert!(rec.mark_processed(detail()).is_err());
        assert_eq!(rec.state, ProcessingState::Processed);
        Ok(())
    }
}
