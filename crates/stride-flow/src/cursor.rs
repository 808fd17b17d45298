//! Persisted job cursors.
//!
//! Every scheduled job owns exactly one [`CursorState`] row keyed by its job
//! name. The row is read at tick start and written only after the batch it
//! covers has been durably persisted, so the cursor always reflects the last
//! fully committed unit of work. Cursors only move forward and are never
//! deleted during normal operation.

use serde::{Deserialize, Serialize};

use stride_core::BlockHeight;

use crate::error::{Error, Result};

/// A named cursor row: one per job, mutated only by its owning job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorState {
    /// The owning job's name.
    pub job_name: String,
    /// Opaque JSON state blob, interpreted only by the owning job.
    pub data: serde_json::Value,
}

impl CursorState {
    /// Creates a cursor row from a serializable state value.
    ///
    /// # Errors
    ///
    /// Returns an error if the state fails to serialize.
    pub fn encode<T: Serialize>(job_name: impl Into<String>, state: &T) -> Result<Self> {
        let data = serde_json::to_value(state).map_err(|e| {
            Error::serialization(format!("failed to encode cursor state: {e}"))
        })?;
        Ok(Self {
            job_name: job_name.into(),
            data,
        })
    }

    /// Decodes the opaque blob into the owning job's typed state.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob does not match the expected shape.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            Error::serialization(format!(
                "failed to decode cursor state for job '{}': {e}",
                self.job_name
            ))
        })
    }
}

/// Typed cursor for discovery jobs.
///
/// Tracks the local source page being scanned, the last fully processed
/// range upper bound, and a running total of discovered records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryCursor {
    /// 1-indexed local source page last scanned.
    pub page: u32,
    /// Upper bound of the last fully processed height range.
    pub last_range: Option<BlockHeight>,
    /// Total records discovered by this job across all ticks.
    pub total_discovered: u64,
}

impl Default for DiscoveryCursor {
    fn default() -> Self {
        Self {
            page: 1,
            last_range: None,
            total_discovered: 0,
        }
    }
}

impl DiscoveryCursor {
    /// Returns the cursor advanced past a processed range.
    #[must_use]
    pub fn advanced(self, range_upper: BlockHeight, discovered: u64) -> Self {
        Self {
            page: self.page,
            // Cursors are monotonic: never step back to a lower range.
            last_range: Some(self.last_range.map_or(range_upper, |r| r.max(range_upper))),
            total_discovered: self.total_discovered + discovered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_roundtrip() -> Result<()> {
        let cursor = DiscoveryCursor {
            page: 3,
            last_range: Some(BlockHeight::new(200)),
            total_discovered: 57,
        };

        let row = CursorState::encode("discover-blocks", &cursor)?;
        assert_eq!(row.job_name, "discover-blocks");

        let decoded: DiscoveryCursor = row.decode()?;
        assert_eq!(decoded, cursor);

        Ok(())
    }

    #[test]
    fn default_cursor_starts_at_page_one() {
        let cursor = DiscoveryCursor::default();
        assert_eq!(cursor.page, 1);
        assert_eq!(cursor.last_range, None);
        assert_eq!(cursor.total_discovered, 0);
    }

    #[test]
    fn advance_is_monotonic() {
        let cursor = DiscoveryCursor::default()
            .advanced(BlockHeight::new(300), 4)
            .advanced(BlockHeight::new(200), 2);

        assert_eq!(cursor.last_range, Some(BlockHeight::new(300)));
        assert_eq!(cursor.total_discovered, 6);
    }

    #[test]
    fn decode_rejects_mismatched_shape() {
        let row = CursorState {
            job_name: "discover-blocks".into(),
            data: serde_json::json!({"page": "not-a-number"}),
        };
        assert!(row.decode::<DiscoveryCursor>().is_err());
    }
}
