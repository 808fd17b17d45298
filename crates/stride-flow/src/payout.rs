//! Payout records and their state machine.
//!
//! A [`PayoutRecord`] is created in `Prepared` state by the payout pipeline,
//! moved to `Broadcast` when announced to the ledger, and reaches a terminal
//! `Confirmed` or `Failed` state. No transition skips `Prepared`.
//!
//! ## State Machine
//!
//! ```text
//! PREPARED ──▶ BROADCAST ──▶ CONFIRMED
//!     │             │
//!     └─────────────┴──────▶ FAILED
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stride_core::{Address, MosaicId, PayoutId};

use crate::error::{Error, Result};
use crate::signer::SignedPayload;

/// Lifecycle state of a payout record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutState {
    /// Signed and persisted, awaiting broadcast.
    Prepared,
    /// Announced to the ledger, awaiting confirmation.
    Broadcast,
    /// Observed on the ledger. Terminal.
    Confirmed,
    /// Broadcast or confirmation failed. Terminal.
    Failed,
}

impl PayoutState {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }

    /// Returns true if the transition from self to target is valid.
    #[must_use]
    pub const fn can_transition_to(&self, target: Self) -> bool {
        match self {
            Self::Prepared => matches!(target, Self::Broadcast | Self::Failed),
            Self::Broadcast => matches!(target, Self::Confirmed | Self::Failed),
            Self::Confirmed | Self::Failed => false,
        }
    }

    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Prepared => "prepared",
            Self::Broadcast => "broadcast",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PayoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prepared => write!(f, "PREPARED"),
            Self::Broadcast => write!(f, "BROADCAST"),
            Self::Confirmed => write!(f, "CONFIRMED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// A reward payout to one subject address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRecord {
    /// Unique record identifier.
    pub id: PayoutId,
    /// The subject being rewarded.
    pub address: Address,
    /// The asset being attributed.
    pub mosaic_id: MosaicId,
    /// Reward amount in the mosaic's smallest unit.
    pub amount: u64,
    /// The signed, announce-ready payload.
    pub signed: SignedPayload,
    /// Current lifecycle state.
    pub state: PayoutState,
    /// When the record was prepared.
    pub created_at: DateTime<Utc>,
    /// When the state last changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_at: Option<DateTime<Utc>>,
    /// Number of broadcast attempts so far.
    pub broadcast_attempts: u32,
    /// Failure description for `Failed` records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl PayoutRecord {
    /// Creates a new record in `Prepared` state.
    #[must_use]
    pub fn prepared(
        address: Address,
        mosaic_id: MosaicId,
        amount: u64,
        signed: SignedPayload,
    ) -> Self {
        Self {
            id: PayoutId::generate(),
            address,
            mosaic_id,
            amount,
            signed,
            state: PayoutState::Prepared,
            created_at: Utc::now(),
            last_transition_at: None,
            broadcast_attempts: 0,
            failure: None,
        }
    }

    /// Transitions the record to the target state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStateTransition`] if the transition is not
    /// allowed by the state machine.
    pub fn transition_to(&mut self, target: PayoutState) -> Result<()> {
        if !self.state.can_transition_to(target) {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: target.to_string(),
                reason: "not allowed by payout state machine".into(),
            });
        }
        self.state = target;
        self.last_transition_at = Some(Utc::now());
        Ok(())
    }

    /// Transitions the record to `Failed` with a description.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is already terminal.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition_to(PayoutState::Failed)?;
        self.failure = Some(reason.into());
        Ok(())
    }
}
