//! # stride-flow
//!
//! The scheduled discovery-and-payout pipeline of the stride backend.
//!
//! This crate implements the pipeline domain, providing:
//!
//! - **Discovery**: Cursor-driven, resumable synchronization of blocks and
//!   mosaic transfers from a remote ledger node
//! - **Payouts**: Selection of eligible subjects, single-attribution gating,
//!   signing and broadcast of reward transactions
//! - **Webhook ingestion**: Exactly-once conversion of provider events into
//!   durable activity records
//! - **Enrichment**: Event-driven completion of pending activity records from
//!   the provider API
//!
//! ## Guarantees
//!
//! - **Single attribution**: A booster mosaic reaches a given address at most
//!   once; the gate is a conditional insert at the storage layer
//! - **Monotonic cursors**: A job cursor only advances after the batch it
//!   covers has been durably persisted
//! - **Single flight**: At most one in-flight execution per job name,
//!   enforced by a TTL lease acquired before each tick
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use stride_flow::chain::memory::InMemoryLedgerNode;
//! use stride_flow::discovery::block_range::BlockRangeDiscovery;
//! use stride_flow::error::Result;
//! use stride_flow::store::memory::InMemoryStore;
//!
//! # async fn run() -> Result<()> {
//! let store = Arc::new(InMemoryStore::new());
//! let node = Arc::new(InMemoryLedgerNode::new());
//! let job = BlockRangeDiscovery::new(store, node);
//! let summary = job.tick().await?;
//! println!("discovered {} blocks", summary.processed);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod activity;
pub mod bus;
pub mod chain;
pub mod cursor;
pub mod discovery;
pub mod enrich;
pub mod error;
pub mod lease;
pub mod metrics;
pub mod payout;
pub mod pipeline;
pub mod provider;
pub mod runtime;
pub mod signer;
pub mod store;
pub mod webhook;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::activity::{ActivityRecord, DateSlug, ProcessingState};
    pub use crate::bus::{ActivityCreated, ActivityEventBus};
    pub use crate::chain::{LedgerClient, Page, SortOrder};
    pub use crate::cursor::{CursorState, DiscoveryCursor};
    pub use crate::discovery::block_range::BlockRangeDiscovery;
    pub use crate::discovery::{DiscoveryJob, DiscoverySource, HeightRange};
    pub use crate::enrich::{ActivityEnricher, EnrichOutcome};
    pub use crate::error::{Error, Result};
    pub use crate::lease::{JobLease, LeaseResult, RenewResult};
    pub use crate::payout::{PayoutRecord, PayoutState};
    pub use crate::pipeline::booster::{BoosterSource, BoosterTier};
    pub use crate::pipeline::{PayoutPipeline, PayoutSource};
    pub use crate::runtime::{FlowConfig, Job, JobGraph, JobRunner, TickOutcome, TickSummary};
    pub use crate::signer::Signer;
    pub use crate::store::{ActivityStore, ChainStore, CursorStore, InsertOutcome, PayoutStore};
    pub use crate::webhook::{WebhookIngestor, WebhookPayload};
}
