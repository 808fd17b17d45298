//! # stride-core
//!
//! Shared foundations for the stride payout backend.
//!
//! This crate is the leaf dependency of the workspace, providing:
//!
//! - **Typed identifiers**: Newtypes for addresses, mosaics, transaction
//!   hashes, block heights and activity slugs
//! - **Error taxonomy**: The base error type shared by domain crates
//! - **Observability**: Logging initialization helpers
//! - **Reward math**: Skew-normal amount randomization with a pluggable
//!   variate source for deterministic tests

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod math;
pub mod observability;

pub use error::{Error, Result};
pub use id::{Address, BlockHeight, MosaicId, PayoutId, Slug, TxHash};
