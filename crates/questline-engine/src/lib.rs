//! # questline-engine
//! Recomputation driver for Questline.
//!
//! [`RecomputationDriver`] runs the fetch → classify → merge pipeline for a
//! single user on demand (live mode) or across every member and past month
//! (batch mode). Data source calls are paced by [`pacer::Pacer`] and retried
//! by [`retry::with_retry`]; batch runs report [`report::BatchProgress`]
//! snapshots over a `tokio::sync::watch` channel.

pub mod config;
pub mod driver;
pub mod error;
pub mod pacer;
pub mod report;
pub mod retry;

pub use config::{EngineConfig, RetryPolicy, ShadowPolicy};
pub use driver::{BatchScope, LiveOutcome, RecomputationDriver, TrackResult, UserScope};
pub use error::EngineError;
pub use report::{BatchProgress, BatchSummary};
