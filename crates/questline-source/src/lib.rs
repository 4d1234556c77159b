//! Achievement data source adapter.
//!
//! [`HttpAchievementProvider`] fetches per-game unlock data over HTTP and
//! [`normalize`] turns the upstream response into the canonical
//! [`AchievementUnlockSet`](questline_core::types::AchievementUnlockSet).
//! Nothing outside this crate sees upstream field names.

pub mod client;
pub mod config;
pub mod normalize;

pub use client::HttpAchievementProvider;
pub use config::{EarnedMode, SourceConfig};
