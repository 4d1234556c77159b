//! # questline-store: RocksDB persistence for Questline.
//!
//! [`RocksStore`] implements the three storage-facing contracts of
//! questline-core in one database:
//! - [`ProgressStore`](questline_core::traits::ProgressStore): upgrade-only progress records and processed marks
//! - [`ChallengeCatalog`](questline_core::traits::ChallengeCatalog): write-once challenge definitions
//! - [`MemberRoster`](questline_core::traits::MemberRoster): registered members

pub mod keys;
pub mod storage;

pub use storage::RocksStore;
