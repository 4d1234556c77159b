//! End-to-end and property tests for Questline.
//!
//! The tests under `tests/` run the full fetch → classify → merge pipeline
//! against the RocksDB store with a scripted data source, and check the
//! award invariants with generated unlock histories.

pub mod helpers;
