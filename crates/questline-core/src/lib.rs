//! # questline-core
//! Foundation types, traits and the pure award pipeline for Questline.
//!
//! The pipeline runs in three pure steps:
//! - [`window::EligibleWindow`] resolves the earn window of a challenge month
//! - [`classify::classify`] maps unlock data to a [`types::Tier`]
//! - [`points::points_for`] converts a tier into points
//!
//! Durable state goes through the [`traits::ProgressStore`] contract, whose
//! merge is upgrade-only.

pub mod catalog;
pub mod classify;
pub mod constants;
pub mod error;
pub mod points;
pub mod progress;
pub mod traits;
pub mod types;
pub mod window;

pub use classify::classify;
pub use points::points_for;
pub use window::EligibleWindow;
