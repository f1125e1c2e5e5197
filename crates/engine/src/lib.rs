//! Experiment engine — A/B/n assignment and goal attribution for
//! marketing-site templates.
//!
//! # Modules
//!
//! - [`engine`] — the [`ExperimentEngine`] registry and its operations
//! - [`bucketing`] — deterministic traffic and variant bucketing
//! - [`targeting`] — page pattern matching
//! - [`results`] — per-variant aggregation
//! - [`samples`] — sample-data bootstrap definitions

#![warn(clippy::unwrap_used)]

pub mod bucketing;
pub mod engine;
pub mod keys;
pub mod results;
pub mod samples;
pub mod targeting;
pub mod visitor;

pub use engine::{ExperimentEngine, EXPORT_SCHEMA_VERSION};
pub use keys::StoreKeys;
