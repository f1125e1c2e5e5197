//! Web integration — wires the experiment engine to page navigation.
//!
//! # Modules
//!
//! - [`navigation`] — Router, navigation events and the observer trait
//! - [`session`] — Engine-backed observer with per-session counters

pub mod navigation;
pub mod session;

pub use navigation::{NavigationEvent, NavigationKind, NavigationObserver, Router};
pub use session::{ExperimentSession, SessionMetrics};
