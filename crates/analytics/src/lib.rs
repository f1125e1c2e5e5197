#![warn(clippy::unwrap_used)]

pub mod logger;
pub mod tracing_sink;

pub use logger::AnalyticsLogger;
pub use tracing_sink::{FanoutSink, TracingSink};
