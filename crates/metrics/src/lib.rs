//! Metrics for tgdc.
//!
//! Metric names live in [`definitions`] so every crate records under the
//! same names. Recording goes through the `metrics` facade and is a no-op
//! until a recorder is installed with [`init_metrics`]; with the
//! `prometheus` feature that recorder is a Prometheus exporter.
//!
//! ```rust,ignore
//! use tgdc_metrics::{counter, relay};
//!
//! counter!(relay::EVENTS_TOTAL, "outcome" => "forwarded").increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
