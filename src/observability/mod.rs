//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape via /metrics)
//! ```
//!
//! # Design Decisions
//! - Structured logging via tracing; level set from config or RUST_LOG
//! - Metric updates are cheap (atomic increments behind the recorder)
//! - Helper functions keep call sites to one line

pub mod logging;
pub mod metrics;
