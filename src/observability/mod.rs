//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! table, registrations, transport produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer, plain or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through the transport span
//! - Metrics are cheap (atomic increments) and recorded without a recorder
//!   installed, so library users pay nothing unless they opt in

pub mod logging;
pub mod metrics;
