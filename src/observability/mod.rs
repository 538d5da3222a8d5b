//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Acceptor loop, sessions:
//!     → logging.rs (structured log events)
//! Admission controller:
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;
