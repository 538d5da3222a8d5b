//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection:
//!     → rate_limit.rs (spend an admission token)
//!     → Admission controller (connection ceiling)
//! ```
//!
//! # Design Decisions
//! - Fail closed: a connection without a token is refused, not queued
//! - One bucket for the whole listener, not per peer

pub mod rate_limit;

pub use rate_limit::AdmissionRateLimiter;
