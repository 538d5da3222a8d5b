//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Accept failure:
//!     → backoff.rs (pause with capped exponential delay + jitter)
//!     → acceptor loop continues
//! ```
//!
//! # Design Decisions
//! - Accept errors never stop the listener
//! - Jittered backoff avoids a hot loop on persistent errors

pub mod backoff;
