//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind echo listener → Bind metrics → Install signals → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Close listener → (optional drain) → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//!     Second SIGTERM/SIGINT → Immediate exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Sessions are not cancelled; the process exit ends them

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, StartupError};
