//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept)
//!     → admission.rs (connection ceiling, rate limit)
//!     → connection.rs (stream + slot, owned by one session)
//!     → tls.rs (handshake with the loaded credentials)
//!     → Hand off to the echo session
//! ```
//!
//! # Design Decisions
//! - Admission happens before the TLS handshake so refused peers cost nothing
//! - A slot travels with its connection and is released on drop

pub mod admission;
pub mod connection;
pub mod listener;
pub mod tls;

pub use admission::{Admission, AdmissionController, AdmissionSlot, RejectReason};
pub use connection::{Connection, ConnectionId};
pub use listener::{AcceptSource, Listener, ListenerError};
pub use tls::{load_tls_acceptor, TlsError};
