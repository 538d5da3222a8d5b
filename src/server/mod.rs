//! Echo server subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → acceptor.rs (accept loop, admission, dispatch)
//!     → session.rs (TLS handshake, echo loop)
//!     → Send the same bytes back
//! ```

pub mod acceptor;
pub mod session;

pub use acceptor::{AcceptorSummary, EchoServer, ServerError};
pub use session::{echo, EchoSummary, SessionError, SessionSettings};
