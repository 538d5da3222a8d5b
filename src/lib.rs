//! TLS echo server library.

pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod server;

pub use config::schema::EchoConfig;
pub use lifecycle::Shutdown;
pub use net::AdmissionController;
pub use server::EchoServer;
