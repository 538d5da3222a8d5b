//! Command-line arguments.
//!
//! Every flag is optional so that unset flags fall through to the TOML file
//! and then to the built-in defaults.

use std::path::PathBuf;

use clap::Parser;

use crate::config::schema::EchoConfig;

/// Command-line arguments for the echo server.
#[derive(Parser, Debug, Default, Clone)]
#[command(name = "tls-echo-server")]
#[command(version)]
#[command(about = "TLS-terminated TCP echo server with connection limits", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Size of the read buffer in bytes
    #[arg(long, alias = "bufferSize")]
    pub buffer_size: Option<usize>,

    /// TLS certificate file (PEM)
    #[arg(long, alias = "certFile")]
    pub cert_file: Option<String>,

    /// TLS key file (PEM)
    #[arg(long, alias = "keyFile")]
    pub key_file: Option<String>,

    /// Maximum number of concurrent connections
    #[arg(long, alias = "maxConn")]
    pub max_conn: Option<usize>,

    /// Admission rate limit in new connections per second (enables limiting)
    #[arg(long, alias = "rateLimit")]
    pub rate_limit: Option<u32>,

    /// Username for basic authentication (reserved)
    #[arg(long)]
    pub username: Option<String>,

    /// Password for basic authentication (reserved)
    #[arg(long)]
    pub password: Option<String>,

    /// Address for the metrics endpoint (e.g. ":9090")
    #[arg(long, alias = "metricsAddr")]
    pub metrics_addr: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut EchoConfig) {
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(size) = self.buffer_size {
            config.listener.buffer_size = size;
        }
        if let Some(path) = &self.cert_file {
            config.tls.cert_path = path.clone();
        }
        if let Some(path) = &self.key_file {
            config.tls.key_path = path.clone();
        }
        if let Some(max) = self.max_conn {
            config.listener.max_connections = max;
        }
        if let Some(rate) = self.rate_limit {
            config.rate_limit.enabled = true;
            config.rate_limit.requests_per_second = rate;
            config.rate_limit.burst_size = rate;
        }
        if let Some(username) = &self.username {
            config.auth.username = username.clone();
        }
        if let Some(password) = &self.password {
            config.auth.password = password.clone();
        }
        if let Some(addr) = &self.metrics_addr {
            config.observability.metrics_address = addr.clone();
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}
