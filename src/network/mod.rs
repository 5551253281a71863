//! Network module - Handles TCP communication with players
//!
//! Provides:
//! - Server accepting game connections (TCP, plus a Unix socket on Unix)
//! - Per-connection reader/writer tasks feeding the engine task
//! - Hostname resolution for the client side

mod server;
mod connection;

pub use server::*;
pub use connection::*;

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::protocol::DEFAULT_PORT;

/// Configuration for network operations
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Port to listen on or connect to
    pub port: u16,
    /// Interface to bind to (default: all)
    pub bind_address: Option<String>,
    /// Optional Unix socket path for a second listener
    pub socket_path: Option<PathBuf>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: None,
            socket_path: None,
        }
    }
}

/// Resolve a hostname to a socket address
pub async fn resolve_host(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    use tokio::net::lookup_host;

    let addr_string = format!("{}:{}", host, port);
    let mut addrs = lookup_host(&addr_string).await?;

    addrs.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Could not resolve host: {}", host),
        )
    })
}
