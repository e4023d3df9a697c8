//! # Port Check
//!
//! Liveness check for the local services: a TCP connect with a short
//! timeout. Anything but a completed connect counts as "not listening".

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Returns true if something accepts connections on `127.0.0.1:port`.
pub async fn is_port_open(port: u16, connect_timeout: Duration) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));

    match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            debug!(port, error = %e, "Port refused connection");
            false
        }
        Err(_) => {
            debug!(port, ?connect_timeout, "Port connect timed out");
            false
        }
    }
}
