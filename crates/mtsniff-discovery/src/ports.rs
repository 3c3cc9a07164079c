//! TCP connect port checks

use async_trait::async_trait;
use std::net::SocketAddrV4;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

/// Tests whether a TCP port accepts connections
#[async_trait]
pub trait PortScanner: Send + Sync {
    /// Refused, timed out and errored connections all count as closed
    async fn is_open(&self, address: SocketAddrV4, timeout: Duration) -> bool;
}

/// Full TCP handshake, closed again immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnectScanner;

#[async_trait]
impl PortScanner for TcpConnectScanner {
    async fn is_open(&self, address: SocketAddrV4, deadline: Duration) -> bool {
        match timeout(deadline, TcpStream::connect(address)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                trace!(addr = %address, error = %e, "Port closed");
                false
            }
            Err(_) => {
                trace!(addr = %address, "Port connect timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let open = TcpConnectScanner
            .is_open(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port), Duration::from_secs(1))
            .await;
        assert!(open);
    }

    #[tokio::test]
    async fn test_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let open = TcpConnectScanner
            .is_open(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port), Duration::from_secs(1))
            .await;
        assert!(!open);
    }
}
