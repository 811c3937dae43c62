// TCP reachability probe
// reason: tokio TcpStream + timeout, no handshake beyond TCP
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use kcluster_core::domain::HealthEndpoint;
use kcluster_core::port::PortProbe;

/// Probe that attempts a plain TCP connect and closes it immediately
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpPortProbe;

#[async_trait]
impl PortProbe for TcpPortProbe {
    async fn is_open(&self, endpoint: &HealthEndpoint, limit: Duration) -> bool {
        let connect = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
        match timeout(limit, connect).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!(endpoint = %endpoint, error = %e, "Endpoint not reachable");
                false
            }
            Err(_) => {
                debug!(endpoint = %endpoint, timeout_ms = limit.as_millis() as u64, "Probe timed out");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const LIMIT: Duration = Duration::from_millis(500);

    #[tokio::test]
    async fn test_open_then_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let endpoint = HealthEndpoint::new("127.0.0.1", port);

        assert!(TcpPortProbe.is_open(&endpoint, LIMIT).await);

        drop(listener);
        assert!(!TcpPortProbe.is_open(&endpoint, LIMIT).await);
    }

    #[tokio::test]
    async fn test_unresolvable_host() {
        let endpoint = HealthEndpoint::new("kcluster-no-such-host.invalid", 2181);
        assert!(!TcpPortProbe.is_open(&endpoint, LIMIT).await);
    }
}
