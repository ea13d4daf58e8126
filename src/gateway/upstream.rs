use std::net::SocketAddrV4;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

pub type UpstreamReader = Box<dyn AsyncRead + Send + Unpin>;
pub type UpstreamWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Opens the upstream connection of a session. Dropping both halves closes the connection.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self, addr: SocketAddrV4) -> anyhow::Result<(UpstreamReader, UpstreamWriter)>;
}

pub struct TcpDialer {
    dial_timeout: Duration,
}
impl TcpDialer {
    pub fn new(dial_timeout: Duration) -> TcpDialer {
        TcpDialer { dial_timeout }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, addr: SocketAddrV4) -> anyhow::Result<(UpstreamReader, UpstreamWriter)> {
        let stream = timeout(self.dial_timeout, TcpStream::connect(addr)).await
            .map_err(|_| anyhow!("timeout connecting to {}", addr))??;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY for {}: {}", addr, e);
        }

        let (reader, writer) = stream.into_split();
        Ok((Box::new(reader), Box::new(writer)))
    }
}
