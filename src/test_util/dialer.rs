use std::net::SocketAddrV4;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::io::{duplex, DuplexStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::gateway::upstream::{Dialer, UpstreamReader, UpstreamWriter};

/// A [Dialer] that connects every session to an in-memory stream. The test picks up the
///  server end of each connection with [DuplexDialer::accept], in dialing order.
pub struct DuplexDialer {
    dialed: Mutex<Vec<SocketAddrV4>>,
    servers_tx: mpsc::UnboundedSender<DuplexStream>,
    servers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<DuplexStream>>,
}

impl DuplexDialer {
    pub fn new() -> DuplexDialer {
        let (servers_tx, servers_rx) = mpsc::unbounded_channel();
        DuplexDialer {
            dialed: Default::default(),
            servers_tx,
            servers_rx: tokio::sync::Mutex::new(servers_rx),
        }
    }

    pub fn dialed_addrs(&self) -> Vec<SocketAddrV4> {
        self.dialed.lock().unwrap().clone()
    }

    /// the server end of the next connection that was dialed
    pub async fn accept(&self) -> DuplexStream {
        let mut servers = self.servers_rx.lock().await;
        timeout(Duration::from_secs(5), servers.recv()).await
            .expect("no upstream connection was dialed")
            .expect("dialer is gone")
    }
}

#[async_trait]
impl Dialer for DuplexDialer {
    async fn dial(&self, addr: SocketAddrV4) -> anyhow::Result<(UpstreamReader, UpstreamWriter)> {
        self.dialed.lock().unwrap().push(addr);

        let (server, gateway_side) = duplex(4096);
        self.servers_tx.send(server)
            .map_err(|_| anyhow!("test dialer was dropped"))?;

        let (reader, writer) = tokio::io::split(gateway_side);
        Ok((Box::new(reader), Box::new(writer)))
    }
}
