use std::sync::Arc;

use anyhow::{anyhow, bail};
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::gateway::ack_signal::AckReceiver;
use crate::gateway::gateway_config::GatewayConfig;
use crate::gateway::upstream::UpstreamReader;
use crate::gateway::GatewayEvent;
use crate::packet::{Command, Packet};

/// Relays bytes from the upstream connection to the client with stop-and-wait ARQ: there is
///  at most one unacknowledged PUBLISH in flight, and it is resent unchanged until the client
///  acknowledges it with a matching sequence flag or the retry budget is used up.
///
/// The publisher runs until the link breaks, reporting the reason to the dispatcher. The
///  dispatcher aborts it when it tears down the session for other reasons.
pub(crate) struct DownstreamPublisher {
    config: Arc<GatewayConfig>,
    session_id: u64,
    upstream: UpstreamReader,
    outbound: mpsc::Sender<Packet>,
    acks: AckReceiver,
    events: mpsc::Sender<GatewayEvent>,
}

impl DownstreamPublisher {
    pub fn new(
        config: Arc<GatewayConfig>,
        session_id: u64,
        upstream: UpstreamReader,
        outbound: mpsc::Sender<Packet>,
        acks: AckReceiver,
        events: mpsc::Sender<GatewayEvent>,
    ) -> DownstreamPublisher {
        DownstreamPublisher {
            config,
            session_id,
            upstream,
            outbound,
            acks,
            events,
        }
    }

    pub async fn run(mut self) {
        debug!("starting downstream publisher");

        if let Err(reason) = self.relay_upstream().await {
            // stop producing before reporting so the dispatcher is never blocked on our behalf
            let DownstreamPublisher { session_id, events, outbound, .. } = self;
            drop(outbound);
            let _ = events.send(GatewayEvent::LinkFailed { session_id, reason }).await;
        }
    }

    /// returns only when the link is broken
    async fn relay_upstream(&mut self) -> anyhow::Result<()> {
        let mut buf = vec![0u8; self.config.upstream_read_size];
        let mut sequence_flag = false;

        loop {
            let num_read = match self.upstream.read(&mut buf).await {
                Ok(0) => bail!("upstream connection closed"),
                Ok(n) => n,
                Err(e) => bail!("error receiving from upstream: {}", e),
            };
            trace!("read {} bytes from upstream", num_read);

            let packet = Packet::try_new(Command::Publish, sequence_flag, Bytes::copy_from_slice(&buf[..num_read]))?;
            self.send_until_acknowledged(packet).await?;
            sequence_flag = !sequence_flag;
        }
    }

    async fn send_until_acknowledged(&mut self, packet: Packet) -> anyhow::Result<()> {
        let sequence_flag = packet.sequence_flag();
        self.acks.clear();

        let mut retries = 0;
        loop {
            trace!("sending {:?}", packet);
            self.outbound.send(packet.clone()).await
                .map_err(|_| anyhow!("outbound queue closed"))?;

            match timeout(self.config.ack_timeout, self.acks.recv()).await {
                Ok(Some(ack)) if ack == sequence_flag => {
                    trace!("packet acknowledged");
                    return Ok(());
                }
                Ok(Some(_)) => debug!("received ack with sequence flag {} - resending", !sequence_flag as u8),
                Ok(None) => bail!("ack signal closed"),
                Err(_) => debug!("no ack within {:?} - resending", self.config.ack_timeout),
            }

            retries += 1;
            if retries >= self.config.max_send_retries {
                bail!("too many downstream send retries ({})", retries);
            }
        }
    }
}
