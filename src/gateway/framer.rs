use std::sync::Arc;

use bytes::BytesMut;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::gateway::gateway_config::GatewayConfig;
use crate::gateway::{ConnectionState, GatewayEvent};
use crate::packet::{Checksum, FrameError, Packet};

/// Reassembles packets from the inbound byte stream and hands validated packets to the
///  dispatcher.
///
/// The framer does no re-synchronization: a frame is abandoned on a timeout or a checksum
///  failure, and the next byte is taken to be a length byte.
pub(crate) struct PacketFramer {
    config: Arc<GatewayConfig>,
    inbound: mpsc::Receiver<u8>,
    events: mpsc::Sender<GatewayEvent>,
    connection_state: watch::Receiver<ConnectionState>,
}

impl PacketFramer {
    pub fn new(
        config: Arc<GatewayConfig>,
        inbound: mpsc::Receiver<u8>,
        events: mpsc::Sender<GatewayEvent>,
        connection_state: watch::Receiver<ConnectionState>,
    ) -> PacketFramer {
        PacketFramer {
            config,
            inbound,
            events,
            connection_state,
        }
    }

    pub async fn run(mut self) {
        debug!("starting packet framer");

        let mut consecutive_failures: u32 = 0;
        loop {
            if consecutive_failures >= self.config.max_consecutive_framing_failures {
                let connection_state = *self.connection_state.borrow();
                if connection_state == ConnectionState::Connected {
                    warn!("{} consecutive framing failures - disconnecting client", consecutive_failures);
                    let _ = self.events.send(GatewayEvent::FramingFailed).await;
                    return;
                }
                // line noise without a session is tolerated
                consecutive_failures = 0;
            }

            match self.read_frame().await {
                Ok(packet) => {
                    consecutive_failures = 0;
                    trace!("received {:?}", packet);
                    if self.events.send(GatewayEvent::Packet(packet)).await.is_err() {
                        debug!("dispatcher is gone - stopping packet framer");
                        return;
                    }
                }
                Err(FrameError::StreamClosed) => {
                    debug!("inbound byte stream closed - stopping packet framer");
                    return;
                }
                Err(FrameError::Timeout) => {
                    debug!("timeout in partially received frame - discarding");
                    consecutive_failures += 1;
                }
                Err(e) => {
                    warn!("discarding received frame: {}", e);
                    consecutive_failures += 1;
                }
            }
        }
    }

    async fn read_frame(&mut self) -> Result<Packet, FrameError> {
        let length = self.inbound.recv().await
            .ok_or(FrameError::StreamClosed)?;

        // the command byte, the payload and the checksum
        let remaining = (length as usize).saturating_sub(Packet::MIN_LEN) + 1 + Checksum::SERIALIZED_LEN;

        let mut frame = BytesMut::with_capacity(1 + remaining);
        frame.extend_from_slice(&[length]);
        for _ in 0..remaining {
            let byte = self.read_field_byte().await?;
            frame.extend_from_slice(&[byte]);
        }

        Packet::try_deser(&mut frame)
    }

    async fn read_field_byte(&mut self) -> Result<u8, FrameError> {
        match timeout(self.config.field_timeout, self.inbound.recv()).await {
            Ok(Some(byte)) => Ok(byte),
            Ok(None) => Err(FrameError::StreamClosed),
            Err(_) => Err(FrameError::Timeout),
        }
    }
}
