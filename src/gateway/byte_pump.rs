use std::sync::Arc;

use bytes::BytesMut;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

use crate::gateway::GatewayEvent;
use crate::packet::Packet;
use crate::transport::SerialTransport;

/// Moves bytes from the transport into the inbound queue until the transport fails or closes.
///  The inbound queue is closed when this returns.
pub(crate) async fn run_byte_receiver(
    transport: Arc<dyn SerialTransport>,
    inbound: mpsc::Sender<u8>,
    events: mpsc::Sender<GatewayEvent>,
) {
    debug!("starting byte receiver");
    loop {
        match transport.receive_byte().await {
            Ok(byte) => {
                if inbound.send(byte).await.is_err() {
                    debug!("inbound queue closed - stopping byte receiver");
                    return;
                }
            }
            Err(e) => {
                info!("transport stopped delivering bytes: {}", e);
                drop(inbound);
                let _ = events.send(GatewayEvent::TransportFailed).await;
                return;
            }
        }
    }
}

/// Writes the packets of a session's outbound queue to the transport until the queue is closed
///  and drained.
pub(crate) async fn run_packet_transmitter(
    transport: Arc<dyn SerialTransport>,
    mut outbound: mpsc::Receiver<Packet>,
    events: mpsc::Sender<GatewayEvent>,
) {
    debug!("starting packet transmitter");

    let mut buf = BytesMut::with_capacity(u8::MAX as usize);
    while let Some(packet) = outbound.recv().await {
        trace!("sending {:?}", packet);

        buf.clear();
        packet.ser(&mut buf);
        for &byte in buf.iter() {
            if let Err(e) = transport.send_byte(byte).await {
                error!("error writing to transport: {}", e);
                // release the queue's producers before reporting
                drop(outbound);
                let _ = events.send(GatewayEvent::TransportFailed).await;
                return;
            }
        }
    }

    debug!("outbound queue closed - stopping packet transmitter");
}
