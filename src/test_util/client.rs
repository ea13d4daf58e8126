use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::timeout;

use crate::packet::Packet;
use crate::transport::stream_transport::StreamTransport;
use crate::transport::SerialTransport;

/// creates an in-memory serial line, returning the client end and the gateway's transport
pub fn client_transport() -> (TestClient, Arc<dyn SerialTransport>) {
    let (client_side, gateway_side) = duplex(4096);
    let transport = StreamTransport::from_stream(gateway_side);
    (TestClient::new(client_side), Arc::new(transport))
}

/// The client end of a serial line, speaking the wire format
pub struct TestClient {
    stream: DuplexStream,
    buf: BytesMut,
}

impl TestClient {
    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(stream: DuplexStream) -> TestClient {
        TestClient {
            stream,
            buf: BytesMut::new(),
        }
    }

    pub async fn send_packet(&mut self, packet: &Packet) {
        let mut buf = BytesMut::new();
        packet.ser(&mut buf);
        self.send_raw(&buf).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await
            .expect("gateway side of the serial line should be open");
    }

    /// Waits for the next complete frame. Panics on timeout or on a frame that does not parse.
    pub async fn recv_packet(&mut self) -> Packet {
        self.try_recv_packet(Self::RECV_TIMEOUT).await
            .expect("no packet received from gateway")
    }

    /// `None` if no complete frame arrives within the timeout or the line is closed
    pub async fn try_recv_packet(&mut self, within: Duration) -> Option<Packet> {
        timeout(within, self.read_frame()).await.ok()?
    }

    pub async fn assert_silent(&mut self, within: Duration) {
        if let Some(packet) = self.try_recv_packet(within).await {
            panic!("expected no packet, received {:?}", packet);
        }
    }

    /// asserts that the gateway closes the line without sending anything else
    pub async fn assert_closed(&mut self) {
        let mut rest = Vec::new();
        timeout(Self::RECV_TIMEOUT, self.stream.read_to_end(&mut rest)).await
            .expect("gateway did not close the serial line")
            .expect("error reading from serial line");
        assert!(self.buf.is_empty() && rest.is_empty(), "unexpected bytes before close: {:?} {:?}", self.buf, rest);
    }

    async fn read_frame(&mut self) -> Option<Packet> {
        loop {
            if let Some(&length) = self.buf.first() {
                // the length field does not count itself
                let frame_len = (length as usize).max(Packet::MIN_LEN) + 1;
                if self.buf.len() >= frame_len {
                    let mut frame = self.buf.split_to(frame_len);
                    let packet = Packet::try_deser(&mut frame)
                        .expect("gateway sent an invalid frame");
                    assert!(!frame.has_remaining());
                    return Some(packet);
                }
            }

            let mut chunk = [0u8; 256];
            match self.stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return None,
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
            }
        }
    }
}
