pub mod stream_transport;

use async_trait::async_trait;
#[cfg(test)] use mockall::automock;

/// Byte-oriented, unreliable link to the protocol client (e.g. a serial line). This is the only
///  thing the gateway needs from the physical transport: retries, line settings etc. are the
///  implementation's business.
///
/// All methods take `&self` so a single transport can be shared by the byte-receiver and the
///  packet transmitter running as separate tasks.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SerialTransport: Send + Sync + 'static {
    /// Waits for the next byte. An error means the transport is closed or broken - no more
    ///  bytes will arrive after that.
    async fn receive_byte(&self) -> anyhow::Result<u8>;

    async fn send_byte(&self, byte: u8) -> anyhow::Result<()>;

    /// Releases the transport. Pending and subsequent receive / send calls fail.
    async fn close(&self);
}
