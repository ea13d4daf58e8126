use std::time::Duration;
use anyhow::bail;

use crate::packet::Packet;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// bytes received from the transport that are buffered until the framer consumes them
    pub inbound_queue_capacity: usize,
    /// packets per session waiting to be written to the transport
    pub outbound_queue_capacity: usize,

    /// Every field of a frame after the length byte must arrive within this timeout, otherwise
    ///  the partial frame is discarded
    pub field_timeout: Duration,
    /// Number of consecutive discarded frames (timeouts or checksum failures) after which a
    ///  connected session is considered broken
    pub max_consecutive_framing_failures: u32,

    /// time to wait for the client's acknowledgement of a data packet before resending it
    pub ack_timeout: Duration,
    /// number of unacknowledged transmissions of a data packet before giving up on the session
    pub max_send_retries: u32,
    /// Maximum number of bytes read from the upstream connection per data packet. This is
    ///  bounded by the maximum payload that fits the one-byte length field.
    pub upstream_read_size: usize,

    pub dial_timeout: Duration,

    /// How long the packet transmitter of a session that was torn down may keep writing its
    ///  remaining queued packets (typically a final DISCONNECT) before the transport is handed
    ///  to the next session or closed
    pub writer_drain_timeout: Duration,
}

impl GatewayConfig {
    pub fn new() -> GatewayConfig {
        GatewayConfig {
            inbound_queue_capacity: 512,
            outbound_queue_capacity: 2,
            field_timeout: Duration::from_millis(100),
            max_consecutive_framing_failures: 5,
            ack_timeout: Duration::from_millis(500),
            max_send_retries: 5,
            upstream_read_size: Packet::MAX_PAYLOAD_LEN,
            dial_timeout: Duration::from_secs(10),
            writer_drain_timeout: Duration::from_secs(1),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.inbound_queue_capacity == 0 {
            bail!("inbound queue capacity must be positive");
        }
        if self.outbound_queue_capacity == 0 {
            bail!("outbound queue capacity must be positive");
        }
        if self.field_timeout.is_zero() {
            bail!("field timeout must be positive");
        }
        if self.ack_timeout.is_zero() {
            bail!("ack timeout must be positive");
        }
        if self.dial_timeout.is_zero() {
            bail!("dial timeout must be positive");
        }
        if self.max_consecutive_framing_failures == 0 {
            bail!("framing failure threshold must be positive");
        }
        if self.max_send_retries == 0 {
            bail!("send retry budget must be positive");
        }
        if self.upstream_read_size == 0 || self.upstream_read_size > Packet::MAX_PAYLOAD_LEN {
            bail!("upstream read size must be between 1 and {}, was {}", Packet::MAX_PAYLOAD_LEN, self.upstream_read_size);
        }
        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig::new()
    }
}
