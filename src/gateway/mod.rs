//! The gateway terminates the packet protocol spoken on a [crate::transport::SerialTransport]
//!  and relays application payload to and from a TCP server designated by the client.
//!
//! Each gateway instance runs these tasks:
//! * the byte receiver, pushing bytes from the transport into the inbound queue
//! * the `framer`, turning inbound bytes into validated packets
//! * the `dispatcher`, an actor that owns all session state and acts on packets and on failure
//!    reports from the other tasks
//! * per session, a packet transmitter writing the session's outbound queue to the transport
//! * per session, the downstream `publisher`, relaying upstream bytes to the client with
//!    stop-and-wait retransmission
//!
//! All tasks except the dispatcher communicate with it through `GatewayEvent`s only.

pub mod gateway;
pub mod gateway_config;
pub mod upstream;
mod ack_signal;
mod byte_pump;
mod dispatcher;
mod framer;
mod publisher;

use crate::packet::Packet;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConnectionState {
    /// no session - a CONNECT is accepted
    Disconnected,
    /// a session with an open upstream connection is active
    Connected,
    /// the gateway was shut down, terminal state
    TransportNotReady,
}

/// Messages to the dispatcher
#[derive(Debug)]
pub(crate) enum GatewayEvent {
    /// a validated packet from the framer
    Packet(Packet),
    /// The framer hit the threshold of consecutive framing failures while connected, and
    ///  terminated. The dispatcher sends DISCONNECT and tears down the session, and then tears
    ///  down the whole gateway (ending in [ConnectionState::TransportNotReady] rather than
    ///  `Disconnected`): without a framer no further packet can be received, so `listen()`
    ///  returns instead of idling.
    FramingFailed,
    /// The downstream publisher of a session gave up. The session id allows the dispatcher
    ///  to ignore reports from sessions that were already torn down.
    LinkFailed {
        session_id: u64,
        reason: anyhow::Error,
    },
    /// the transport failed to deliver or accept bytes
    TransportFailed,
}
