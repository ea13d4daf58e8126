use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::gateway::byte_pump::run_byte_receiver;
use crate::gateway::dispatcher::SessionDispatcher;
use crate::gateway::framer::PacketFramer;
use crate::gateway::gateway_config::GatewayConfig;
use crate::gateway::upstream::{Dialer, TcpDialer};
use crate::gateway::ConnectionState;
use crate::transport::SerialTransport;

/// A protocol gateway for a single transport connection. It serves one session at a time, and
///  any number of sessions in sequence, until the transport fails or the client's framing
///  breaks down during a session.
pub struct Gateway {
    config: Arc<GatewayConfig>,
    transport: Arc<dyn SerialTransport>,
    dialer: Arc<dyn Dialer>,
    state: watch::Sender<ConnectionState>,
}

impl Gateway {
    pub fn new(config: GatewayConfig, transport: Arc<dyn SerialTransport>, dialer: Arc<dyn Dialer>) -> anyhow::Result<Gateway> {
        config.validate()?;

        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Ok(Gateway {
            config: Arc::new(config),
            transport,
            dialer,
            state,
        })
    }

    /// A gateway that dials upstream servers over TCP, bounded by the configured dial timeout
    pub fn over_tcp(config: GatewayConfig, transport: Arc<dyn SerialTransport>) -> anyhow::Result<Gateway> {
        let dialer = Arc::new(TcpDialer::new(config.dial_timeout));
        Gateway::new(config, transport, dialer)
    }

    /// Observes the gateway's connection state, also after [Gateway::listen] has returned
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Runs the gateway until it is torn down, i.e. until the transport fails or is closed, or
    ///  until a connected client's framing fails repeatedly. The transport is closed when this
    ///  returns.
    pub async fn listen(self) -> anyhow::Result<()> {
        info!("starting gateway");

        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.inbound_queue_capacity);
        // a capacity of one lets the dispatcher throttle the framer
        let (events_tx, events_rx) = mpsc::channel(1);

        let framer = PacketFramer::new(
            self.config.clone(),
            inbound_rx,
            events_tx.clone(),
            self.state.subscribe(),
        );
        let dispatcher = SessionDispatcher::new(
            self.config,
            self.transport.clone(),
            self.dialer,
            events_tx.clone(),
            self.state,
        );

        let receiver = tokio::spawn(run_byte_receiver(self.transport, inbound_tx, events_tx));
        let framer = tokio::spawn(framer.run());
        let dispatcher = tokio::spawn(dispatcher.run(events_rx));

        let (receiver_result, framer_result, dispatcher_result) = tokio::join!(receiver, framer, dispatcher);
        receiver_result?;
        framer_result?;
        dispatcher_result?;

        debug!("all gateway tasks terminated");
        Ok(())
    }
}
