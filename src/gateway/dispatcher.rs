use std::sync::Arc;

use anyhow::anyhow;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::gateway::ack_signal::{ack_signal, AckSender};
use crate::gateway::byte_pump::run_packet_transmitter;
use crate::gateway::gateway_config::GatewayConfig;
use crate::gateway::publisher::DownstreamPublisher;
use crate::gateway::upstream::{Dialer, UpstreamWriter};
use crate::gateway::{ConnectionState, GatewayEvent};
use crate::packet::{Command, Packet};
use crate::transport::SerialTransport;

/// The single owner of a gateway's link state. Packets from the framer and failure reports
///  from the other tasks arrive as [GatewayEvent]s and are processed strictly one at a time,
///  so state transitions never race.
pub(crate) struct SessionDispatcher {
    config: Arc<GatewayConfig>,
    transport: Arc<dyn SerialTransport>,
    dialer: Arc<dyn Dialer>,
    /// handed to the tasks spawned per session
    events: mpsc::Sender<GatewayEvent>,
    state: watch::Sender<ConnectionState>,

    session_id: u64,
    expected_sequence_flag: bool,
    upstream: Option<UpstreamWriter>,
    outbound: Option<mpsc::Sender<Packet>>,
    acks: Option<AckSender>,
    publisher: Option<JoinHandle<()>>,
    transmitter: Option<JoinHandle<()>>,
    /// the transmitter of a torn down session that may still be flushing its queue
    retired_transmitter: Option<JoinHandle<()>>,
}

impl SessionDispatcher {
    pub fn new(
        config: Arc<GatewayConfig>,
        transport: Arc<dyn SerialTransport>,
        dialer: Arc<dyn Dialer>,
        events: mpsc::Sender<GatewayEvent>,
        state: watch::Sender<ConnectionState>,
    ) -> SessionDispatcher {
        SessionDispatcher {
            config,
            transport,
            dialer,
            events,
            state,
            session_id: 0,
            expected_sequence_flag: false,
            upstream: None,
            outbound: None,
            acks: None,
            publisher: None,
            transmitter: None,
            retired_transmitter: None,
        }
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Processes events until the gateway is torn down
    pub async fn run(mut self, mut events: mpsc::Receiver<GatewayEvent>) {
        debug!("starting session dispatcher");

        while let Some(event) = events.recv().await {
            match event {
                GatewayEvent::Packet(packet) => self.on_packet(packet).await,
                GatewayEvent::FramingFailed => {
                    if self.connection_state() == ConnectionState::Connected {
                        self.enqueue(Packet::control(Command::Disconnect, false)).await;
                    }
                    self.drop_gateway().await;
                }
                GatewayEvent::LinkFailed { session_id, reason } => {
                    if session_id != self.session_id || self.connection_state() != ConnectionState::Connected {
                        debug!("ignoring link failure of closed session #{}: {}", session_id, reason);
                        continue;
                    }
                    warn!("link of session #{} failed: {}", session_id, reason);
                    self.enqueue(Packet::control(Command::Disconnect, false)).await;
                    self.drop_link().await;
                }
                GatewayEvent::TransportFailed => self.drop_gateway().await,
            }

            if self.connection_state() == ConnectionState::TransportNotReady {
                break;
            }
        }

        debug!("session dispatcher terminated");
    }

    async fn on_packet(&mut self, packet: Packet) {
        trace!("dispatching {:?}", packet);

        match packet.command() {
            Some(Command::Publish) => self.on_publish(packet).await,
            Some(Command::Acknowledge) => self.on_acknowledge(packet),
            Some(Command::Connect) => self.on_connect(packet).await,
            Some(Command::Disconnect) => self.on_disconnect().await,
            Some(Command::ConnAck) | None => debug!("ignoring {:?}", packet),
        }
    }

    async fn on_publish(&mut self, packet: Packet) {
        if self.connection_state() != ConnectionState::Connected {
            debug!("ignoring {:?} without a session", packet);
            return;
        }

        let sequence_flag = packet.sequence_flag();
        self.enqueue(Packet::control(Command::Acknowledge, sequence_flag)).await;

        if sequence_flag != self.expected_sequence_flag {
            debug!("received duplicate {:?} - acknowledged but not forwarded", packet);
            return;
        }
        self.expected_sequence_flag = !sequence_flag;

        if let Err(e) = self.forward_upstream(packet.payload()).await {
            warn!("error sending to upstream: {}", e);
            self.enqueue(Packet::control(Command::Disconnect, false)).await;
            self.drop_link().await;
        }
    }

    async fn forward_upstream(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        let upstream = self.upstream.as_mut()
            .ok_or_else(|| anyhow!("no upstream connection"))?;
        upstream.write_all(payload).await?;
        upstream.flush().await?;
        trace!("forwarded {} bytes to upstream", payload.len());
        Ok(())
    }

    fn on_acknowledge(&self, packet: Packet) {
        if self.connection_state() != ConnectionState::Connected {
            debug!("ignoring {:?} without a session", packet);
            return;
        }
        if let Some(acks) = &self.acks {
            acks.deliver(packet.sequence_flag());
        }
    }

    async fn on_connect(&mut self, packet: Packet) {
        if self.connection_state() != ConnectionState::Disconnected {
            debug!("ignoring {:?} while {:?}", packet, self.connection_state());
            return;
        }
        let addr = match packet.connect_addr() {
            Some(addr) => addr,
            None => {
                debug!("ignoring CONNECT with a payload of {} bytes", packet.payload().len());
                return;
            }
        };

        // the previous session's transmitter must be done before a new one takes over the transport
        self.await_retired_transmitter().await;

        self.session_id += 1;
        let session_id = self.session_id;
        let span = info_span!("session", id = session_id);
        info!("session #{}: connecting to upstream {}", session_id, addr);

        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_queue_capacity);
        self.expected_sequence_flag = false;
        self.outbound = Some(outbound_tx.clone());
        self.transmitter = Some(tokio::spawn(
            run_packet_transmitter(self.transport.clone(), outbound_rx, self.events.clone())
                .instrument(span.clone())
        ));

        match self.dialer.dial(addr).await {
            Ok((reader, writer)) => {
                self.upstream = Some(writer);
                self.state.send_replace(ConnectionState::Connected);
                info!("session #{}: connected to {}", session_id, addr);

                // CONNACK goes first, before any data the publisher sends
                self.enqueue(Packet::control(Command::ConnAck, false)).await;

                let (ack_tx, ack_rx) = ack_signal();
                self.acks = Some(ack_tx);
                let publisher = DownstreamPublisher::new(
                    self.config.clone(),
                    session_id,
                    reader,
                    outbound_tx,
                    ack_rx,
                    self.events.clone(),
                );
                self.publisher = Some(tokio::spawn(publisher.run().instrument(span)));
            }
            Err(e) => {
                warn!("session #{}: could not connect to {}: {}", session_id, addr, e);
                drop(outbound_tx);
                self.enqueue(Packet::control(Command::Disconnect, false)).await;
                self.drop_link().await;
            }
        }
    }

    async fn on_disconnect(&mut self) {
        if self.connection_state() != ConnectionState::Connected {
            debug!("ignoring DISCONNECT without a session");
            return;
        }
        info!("session #{}: client disconnected", self.session_id);
        self.drop_link().await;
    }

    /// Queues a packet for the current session's transmitter. Waits while the queue is full.
    async fn enqueue(&mut self, packet: Packet) {
        match &self.outbound {
            Some(outbound) => {
                if outbound.send(packet).await.is_err() {
                    debug!("packet transmitter is gone - dropping outbound packet");
                }
            }
            None => debug!("no outbound queue - dropping {:?}", packet),
        }
    }

    /// Session teardown. Idempotent.
    async fn drop_link(&mut self) {
        if let Some(publisher) = self.publisher.take() {
            publisher.abort();
        }
        self.acks = None;

        if let Some(mut upstream) = self.upstream.take() {
            if let Err(e) = upstream.shutdown().await {
                debug!("error closing upstream connection: {}", e);
            }
        }

        // closing the queue lets the transmitter finish with what is already queued
        self.outbound = None;
        if let Some(transmitter) = self.transmitter.take() {
            self.retired_transmitter = Some(transmitter);
        }

        if self.connection_state() == ConnectionState::Connected {
            info!("session #{} closed", self.session_id);
        }
        if self.connection_state() != ConnectionState::TransportNotReady {
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }

    async fn await_retired_transmitter(&mut self) {
        if let Some(mut transmitter) = self.retired_transmitter.take() {
            if timeout(self.config.writer_drain_timeout, &mut transmitter).await.is_err() {
                warn!("packet transmitter did not drain within {:?} - aborting it", self.config.writer_drain_timeout);
                transmitter.abort();
            }
        }
    }

    /// Gateway teardown. Terminal: no more bytes are sent or received afterwards.
    async fn drop_gateway(&mut self) {
        self.drop_link().await;
        self.await_retired_transmitter().await;
        self.transport.close().await;
        self.state.send_replace(ConnectionState::TransportNotReady);
        info!("gateway shut down");
    }
}
