use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

/// Hands acknowledgements from the dispatcher to the downstream publisher of a session.
///
/// This is a single slot: delivering never blocks the dispatcher. If the slot is still occupied
///  by an earlier ack that the publisher did not pick up, the new ack is dropped. The publisher
///  clears the slot before sending a new data packet, so a stale ack can at worst count as one
///  unmatched ack for the packet in flight.
pub(crate) fn ack_signal() -> (AckSender, AckReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (AckSender { tx }, AckReceiver { rx })
}

pub(crate) struct AckSender {
    tx: mpsc::Sender<bool>,
}
impl AckSender {
    pub fn deliver(&self, sequence_flag: bool) {
        match self.tx.try_send(sequence_flag) {
            Ok(()) => trace!("delivered ack {}", sequence_flag as u8),
            Err(TrySendError::Full(_)) => debug!("no publisher waiting for ack {} - dropping it", sequence_flag as u8),
            Err(TrySendError::Closed(_)) => debug!("publisher is gone - dropping ack {}", sequence_flag as u8),
        }
    }
}

pub(crate) struct AckReceiver {
    rx: mpsc::Receiver<bool>,
}
impl AckReceiver {
    /// waits for the next ack, `None` if the sending side is gone
    pub async fn recv(&mut self) -> Option<bool> {
        self.rx.recv().await
    }

    /// discards an ack that arrived while nobody was waiting
    pub fn clear(&mut self) {
        while let Ok(stale) = self.rx.try_recv() {
            trace!("discarding stale ack {}", stale as u8);
        }
    }
}
