use anyhow::bail;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::select;
use tokio::sync::{watch, Mutex};
use tracing::{debug, trace};

use crate::transport::SerialTransport;

/// [SerialTransport] on top of any tokio byte stream: a TCP connection standing in for a serial
///  line, a device file, an in-memory duplex pipe etc.
pub struct StreamTransport<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
    closed: watch::Sender<bool>,
}

impl<S> StreamTransport<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn from_stream(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        StreamTransport::new(reader, writer)
    }
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        let (closed, _) = watch::channel(false);
        StreamTransport {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed,
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    async fn wait_closed(mut closed: watch::Receiver<bool>) {
        loop {
            let is_closed = *closed.borrow_and_update();
            if is_closed {
                return;
            }
            if closed.changed().await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl<R, W> SerialTransport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn receive_byte(&self) -> anyhow::Result<u8> {
        let closed = self.closed.subscribe();
        if self.is_closed() {
            bail!("transport is closed");
        }

        let mut reader = self.reader.lock().await;
        select! {
            result = reader.read_u8() => Ok(result?),
            _ = Self::wait_closed(closed) => bail!("transport is closed"),
        }
    }

    async fn send_byte(&self, byte: u8) -> anyhow::Result<()> {
        let closed = self.closed.subscribe();
        if self.is_closed() {
            bail!("transport is closed");
        }

        let mut writer = self.writer.lock().await;
        select! {
            result = async {
                writer.write_all(&[byte]).await?;
                writer.flush().await
            } => Ok(result?),
            _ = Self::wait_closed(closed) => bail!("transport is closed"),
        }
    }

    async fn close(&self) {
        if self.closed.send_replace(true) {
            trace!("transport already closed");
            return;
        }

        debug!("closing transport");
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!("error shutting down transport: {}", e);
        }
    }
}
