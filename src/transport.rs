//! Byte-stream transport: read pump, write pump, disconnect signaling.
//!
//! The transport hides the socket behind two spawned tasks:
//!
//! - the **read loop** owns the read half and a [`FrameBuffer`], and hands
//!   complete frames to the session through the [`FrameSink`] seam;
//! - the **write loop** owns the write half and the receive end of an
//!   unbounded channel of pre-encoded frames. [`Transport::send`] is a
//!   channel send: it never blocks and gives no completion notification.
//!
//! A single consumer draining the channel guarantees wire order equals
//! enqueue order with at most one socket write outstanding. Read errors,
//! EOF, framing violations, write errors and [`Transport::disconnect`] all
//! converge on the same path: a `watch` close signal both loops select on,
//! after which the read loop fires [`FrameSink::on_disconnected`] exactly
//! once.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};

use crate::protocol::{Frame, FrameBuffer};

/// Size of the chunk handed to each socket read.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Receiver half of the transport: the session layer implements this to
/// take delivery of complete frames and the disconnect notification.
pub(crate) trait FrameSink: Send + Sync + 'static {
    /// A complete frame arrived. Called from the read task, in wire order.
    fn on_frame(&self, frame: Frame);

    /// The connection is gone: socket closed, read/write failed, or the
    /// inbound stream lost framing sync. Called exactly once.
    fn on_disconnected(&self);
}

/// Handle for submitting bytes and closing the connection.
pub(crate) struct Transport {
    outgoing: mpsc::UnboundedSender<Vec<u8>>,
    close: Arc<watch::Sender<bool>>,
}

/// Channel ends consumed by the spawned I/O tasks.
pub(crate) struct TransportIo {
    outgoing: mpsc::UnboundedReceiver<Vec<u8>>,
    close: Arc<watch::Sender<bool>>,
}

impl Transport {
    /// Create the transport handle and the channel ends for [`spawn_io`].
    pub(crate) fn new() -> (Self, TransportIo) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let close = Arc::new(watch::channel(false).0);
        (
            Self {
                outgoing: out_tx,
                close: Arc::clone(&close),
            },
            TransportIo {
                outgoing: out_rx,
                close,
            },
        )
    }

    /// Enqueue a pre-encoded frame for transmission.
    ///
    /// Never blocks on the socket. After a disconnect the bytes are
    /// silently dropped; the connection is terminal.
    pub(crate) fn send(&self, bytes: Vec<u8>) {
        let _ = self.outgoing.send(bytes);
    }

    /// Close the connection. Idempotent, ignores errors.
    pub(crate) fn disconnect(&self) {
        let _ = self.close.send(true);
    }
}

/// Spawn the read and write tasks servicing `stream`.
pub(crate) fn spawn_io<S>(stream: S, io: TransportIo, sink: Arc<dyn FrameSink>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let read_close = io.close.subscribe();
    let write_close = io.close.subscribe();
    tokio::spawn(read_loop(reader, sink, Arc::clone(&io.close), read_close));
    tokio::spawn(write_loop(writer, io.outgoing, io.close, write_close));
}

/// Read pump: append socket reads to the frame buffer, dispatch every
/// complete frame, stop on EOF, error, framing violation or close signal.
async fn read_loop<R>(
    mut reader: R,
    sink: Arc<dyn FrameSink>,
    close: Arc<watch::Sender<bool>>,
    mut close_rx: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut frames = FrameBuffer::new();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    'read: loop {
        tokio::select! {
            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    tracing::debug!("connection closed by peer");
                    break 'read;
                }
                Ok(n) => {
                    frames.extend(&buf[..n]);
                    loop {
                        match frames.next_frame() {
                            Ok(Some(frame)) => sink.on_frame(frame),
                            Ok(None) => break,
                            Err(e) => {
                                tracing::warn!("framing error, closing connection: {e}");
                                break 'read;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!("read error: {e}");
                    break 'read;
                }
            },
            _ = close_rx.changed() => break 'read,
        }
    }

    // Make sure the write task winds down too, then notify the session.
    let _ = close.send(true);
    sink.on_disconnected();
}

/// Write pump: drain queued frames into the socket, one write in flight.
async fn write_loop<W>(
    mut writer: W,
    mut outgoing: mpsc::UnboundedReceiver<Vec<u8>>,
    close: Arc<watch::Sender<bool>>,
    mut close_rx: watch::Receiver<bool>,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    'write: loop {
        tokio::select! {
            message = outgoing.recv() => match message {
                Some(mut chunk) => {
                    // Coalesce whatever else is already queued into this
                    // write; enqueue order is preserved.
                    while let Ok(more) = outgoing.try_recv() {
                        chunk.extend_from_slice(&more);
                    }
                    if let Err(e) = writer.write_all(&chunk).await {
                        tracing::debug!("write error: {e}");
                        break 'write;
                    }
                    if let Err(e) = writer.flush().await {
                        tracing::debug!("flush error: {e}");
                        break 'write;
                    }
                }
                None => break 'write,
            },
            _ = close_rx.changed() => break 'write,
        }
    }

    // Wake the read task so the disconnect fan-out runs, then half-close.
    let _ = close.send(true);
    let _ = writer.shutdown().await;
}
