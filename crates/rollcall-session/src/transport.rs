//! Persistent NDJSON-over-TCP connection to the recognition service.
//!
//! One writer task drains outbound messages; one reader task decodes
//! inbound events and forwards them to the session. A malformed inbound
//! line is a protocol fault: logged and dropped, never fatal. Closure of
//! the event channel is how the session learns the connection died.

use crate::wire::{ClientMessage, ServerEvent};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("handshake did not complete within {0:?}")]
    Timeout(Duration),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed")]
    Closed,
}

/// Owning handle to one live connection.
pub struct Connection {
    outbound: Option<mpsc::Sender<ClientMessage>>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl Connection {
    /// Establish the connection within the timeout.
    ///
    /// Returns the handle plus the inbound event stream. The stream ends
    /// (returns `None`) when the peer disconnects or the read side fails.
    pub async fn connect(
        endpoint: &str,
        timeout: Duration,
    ) -> Result<(Self, mpsc::Receiver<ServerEvent>), ConnectionError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(endpoint))
            .await
            .map_err(|_| ConnectionError::Timeout(timeout))??;
        stream.set_nodelay(true)?;
        tracing::info!(endpoint, "connected to recognition service");

        let (read_half, mut write_half) = stream.into_split();
        let (out_tx, mut out_rx) = mpsc::channel::<ClientMessage>(16);
        let (ev_tx, ev_rx) = mpsc::channel::<ServerEvent>(64);

        let writer = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let mut line = match serde_json::to_vec(&msg) {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to encode outbound message");
                        continue;
                    }
                };
                line.push(b'\n');
                if let Err(e) = write_half.write_all(&line).await {
                    tracing::warn!(error = %e, "write failed; outbound closed");
                    break;
                }
            }
        });

        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<ServerEvent>(&line) {
                            Ok(event) => {
                                if ev_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            // Protocol fault: drop the event, keep the session alive.
                            Err(e) => tracing::warn!(error = %e, "dropping malformed event"),
                        }
                    }
                    Ok(None) => {
                        tracing::info!("recognition service closed the connection");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "read failed; connection lost");
                        break;
                    }
                }
            }
        });

        Ok((
            Self {
                outbound: Some(out_tx),
                writer: Some(writer),
                reader: Some(reader),
            },
            ev_rx,
        ))
    }

    /// Queue a message for the writer task. Fire-and-forget from the
    /// caller's perspective; fails only when the connection is gone.
    pub async fn send(&self, msg: ClientMessage) -> Result<(), ConnectionError> {
        self.outbound
            .as_ref()
            .ok_or(ConnectionError::Closed)?
            .send(msg)
            .await
            .map_err(|_| ConnectionError::Closed)
    }

    /// Graceful shutdown: let the writer drain queued messages, then stop
    /// reading. Safe to call after `close`.
    pub async fn shutdown(mut self) {
        drop(self.outbound.take());
        if let Some(writer) = self.writer.take() {
            let _ = writer.await;
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    /// Release the connection immediately. Idempotent.
    pub fn close(&mut self) {
        self.outbound.take();
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
