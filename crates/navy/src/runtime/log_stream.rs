//! Multiplexed byte stream fed by several independent sources
//!
//! A [`LogStream`] is created together with a [`LogSink`]. Every source is
//! registered through the sink (either as a [`LogSource`] handle that is written
//! to directly, or by attaching an `AsyncRead` that gets pumped on its own
//! task). Chunks are forwarded in the order they reach the sink, so bytes of
//! one source never get reordered while chunks of different sources interleave.
//!
//! The stream ends once the sink and every registered source are gone. Drop
//! the sink after the last source is registered, otherwise the stream never
//! ends.

use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::exec::ExecError;

const PUMP_CHUNK_SIZE: usize = 8 * 1024;

type Message = Result<Vec<u8>, LogStreamError>;

/// Errors surfaced on a combined log stream
#[derive(Debug, thiserror::Error)]
pub enum LogStreamError {
    #[error("Log source '{label}' failed: {source}")]
    Source {
        label: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Log backend process failed: {0}")]
    Backend(#[from] ExecError),
}

/// Consumer side of a multiplexed log stream
#[derive(Debug)]
pub struct LogStream {
    rx: mpsc::UnboundedReceiver<Message>,
}

/// Registration handle for the sources of a [`LogStream`]
#[derive(Debug, Clone)]
pub struct LogSink {
    tx: mpsc::UnboundedSender<Message>,
}

/// A single registered source. Dropping it (or calling [`LogSource::finish`])
/// signals that the source has ended.
#[derive(Debug)]
pub struct LogSource {
    label: String,
    tx: mpsc::UnboundedSender<Message>,
}

impl LogStream {
    /// Create a stream and the sink its sources register through
    pub fn channel() -> (LogSink, LogStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (LogSink { tx }, LogStream { rx })
    }

    /// Next chunk or source error, `None` once every source has ended
    pub async fn next_chunk(&mut self) -> Option<Result<Vec<u8>, LogStreamError>> {
        self.rx.recv().await
    }

    /// Copy the stream into `writer` until every source has ended.
    ///
    /// Source errors do not stop the copy; they are logged and returned once
    /// the stream is exhausted. Write failures abort immediately.
    pub async fn pipe_to<W>(mut self, writer: &mut W) -> std::io::Result<Vec<LogStreamError>>
    where
        W: AsyncWrite + Unpin,
    {
        let mut errors = Vec::new();

        while let Some(message) = self.next_chunk().await {
            match message {
                Ok(chunk) => {
                    writer.write_all(&chunk).await?;
                    writer.flush().await?;
                }
                Err(e) => {
                    log::warn!("{}", e);
                    errors.push(e);
                }
            }
        }

        Ok(errors)
    }
}

impl Stream for LogStream {
    type Item = Result<Vec<u8>, LogStreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl LogSink {
    /// Register a new source
    pub fn source(&self, label: impl Into<String>) -> LogSource {
        LogSource {
            label: label.into(),
            tx: self.tx.clone(),
        }
    }

    /// Register `reader` as a source and pump it on a background task
    pub fn attach<R>(&self, label: impl Into<String>, reader: R) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let source = self.source(label);
        tokio::spawn(source.pump(reader))
    }
}

impl LogSource {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Forward a chunk. Returns `false` once the consumer has gone away.
    pub fn write(&self, chunk: impl Into<Vec<u8>>) -> bool {
        let chunk = chunk.into();
        if chunk.is_empty() {
            return !self.tx.is_closed();
        }
        self.tx.send(Ok(chunk)).is_ok()
    }

    /// Surface an error on the combined stream. The source stays registered.
    pub fn fail(&self, error: LogStreamError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }

    /// Signal the end of this source
    pub fn finish(self) {}

    /// Resolves once the consumer has dropped the stream
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Forward everything `reader` produces, then end the source
    pub async fn pump<R>(self, mut reader: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; PUMP_CHUNK_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if !self.write(&buf[..n]) {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let label = self.label.clone();
                    self.fail(LogStreamError::Source { label, source: e });
                    break;
                }
            }
        }
        log::trace!("Log source '{}' ended", self.label);
    }
}
