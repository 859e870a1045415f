//! Backend command writer.
//!
//! This module provides [`BackendWriter`], a typed wrapper around a
//! framed async writer for sending commands to the backend.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Sink;
use pin_project_lite::pin_project;
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;

use crate::codec::LineCodec;
use crate::error::CodecError;
use crate::message::Command;

pin_project! {
    /// An async sink for outgoing backend commands.
    ///
    /// `BackendWriter` wraps an [`AsyncWrite`] destination (typically
    /// the backend process's stdin) and encodes each [`Command`] as one
    /// newline-terminated JSON record.
    pub struct BackendWriter<W> {
        #[pin]
        inner: FramedWrite<W, LineCodec>,
    }
}

impl<W> BackendWriter<W>
where
    W: AsyncWrite + Unpin,
{
    /// Create a new writer from an async write destination.
    pub fn new(writer: W) -> Self {
        Self {
            inner: FramedWrite::new(writer, LineCodec::new()),
        }
    }

    /// Send a command to the backend.
    ///
    /// This is a convenience method that handles the full send cycle:
    /// feeding the command, flushing, and awaiting completion.
    pub async fn send(&mut self, command: Command) -> Result<(), CodecError> {
        use futures::SinkExt;
        SinkExt::send(&mut self.inner, command).await
    }

    /// Get a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        self.inner.get_ref()
    }

    /// Consume the writer and return the underlying destination.
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

impl<W> Sink<Command> for BackendWriter<W>
where
    W: AsyncWrite + Unpin,
{
    type Error = CodecError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Command) -> Result<(), Self::Error> {
        self.project().inner.start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_close(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn write_single_command() {
        let mut writer = BackendWriter::new(Cursor::new(Vec::new()));
        writer
            .send(Command::new("continue", None, 1))
            .await
            .unwrap();

        let output = writer.into_inner().into_inner();
        let s = String::from_utf8(output).unwrap();
        assert_eq!(s, "{\"command\":\"continue\",\"requestId\":1}\n");
    }

    #[tokio::test]
    async fn write_multiple_commands() {
        let mut writer = BackendWriter::new(Cursor::new(Vec::new()));
        for id in 1..=3 {
            writer
                .send(Command::new("step", None, id))
                .await
                .unwrap();
        }

        let output = writer.into_inner().into_inner();
        let s = String::from_utf8(output).unwrap();
        assert_eq!(s.lines().count(), 3);
        assert!(s.contains(r#""requestId":3"#));
    }
}
