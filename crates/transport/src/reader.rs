//! Backend line reader.
//!
//! This module provides [`BackendReader`], a typed wrapper around a
//! framed async reader that produces a stream of classified [`Line`]s.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use pin_project_lite::pin_project;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::codec::LineCodec;
use crate::error::CodecError;
use crate::message::Line;

pin_project! {
    /// An async stream of classified backend lines.
    ///
    /// `BackendReader` wraps an [`AsyncRead`] source (typically the
    /// backend process's stdout) and frames the byte stream into
    /// [`Line`]s. It implements [`Stream`], allowing async iteration.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use futures::StreamExt;
    /// use transport::{BackendReader, Line};
    ///
    /// let mut reader = BackendReader::new(child_stdout);
    ///
    /// while let Some(result) = reader.next().await {
    ///     match result? {
    ///         Line::Record(record) => { /* correlate */ }
    ///         Line::Log(text) => { /* forward output */ }
    ///         Line::Diagnostic(msg) => { /* raise fault */ }
    ///         Line::Malformed { .. } => { /* protocol diagnostic */ }
    ///     }
    /// }
    /// ```
    pub struct BackendReader<R> {
        #[pin]
        inner: FramedRead<R, LineCodec>,
    }
}

impl<R> BackendReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Create a new reader from an async read source.
    pub fn new(reader: R) -> Self {
        Self {
            inner: FramedRead::new(reader, LineCodec::new()),
        }
    }

    /// Create a new reader with a custom codec.
    pub fn with_codec(reader: R, codec: LineCodec) -> Self {
        Self {
            inner: FramedRead::new(reader, codec),
        }
    }

    /// Get a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        self.inner.get_ref()
    }

    /// Consume the reader and return the underlying source.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

impl<R> Stream for BackendReader<R>
where
    R: AsyncRead + Unpin,
{
    type Item = Result<Line, CodecError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}
