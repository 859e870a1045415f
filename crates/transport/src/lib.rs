//! Async transport layer for the sBPF debugger backend.
//!
//! The backend process speaks a line-delimited JSON protocol over its
//! standard streams: one logical record per line in both directions.
//! This crate handles framing and classification of that byte stream.
//!
//! # Architecture
//!
//! The crate is designed around the tokio-util codec pattern:
//!
//! - [`LineCodec`] implements `Decoder` for incoming lines and `Encoder`
//!   for outgoing commands
//! - [`BackendReader`] wraps an `AsyncRead` to produce a `Stream` of
//!   classified [`Line`]s
//! - [`BackendWriter`] wraps an `AsyncWrite` to provide a `Sink` for
//!   outgoing [`Command`]s
//!
//! # Classification
//!
//! Not every line the backend emits is a protocol record. Lines carrying
//! the `Program log:` marker are debuggee output, lines carrying the
//! `error:` marker are backend diagnostics, and only the remainder is
//! parsed as JSON. Classification happens during decoding, before any
//! request correlation; see [`Line`].
//!
//! # Scope
//!
//! This crate intentionally handles only transport concerns: framing
//! bytes into lines independent of chunk boundaries, classifying each
//! line, and encoding outgoing commands. Request-response correlation,
//! readiness gating, and session state belong in upstream crates
//! (`backend` and `session`).

mod codec;
mod error;
mod message;
mod reader;
mod writer;

pub mod testing;

pub use codec::LineCodec;
pub use error::CodecError;
pub use message::{Command, ERROR_MARKER, LOG_MARKER, Line, RequestId, Response};
pub use reader::BackendReader;
pub use writer::BackendWriter;
