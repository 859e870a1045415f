//! Client for the sBPF debugger backend process.
//!
//! This crate owns everything between the raw transport and the session
//! layer:
//!
//! - spawning the backend process with arguments derived from a launch
//!   configuration ([`Backend`])
//! - request/response correlation over the line protocol
//!   ([`BackendClient`]), with a typed method per backend command
//! - the readiness gate: breakpoint mutations issued before the backend
//!   has assembled the program are queued and replayed in order once a
//!   `getDebugInfo` probe succeeds
//! - out-of-band traffic (program output, diagnostics, entry/exit
//!   notifications) published as [`BackendEvent`]s
//!
//! The client is transport-agnostic: [`BackendClient::connect`] accepts
//! boxed stream halves, so tests drive it over in-memory pipes (see
//! [`testing`]).

mod client;
mod error;
mod event;
mod process;
mod ready;
mod types;

pub mod testing;

pub use client::{BackendClient, BoxedReader, BoxedWriter};
pub use error::ClientError;
pub use event::BackendEvent;
pub use process::{BACKEND_PROGRAM, Backend};
pub use types::{
    ComputeUnits, DebugInfoSummary, MemoryRegion, Register, RodataEntry, SetBreakpointOutcome,
    SetRegisterAck, StackFrame,
};
