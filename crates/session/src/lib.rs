//! Debugging session layer for the sBPF debugger bridge.
//!
//! A [`Session`] sits between an IDE's debugging requests and one
//! backend process. It owns the session state machine, translates
//! backend traffic into IDE-facing [`SessionEvent`]s through a single
//! dispatcher loop, and projects backend state (registers, read-only
//! data, compute units) into scopes and variables.
//!
//! Faults and termination follow a fixed policy: backend-reported
//! faults stop the session for inspection without ending it; process
//! exit, clean or not, always drives the session to
//! [`SessionState::Terminated`].

mod capabilities;
mod error;
mod events;
mod session;
mod state;
mod types;
mod variables;

pub use capabilities::{Capabilities, ExceptionBreakpointFilter};
pub use error::SessionError;
pub use events::{OutputCategory, SessionEvent};
pub use session::{Session, THREAD_ID};
pub use state::{SessionState, StopReason};
pub use types::{Breakpoint, Scope, StackFrame, Thread, Variable};
pub use variables::{COMPUTE_UNITS_REFERENCE, REGISTERS_REFERENCE, RODATA_REFERENCE};
