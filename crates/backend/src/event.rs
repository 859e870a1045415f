use transport::Response;

use crate::types::ComputeUnits;

/// Events published by the backend client outside request correlation.
///
/// These flow over an unbounded channel handed out at connect time. The
/// session layer translates them into IDE-facing events.
#[derive(Debug)]
pub enum BackendEvent {
    /// A debuggee output line (carries the `Program log:` marker).
    Output(String),
    /// A line from the backend's stderr stream. Never protocol data.
    Stderr(String),
    /// A backend diagnostic line (`error:` marker, stripped).
    Diagnostic(String),
    /// A line that could not be parsed as protocol data.
    Protocol { raw: String, reason: String },
    /// Execution stopped at the program entrypoint.
    Entry { pc: Option<u64>, line: Option<u64> },
    /// The debuggee finished executing. Terminal: no further events
    /// except [`BackendEvent::ProcessExited`] follow.
    Exited {
        code: i64,
        compute_units: Option<ComputeUnits>,
    },
    /// A backend-reported fault not consumed by a pending request.
    Fault(String),
    /// The backend process itself exited.
    ProcessExited { code: Option<i32> },
    /// A well-formed record that matched no pending request and carried
    /// no recognised payload tag.
    Unsolicited(Response),
}
