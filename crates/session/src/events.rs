use crate::state::StopReason;

/// Destination stream for a piece of session output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCategory {
    /// Adapter-generated messages (exit summaries and the like).
    Console,
    /// Debuggee output.
    Stdout,
    /// Diagnostics and fault text.
    Stderr,
}

impl OutputCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputCategory::Console => "console",
            OutputCategory::Stdout => "stdout",
            OutputCategory::Stderr => "stderr",
        }
    }
}

/// IDE-facing events published by the session dispatcher.
#[derive(Debug)]
pub enum SessionEvent {
    /// Execution stopped; the IDE should refresh threads and frames.
    Stopped { reason: StopReason },
    /// The session is over. Emitted exactly once.
    Terminated { exit_code: Option<i64> },
    /// A line of output for the IDE's console.
    Output {
        category: OutputCategory,
        output: String,
    },
    /// A session-level fault. The session stays inspectable unless a
    /// `Terminated` event follows.
    Fault { message: String },
    /// The backend emitted a line that could not be parsed. Processing
    /// continues; this is diagnostic only.
    ProtocolError { raw: String, reason: String },
}
