use std::fmt;

/// Why execution stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Entry,
    Breakpoint,
    Step,
    Exception,
}

impl StopReason {
    /// The IDE-facing reason string.
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Entry => "entry",
            StopReason::Breakpoint => "breakpoint",
            StopReason::Step => "step",
            StopReason::Exception => "exception",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a debugging session.
///
/// `Terminated` is absorbing: no transition leaves it, and events
/// arriving afterwards are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Stopped at the entrypoint before any control command (only when
    /// the launch configuration asked to stop on entry).
    Entry,
    Running,
    Stopped(StopReason),
    Terminated,
}
