//! The session state machine and its event dispatcher.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use backend::{
    Backend, BackendClient, BackendEvent, BoxedReader, BoxedWriter, ClientError, ComputeUnits,
    DebugInfoSummary, MemoryRegion,
};
use launch_configuration::SbpfLaunch;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::capabilities::Capabilities;
use crate::error::SessionError;
use crate::events::{OutputCategory, SessionEvent};
use crate::state::{SessionState, StopReason};
use crate::types::{Breakpoint, Scope, StackFrame, Thread, Variable};
use crate::variables;

/// Identifier of the single synthetic thread.
pub const THREAD_ID: i64 = 1;

/// How long a disconnect waits for the backend to acknowledge `quit`
/// before killing it anyway.
const QUIT_GRACE: Duration = Duration::from_millis(500);

/// One debugging session over one backend process.
///
/// The session owns the process exclusively. Every exit path, including
/// drop, cancels the process monitor, so the backend is killed no
/// matter how the session ends.
pub struct Session {
    client: Arc<BackendClient>,
    state: Arc<Mutex<SessionState>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    program: PathBuf,
    backend: Option<Backend>,
    cancel: CancellationToken,
}

impl Session {
    /// Spawn the backend for the given launch configuration and start a
    /// session over it.
    pub fn launch(
        config: &SbpfLaunch,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), SessionError> {
        let (process, backend_events) = Backend::spawn(config)?;
        let client = process.client();
        tracing::info!(program = %config.program.display(), "session started");
        Ok(Self::assemble(
            client,
            Some(process),
            backend_events,
            config.program.clone(),
            config.stop_on_entry,
            CancellationToken::new(),
        ))
    }

    /// Start a session over an existing transport, without spawning a
    /// process. Used by tests driving the session over in-memory pipes.
    pub fn from_transport(
        reader: BoxedReader,
        writer: BoxedWriter,
        program: impl Into<PathBuf>,
        stop_on_entry: bool,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (backend_tx, backend_events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let client = BackendClient::connect(reader, writer, backend_tx, cancel.child_token());
        Self::assemble(
            client,
            None,
            backend_events,
            program.into(),
            stop_on_entry,
            cancel,
        )
    }

    fn assemble(
        client: Arc<BackendClient>,
        backend: Option<Backend>,
        backend_events: mpsc::UnboundedReceiver<BackendEvent>,
        program: PathBuf,
        stop_on_entry: bool,
        cancel: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let initial = if stop_on_entry {
            SessionState::Entry
        } else {
            SessionState::Running
        };
        let state = Arc::new(Mutex::new(initial));

        tokio::spawn(dispatch(
            backend_events,
            Arc::clone(&state),
            event_tx.clone(),
        ));

        if !stop_on_entry {
            // Nothing to configure before running: release the program
            // immediately. The eventual stop is reported like any other.
            let client = Arc::clone(&client);
            let state = Arc::clone(&state);
            let events = event_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = run_continue(&client, &state, &events).await {
                    tracing::warn!(error = %e, "initial continue failed");
                }
            });
        }

        let session = Self {
            client,
            state,
            events: event_tx,
            program,
            backend,
            cancel,
        };
        (session, event_rx)
    }

    /// The program under debug.
    pub fn program(&self) -> &Path {
        &self.program
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    /// The capability contract advertised to the IDE. Fixed for every
    /// session.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::advertised()
    }

    /// Replace the breakpoints of one file.
    ///
    /// Clears the file's previous breakpoints, then sets each requested
    /// line independently. A rejected line marks only its own
    /// breakpoint unverified; the batch never aborts. The backend's
    /// answer is authoritative for the verified flags.
    pub async fn set_breakpoints(
        &self,
        file: &str,
        lines: &[u64],
    ) -> Result<Vec<Breakpoint>, SessionError> {
        self.client.clear_breakpoints(file).await?;
        let mut breakpoints = Vec::with_capacity(lines.len());
        for &line in lines {
            let breakpoint = match self.client.set_breakpoint(file, line).await {
                Ok(outcome) => Breakpoint {
                    id: outcome.id,
                    verified: outcome.verified,
                    line: outcome.line,
                    pc: outcome.pc,
                },
                Err(e) => {
                    tracing::debug!(file, line, error = %e, "breakpoint rejected");
                    Breakpoint {
                        id: None,
                        verified: false,
                        line,
                        pc: None,
                    }
                }
            };
            breakpoints.push(breakpoint);
        }
        Ok(breakpoints)
    }

    /// Resume execution. Returns once the backend reports the next stop;
    /// a stopped-at-breakpoint event is surfaced unconditionally, since
    /// the backend's own records confirm the true stop cause.
    pub async fn continue_execution(&self) -> Result<(), SessionError> {
        run_continue(&self.client, &self.state, &self.events).await
    }

    /// Execute one instruction.
    pub async fn next(&self) -> Result<(), SessionError> {
        set_state(&self.state, SessionState::Running).await;
        match self.client.step().await {
            Ok(_) => {
                stop(&self.state, &self.events, StopReason::Step).await;
                Ok(())
            }
            // Termination reaches the IDE through the dispatcher.
            Err(ClientError::SessionEnded | ClientError::NoProcess) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Step into: the backend exposes no call/return granularity, so no
    /// command is issued and a step stop is synthesized directly.
    pub async fn step_in(&self) -> Result<(), SessionError> {
        stop(&self.state, &self.events, StopReason::Step).await;
        Ok(())
    }

    /// Step out: same no-op contract as [`Session::step_in`].
    pub async fn step_out(&self) -> Result<(), SessionError> {
        stop(&self.state, &self.events, StopReason::Step).await;
        Ok(())
    }

    /// The backend models one execution context.
    pub fn threads(&self) -> Vec<Thread> {
        vec![Thread {
            id: THREAD_ID,
            name: "main".to_string(),
        }]
    }

    pub async fn stack_trace(&self) -> Result<Vec<StackFrame>, SessionError> {
        let frames = self.client.get_stack_frames().await?;
        Ok(frames.into_iter().map(project_frame).collect())
    }

    pub fn scopes(&self) -> Vec<Scope> {
        variables::scopes()
    }

    /// Expand one scope. Values are fetched fresh on every call.
    pub async fn variables(&self, reference: i64) -> Result<Vec<Variable>, SessionError> {
        variables::variables(&self.client, reference).await
    }

    /// Write a register through the Registers scope.
    pub async fn set_variable(
        &self,
        reference: i64,
        name: &str,
        value: &str,
    ) -> Result<Variable, SessionError> {
        variables::set_variable(&self.client, reference, name, value).await
    }

    /// Read raw debuggee memory.
    pub async fn read_memory(&self, address: u64, size: u64) -> Result<MemoryRegion, SessionError> {
        Ok(self.client.get_memory(address, size).await?)
    }

    /// The debug-info summary cached at readiness, if available.
    pub async fn debug_info(&self) -> Option<DebugInfoSummary> {
        self.client.debug_info().await
    }

    pub async fn compute_units(&self) -> Result<ComputeUnits, SessionError> {
        Ok(self.client.get_compute_units().await?)
    }

    /// End the session: best-effort `quit`, then unconditional process
    /// kill. A backend that never answers cannot delay this beyond the
    /// grace period.
    pub async fn disconnect(&self) {
        if self.client.is_connected()
            && tokio::time::timeout(QUIT_GRACE, self.client.quit())
                .await
                .is_err()
        {
            tracing::debug!("backend did not acknowledge quit");
        }
        if let Some(backend) = &self.backend {
            backend.terminate();
        }
        self.cancel.cancel();
        terminate(&self.state, &self.events, None).await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(backend) = &self.backend {
            backend.terminate();
        }
        self.cancel.cancel();
    }
}

fn project_frame(frame: backend::StackFrame) -> StackFrame {
    let source_name = frame.file.as_ref().map(|file| {
        Path::new(file)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.clone())
    });
    StackFrame {
        id: frame.index,
        name: frame.name,
        source_name,
        source_path: frame.file,
        line: frame.line.unwrap_or(0),
        column: frame.column.unwrap_or(0),
        pc: frame.pc,
    }
}

async fn run_continue(
    client: &BackendClient,
    state: &Mutex<SessionState>,
    events: &mpsc::UnboundedSender<SessionEvent>,
) -> Result<(), SessionError> {
    set_state(state, SessionState::Running).await;
    match client.continue_execution().await {
        Ok(_) => {
            stop(state, events, StopReason::Breakpoint).await;
            Ok(())
        }
        // The program exited during the run; the dispatcher reports it.
        Err(ClientError::SessionEnded | ClientError::NoProcess) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Single consumer of the backend event channel. Runs until the channel
/// closes, translating backend traffic into session events and state
/// transitions.
async fn dispatch(
    mut backend_events: mpsc::UnboundedReceiver<BackendEvent>,
    state: Arc<Mutex<SessionState>>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    while let Some(event) = backend_events.recv().await {
        match event {
            BackendEvent::Output(text) => {
                let _ = events.send(SessionEvent::Output {
                    category: OutputCategory::Stdout,
                    output: text,
                });
            }
            BackendEvent::Stderr(line) => {
                let _ = events.send(SessionEvent::Output {
                    category: OutputCategory::Stderr,
                    output: line,
                });
            }
            BackendEvent::Diagnostic(message) | BackendEvent::Fault(message) => {
                fault(&state, &events, message).await;
            }
            BackendEvent::Protocol { raw, reason } => {
                tracing::warn!(%raw, %reason, "protocol violation from backend");
                let _ = events.send(SessionEvent::ProtocolError { raw, reason });
            }
            BackendEvent::Entry { pc, line } => {
                tracing::debug!(?pc, ?line, "stopped at entry");
                stop(&state, &events, StopReason::Entry).await;
            }
            BackendEvent::Exited {
                code,
                compute_units,
            } => {
                let output = match compute_units {
                    Some(units) => format!(
                        "Program exited with code {code}. Compute units consumed: {}/{}",
                        units.used, units.total
                    ),
                    None => format!("Program exited with code {code}."),
                };
                let _ = events.send(SessionEvent::Output {
                    category: OutputCategory::Console,
                    output,
                });
                if code != 0 {
                    let _ = events.send(SessionEvent::Fault {
                        message: SessionError::RuntimeExit(code).to_string(),
                    });
                }
                terminate(&state, &events, Some(code)).await;
            }
            BackendEvent::ProcessExited { code } => {
                // Normally preceded by an exit record, in which case the
                // session is already terminated and this is a no-op.
                if *state.lock().await == SessionState::Terminated {
                    continue;
                }
                if let Some(code) = code.filter(|code| *code != 0) {
                    let _ = events.send(SessionEvent::Fault {
                        message: SessionError::RuntimeExit(code.into()).to_string(),
                    });
                }
                terminate(&state, &events, code.map(i64::from)).await;
            }
            BackendEvent::Unsolicited(record) => {
                tracing::debug!(?record, "ignoring unsolicited backend record");
            }
        }
    }
}

/// A backend-reported fault: diagnostic output, a fault event, and a
/// stop for exception. Never terminates the session by itself.
async fn fault(
    state: &Mutex<SessionState>,
    events: &mpsc::UnboundedSender<SessionEvent>,
    message: String,
) {
    let _ = events.send(SessionEvent::Output {
        category: OutputCategory::Stderr,
        output: message.clone(),
    });
    let _ = events.send(SessionEvent::Fault { message });
    stop(state, events, StopReason::Exception).await;
}

async fn set_state(state: &Mutex<SessionState>, next: SessionState) {
    let mut state = state.lock().await;
    if *state == SessionState::Terminated {
        return;
    }
    tracing::trace!(from = ?*state, to = ?next, "session transition");
    *state = next;
}

async fn stop(
    state: &Mutex<SessionState>,
    events: &mpsc::UnboundedSender<SessionEvent>,
    reason: StopReason,
) {
    let mut state = state.lock().await;
    if *state == SessionState::Terminated {
        return;
    }
    *state = SessionState::Stopped(reason);
    let _ = events.send(SessionEvent::Stopped { reason });
}

async fn terminate(
    state: &Mutex<SessionState>,
    events: &mpsc::UnboundedSender<SessionEvent>,
    exit_code: Option<i64>,
) {
    let mut state = state.lock().await;
    if *state == SessionState::Terminated {
        return;
    }
    *state = SessionState::Terminated;
    let _ = events.send(SessionEvent::Terminated { exit_code });
}
