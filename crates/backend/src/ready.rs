//! Readiness gate for breakpoint mutations.
//!
//! The backend only services commands once it has assembled the program,
//! so breakpoint mutations issued during startup must not race it. The
//! gate starts shut; operations admitted while shut are queued and
//! replayed strictly in submission order when the readiness probe
//! succeeds. The gate flips open only once the queue has drained, so a
//! late submission can never overtake a queued one. Once open, it admits
//! everything directly; the queue is never reused.

use serde_json::Value;
use tokio::sync::{Mutex, oneshot};

use crate::error::ClientError;

/// A deferred command waiting for the gate to open. Dropping it drops
/// the reply sender, which the caller observes as a session-ended error.
pub(crate) struct QueuedOp {
    pub(crate) command: &'static str,
    pub(crate) args: Option<Value>,
    pub(crate) reply: oneshot::Sender<Result<Value, ClientError>>,
}

/// How the gate routed an operation.
pub(crate) enum Admission {
    /// The gate is open; the caller runs the command itself.
    Immediate(Option<Value>),
    /// The command was queued; the receiver resolves when it runs.
    Deferred(oneshot::Receiver<Result<Value, ClientError>>),
    /// The gate closed before opening; the command will never run.
    Rejected,
}

enum GateState {
    Waiting(Vec<QueuedOp>),
    Open,
    Closed,
}

pub(crate) struct ReadyGate {
    state: Mutex<GateState>,
}

impl ReadyGate {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Waiting(Vec::new())),
        }
    }

    /// Admit a readiness-sensitive command, queueing it when the gate is
    /// not yet open.
    pub(crate) async fn admit(&self, command: &'static str, args: Option<Value>) -> Admission {
        let mut state = self.state.lock().await;
        match &mut *state {
            GateState::Open => Admission::Immediate(args),
            GateState::Closed => Admission::Rejected,
            GateState::Waiting(queue) => {
                let (tx, rx) = oneshot::channel();
                queue.push(QueuedOp {
                    command,
                    args,
                    reply: tx,
                });
                Admission::Deferred(rx)
            }
        }
    }

    /// Pop the next queued command, or flip the gate open when the
    /// queue is empty. The drain loop calls this until it returns
    /// `None`; commands admitted mid-drain land at the back of the
    /// queue and keep their relative order.
    pub(crate) async fn take_next_queued(&self) -> Option<QueuedOp> {
        let mut state = self.state.lock().await;
        match &mut *state {
            GateState::Waiting(queue) => {
                if queue.is_empty() {
                    *state = GateState::Open;
                    None
                } else {
                    Some(queue.remove(0))
                }
            }
            GateState::Open | GateState::Closed => None,
        }
    }

    /// Close the gate, dropping queued commands.
    pub(crate) async fn close(&self) {
        let mut state = self.state.lock().await;
        if let GateState::Waiting(queue) = &mut *state {
            let dropped = queue.len();
            if dropped > 0 {
                tracing::debug!(dropped, "discarding commands queued behind readiness gate");
            }
        }
        *state = GateState::Closed;
    }
}
