//! The backend client: request correlation, line dispatch, readiness.
//!
//! One [`BackendClient`] owns the write half of the backend's transport
//! and runs a reader task over the read half. Callers issue commands
//! through the typed methods; each command is assigned a request
//! identifier from a per-client counter and parked in a pending map
//! until the matching response arrives. Lines that are not correlated
//! responses flow out of the event channel instead.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use transport::{BackendReader, BackendWriter, Command, Line, RequestId, Response};

use crate::error::ClientError;
use crate::event::BackendEvent;
use crate::ready::{Admission, ReadyGate};
use crate::types::{
    ComputeUnits, DebugInfoSummary, MemoryRegion, Register, RodataEntry, SetBreakpointOutcome,
    SetRegisterAck, StackFrame,
};

/// Read half of the backend transport.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin + 'static>;
/// Write half of the backend transport.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin + 'static>;

/// How many times the readiness probe is retried after an error reply.
const PROBE_ATTEMPTS: u32 = 10;
const PROBE_RETRY_DELAY: Duration = Duration::from_millis(50);

type PendingReply = oneshot::Sender<Result<Value, ClientError>>;

/// Async client for one backend process.
///
/// Create with [`BackendClient::connect`]; the constructor spawns the
/// reader task and the readiness probe. All methods take `&self`, so the
/// client is shared behind an [`Arc`].
pub struct BackendClient {
    writer: Mutex<BackendWriter<BoxedWriter>>,
    /// Identifier source, scoped to this client. Monotonically
    /// increasing, never reused within the session.
    next_request_id: AtomicI64,
    pending: Mutex<HashMap<RequestId, PendingReply>>,
    connected: AtomicBool,
    events: mpsc::UnboundedSender<BackendEvent>,
    gate: ReadyGate,
    debug_info: Mutex<Option<DebugInfoSummary>>,
    cancel: CancellationToken,
}

impl BackendClient {
    /// Connect a client over the given transport halves.
    ///
    /// Spawns the reader task and a readiness probe that repeatedly
    /// issues `getDebugInfo` until the backend answers successfully;
    /// that first success opens the readiness gate and caches the
    /// debug-info summary.
    pub fn connect(
        reader: BoxedReader,
        writer: BoxedWriter,
        events: mpsc::UnboundedSender<BackendEvent>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let client = Arc::new(Self {
            writer: Mutex::new(BackendWriter::new(writer)),
            next_request_id: AtomicI64::new(0),
            pending: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(true),
            events,
            gate: ReadyGate::new(),
            debug_info: Mutex::new(None),
            cancel,
        });
        tokio::spawn(Self::read_loop(
            Arc::clone(&client),
            BackendReader::new(reader),
        ));
        tokio::spawn(Self::readiness_probe(Arc::clone(&client)));
        client
    }

    /// Whether the transport is still live.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// The debug-info summary cached at readiness, if available yet.
    pub async fn debug_info(&self) -> Option<DebugInfoSummary> {
        self.debug_info.lock().await.clone()
    }

    /// Send a command and await its correlated response payload.
    ///
    /// Fails with [`ClientError::NoProcess`] before allocating an
    /// identifier when the transport is down. The pending entry is
    /// registered before the bytes leave, so a response can never beat
    /// its waiter.
    pub async fn request(
        &self,
        command: impl Into<String>,
        args: Option<Value>,
    ) -> Result<Value, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NoProcess);
        }
        let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id, tx);

        let command = Command::new(command, args, request_id);
        tracing::trace!(?command, "sending command");
        let sent = { self.writer.lock().await.send(command).await };
        if let Err(e) = sent {
            self.pending.lock().await.remove(&request_id);
            return Err(e.into());
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::SessionEnded),
        }
    }

    /// Run a readiness-sensitive command: directly when the gate is
    /// open, queued behind it otherwise. Queued commands replay in
    /// submission order and resolve the original caller.
    async fn ready_request(
        &self,
        command: &'static str,
        args: Option<Value>,
    ) -> Result<Value, ClientError> {
        match self.gate.admit(command, args).await {
            Admission::Immediate(args) => self.request(command, args).await,
            Admission::Deferred(rx) => rx.await.unwrap_or(Err(ClientError::SessionEnded)),
            Admission::Rejected => Err(ClientError::SessionEnded),
        }
    }

    /// Replay queued readiness-sensitive commands in submission order,
    /// then leave the gate open. Commands admitted while the replay is
    /// still running join the back of the queue.
    async fn open_gate(&self) {
        while let Some(op) = self.gate.take_next_queued().await {
            let result = self.request(op.command, op.args).await;
            let _ = op.reply.send(result);
        }
    }

    // Typed command surface.

    /// Resume execution. The response arrives when the program next
    /// stops, so this await can span the whole run.
    pub async fn continue_execution(&self) -> Result<Value, ClientError> {
        self.request("continue", None).await
    }

    /// Execute a single instruction.
    pub async fn step(&self) -> Result<Value, ClientError> {
        self.request("step", None).await
    }

    /// Set one breakpoint. Readiness-sensitive.
    pub async fn set_breakpoint(
        &self,
        file: &str,
        line: u64,
    ) -> Result<SetBreakpointOutcome, ClientError> {
        let payload = self
            .ready_request("setBreakpoint", Some(json!([file, line])))
            .await?;
        parse(payload)
    }

    /// Remove every breakpoint in a file. Readiness-sensitive.
    pub async fn clear_breakpoints(&self, file: &str) -> Result<(), ClientError> {
        self.ready_request("clearBreakpoints", Some(json!([file])))
            .await?;
        Ok(())
    }

    pub async fn get_stack_frames(&self) -> Result<Vec<StackFrame>, ClientError> {
        #[derive(serde::Deserialize)]
        struct Payload {
            frames: Vec<StackFrame>,
        }
        let payload: Payload = parse(self.request("getStackFrames", None).await?)?;
        Ok(payload.frames)
    }

    pub async fn get_registers(&self) -> Result<Vec<Register>, ClientError> {
        #[derive(serde::Deserialize)]
        struct Payload {
            registers: Vec<Register>,
        }
        let payload: Payload = parse(self.request("getRegisters", None).await?)?;
        Ok(payload.registers)
    }

    pub async fn get_rodata(&self) -> Result<Vec<RodataEntry>, ClientError> {
        #[derive(serde::Deserialize)]
        struct Payload {
            rodata: Vec<RodataEntry>,
        }
        let payload: Payload = parse(self.request("getRodata", None).await?)?;
        Ok(payload.rodata)
    }

    /// Read a raw memory region from the debuggee's address space.
    pub async fn get_memory(&self, address: u64, size: u64) -> Result<MemoryRegion, ClientError> {
        parse(
            self.request("getMemory", Some(json!([address, size])))
                .await?,
        )
    }

    /// Write a general-purpose register. The acknowledgement echoes the
    /// applied value.
    pub async fn set_register(&self, index: u64, value: u64) -> Result<SetRegisterAck, ClientError> {
        parse(
            self.request("setRegister", Some(json!([index, value])))
                .await?,
        )
    }

    pub async fn get_debug_info(&self) -> Result<DebugInfoSummary, ClientError> {
        parse(self.request("getDebugInfo", None).await?)
    }

    pub async fn get_compute_units(&self) -> Result<ComputeUnits, ClientError> {
        parse(self.request("getComputeUnits", None).await?)
    }

    /// Ask the backend to exit. The backend may answer with an exit
    /// record or not at all; callers should bound the wait.
    pub async fn quit(&self) -> Result<(), ClientError> {
        self.request("quit", None).await?;
        Ok(())
    }

    async fn read_loop(self: Arc<Self>, mut reader: BackendReader<BoxedReader>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                line = reader.next() => match line {
                    Some(Ok(line)) => self.dispatch(line).await,
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "reading backend stream");
                        break;
                    }
                    None => {
                        tracing::debug!("backend stream closed");
                        break;
                    }
                },
            }
        }
        self.shutdown().await;
    }

    async fn dispatch(&self, line: Line) {
        match line {
            Line::Log(text) => {
                let _ = self.events.send(BackendEvent::Output(text));
            }
            Line::Diagnostic(message) => {
                let _ = self.events.send(BackendEvent::Diagnostic(message));
            }
            Line::Malformed { raw, reason } => {
                tracing::warn!(%raw, %reason, "unparseable backend line");
                let _ = self.events.send(BackendEvent::Protocol { raw, reason });
            }
            Line::Record(record) => self.dispatch_record(record).await,
        }
    }

    /// Route one structured record. Exit and error payload tags take
    /// precedence over plain correlation; everything else resolves its
    /// waiter if one exists and is republished as an event otherwise.
    async fn dispatch_record(&self, record: Response) {
        let tag = record.payload_tag().map(str::to_string);
        match tag.as_deref() {
            Some("exit") => return self.handle_exit(record).await,
            Some("error") => return self.handle_error(record).await,
            _ => {}
        }

        if let Some(request_id) = record.request_id {
            let waiter = self.pending.lock().await.remove(&request_id);
            if let Some(tx) = waiter {
                let result = if record.success {
                    Ok(record.data.unwrap_or(Value::Null))
                } else {
                    Err(ClientError::Backend(unspecified(record.error)))
                };
                let _ = tx.send(result);
                return;
            }
            tracing::debug!(request_id, "response for unknown request");
        }

        if !record.success {
            let _ = self.events.send(BackendEvent::Fault(unspecified(record.error)));
            return;
        }
        if tag.as_deref() == Some("entry") {
            let data = record.data.as_ref();
            let pc = data.and_then(|d| d.get("pc")).and_then(Value::as_u64);
            let line = data.and_then(|d| d.get("line")).and_then(Value::as_u64);
            let _ = self.events.send(BackendEvent::Entry { pc, line });
            return;
        }
        let _ = self.events.send(BackendEvent::Unsolicited(record));
    }

    /// The debuggee finished. Terminal for the protocol: reject every
    /// pending request, then publish the exit.
    async fn handle_exit(&self, record: Response) {
        let data = record.data.unwrap_or(Value::Null);
        let code = data.get("code").and_then(Value::as_i64).unwrap_or(0);
        let compute_units = data
            .get("compute_units")
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        tracing::debug!(code, "backend reported program exit");
        self.shutdown().await;
        let _ = self.events.send(BackendEvent::Exited {
            code,
            compute_units,
        });
    }

    /// A fault record. When tied to a pending request it rejects only
    /// that waiter; otherwise it is broadcast as a session fault. The
    /// session continues either way.
    async fn handle_error(&self, record: Response) {
        let message = record
            .data
            .as_ref()
            .and_then(|d| d.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(record.error)
            .unwrap_or_else(|| "unspecified backend error".to_string());
        if let Some(request_id) = record.request_id {
            if let Some(tx) = self.pending.lock().await.remove(&request_id) {
                let _ = tx.send(Err(ClientError::Backend(message)));
                return;
            }
        }
        let _ = self.events.send(BackendEvent::Fault(message));
    }

    /// Tear down correlation state. After this, every pending waiter has
    /// been rejected and new commands fail fast; the pending map and the
    /// readiness queue are both empty.
    async fn shutdown(&self) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        self.gate.close().await;
        let pending = std::mem::take(&mut *self.pending.lock().await);
        if !pending.is_empty() {
            tracing::debug!(
                count = pending.len(),
                "rejecting requests pending at shutdown"
            );
        }
        // Dropping the reply senders rejects every waiter.
        drop(pending);
    }

    async fn readiness_probe(self: Arc<Self>) {
        for attempt in 1..=PROBE_ATTEMPTS {
            match self.request("getDebugInfo", None).await {
                Ok(payload) => {
                    let summary = serde_json::from_value(payload).unwrap_or_default();
                    *self.debug_info.lock().await = Some(summary);
                    tracing::debug!(attempt, "backend ready");
                    self.open_gate().await;
                    return;
                }
                Err(ClientError::NoProcess | ClientError::SessionEnded) => return,
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "readiness probe unanswered");
                    tokio::time::sleep(PROBE_RETRY_DELAY).await;
                }
            }
        }
        // The backend answered probes, just never successfully; it is
        // alive, so stop holding operations back.
        tracing::warn!("readiness probe never succeeded, opening gate");
        self.open_gate().await;
    }
}

fn parse<T: DeserializeOwned>(payload: Value) -> Result<T, ClientError> {
    serde_json::from_value(payload).map_err(ClientError::Payload)
}

fn unspecified(error: Option<String>) -> String {
    error.unwrap_or_else(|| "unspecified backend failure".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockWire;
    use transport::testing::ok_response;

    fn connect(
        reader: BoxedReader,
        writer: BoxedWriter,
    ) -> (Arc<BackendClient>, mpsc::UnboundedReceiver<BackendEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let client = BackendClient::connect(reader, writer, events, CancellationToken::new());
        (client, event_rx)
    }

    #[tokio::test]
    async fn concurrent_requests_resolve_to_their_callers() {
        let (mut wire, reader, writer) = MockWire::new();
        let (client, _events) = connect(reader, writer);
        wire.accept_probe().await;

        // Reply in reverse arrival order; correlation must still route
        // each payload to its caller.
        let driver = tokio::spawn(async move {
            let mut received = Vec::new();
            for _ in 0..3 {
                received.push(wire.recv_command().await);
            }
            for command in received.iter().rev() {
                let reply = ok_response(command.request_id, json!({"echo": command.command}));
                wire.send(&reply).await;
            }
            wire
        });

        let (a, b, c) = tokio::join!(
            client.request("getRegisters", None),
            client.request("getRodata", None),
            client.request("getComputeUnits", None),
        );
        driver.await.unwrap();

        assert_eq!(a.unwrap()["echo"], "getRegisters");
        assert_eq!(b.unwrap()["echo"], "getRodata");
        assert_eq!(c.unwrap()["echo"], "getComputeUnits");
    }

    #[tokio::test]
    async fn request_identifiers_are_unique_and_increasing() {
        let (mut wire, reader, writer) = MockWire::new();
        let (client, _events) = connect(reader, writer);
        let probe = wire.accept_probe().await;

        let task = tokio::spawn(async move {
            let mut ids = Vec::new();
            for _ in 0..3 {
                let command = wire.recv_command().await;
                ids.push(command.request_id);
                wire.send(&ok_response(command.request_id, json!({}))).await;
            }
            ids
        });
        for _ in 0..3 {
            client.request("step", None).await.unwrap();
        }
        let ids = task.await.unwrap();
        assert!(ids[0] > probe.request_id);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn requests_fail_fast_after_stream_closes() {
        let (wire, reader, writer) = MockWire::new();
        let (client, _events) = connect(reader, writer);

        drop(wire);
        // Let the read loop observe end-of-stream.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = client.request("step", None).await.unwrap_err();
        assert!(matches!(err, ClientError::NoProcess));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn exit_record_rejects_pending_and_publishes_event() {
        let (mut wire, reader, writer) = MockWire::new();
        let (client, mut events) = connect(reader, writer);
        wire.accept_probe().await;

        let in_flight = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.continue_execution().await }
        });
        let command = wire.recv_command().await;
        assert_eq!(command.command, "continue");

        wire.send(&Response {
            success: true,
            data: Some(json!({
                "type": "exit",
                "code": 3,
                "compute_units": {"total": 200_000, "used": 1_200, "remaining": 198_800},
            })),
            error: None,
            request_id: None,
        })
        .await;

        let result = in_flight.await.unwrap();
        assert!(matches!(result, Err(ClientError::SessionEnded)));

        match events.recv().await.unwrap() {
            BackendEvent::Exited {
                code,
                compute_units,
            } => {
                assert_eq!(code, 3);
                assert_eq!(compute_units.unwrap().used, 1_200);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_record_rejects_only_its_waiter() {
        let (mut wire, reader, writer) = MockWire::new();
        let (client, mut events) = connect(reader, writer);
        wire.accept_probe().await;

        let in_flight = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.step().await }
        });
        let command = wire.recv_command().await;

        wire.send(&Response {
            success: false,
            data: Some(json!({"type": "error", "message": "invalid memory access"})),
            error: None,
            request_id: Some(command.request_id),
        })
        .await;

        let err = in_flight.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::Backend(m) if m == "invalid memory access"));
        // Tied to a waiter, so no broadcast fault.
        assert!(events.try_recv().is_err());
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn untied_error_record_broadcasts_a_fault() {
        let (mut wire, reader, writer) = MockWire::new();
        let (client, mut events) = connect(reader, writer);
        wire.accept_probe().await;

        wire.send(&Response {
            success: false,
            data: Some(json!({"type": "error", "message": "exceeded max instructions"})),
            error: None,
            request_id: None,
        })
        .await;

        match events.recv().await.unwrap() {
            BackendEvent::Fault(message) => assert_eq!(message, "exceeded max instructions"),
            other => panic!("unexpected event: {other:?}"),
        }
        // Faults never end the session on their own.
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn marker_and_malformed_lines_become_events() {
        let (mut wire, reader, writer) = MockWire::new();
        let (_client, mut events) = connect(reader, writer);
        wire.accept_probe().await;

        wire.send_raw("Program log: counter = 5").await;
        wire.send_raw("error: relocation failed").await;
        wire.send_raw("not a protocol line").await;

        match events.recv().await.unwrap() {
            BackendEvent::Output(text) => assert_eq!(text, "Program log: counter = 5"),
            other => panic!("unexpected event: {other:?}"),
        }
        match events.recv().await.unwrap() {
            BackendEvent::Diagnostic(message) => assert_eq!(message, "relocation failed"),
            other => panic!("unexpected event: {other:?}"),
        }
        match events.recv().await.unwrap() {
            BackendEvent::Protocol { raw, .. } => assert_eq!(raw, "not a protocol line"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn queued_breakpoint_ops_replay_in_submission_order() {
        let (mut wire, reader, writer) = MockWire::new();
        let (client, _events) = connect(reader, writer);

        // Gate is shut until the probe is answered: submit three
        // breakpoint mutations first.
        let mut handles = Vec::new();
        for line in [3u64, 7, 9] {
            let client = Arc::clone(&client);
            handles.push(tokio::spawn(
                async move { client.set_breakpoint("main.s", line).await },
            ));
            // Let each task reach the queue before the next submission.
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
        }

        // Only the probe made it to the wire so far.
        let probe = wire.recv_command().await;
        assert_eq!(probe.command, "getDebugInfo");
        wire.send(&ok_response(probe.request_id, json!({}))).await;

        for expected in [3u64, 7, 9] {
            let command = wire.recv_command().await;
            assert_eq!(command.command, "setBreakpoint");
            assert_eq!(command.args, Some(json!(["main.s", expected])));
            wire.send(&ok_response(
                command.request_id,
                json!({"type": "setBreakpoint", "line": expected, "verified": true}),
            ))
            .await;
        }

        for (handle, line) in handles.into_iter().zip([3u64, 7, 9]) {
            let outcome = handle.await.unwrap().unwrap();
            assert!(outcome.verified);
            assert_eq!(outcome.line, line);
        }
    }

    #[tokio::test]
    async fn queued_ops_rejected_when_session_ends_before_readiness() {
        let (wire, reader, writer) = MockWire::new();
        let (client, _events) = connect(reader, writer);

        let handle = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.set_breakpoint("main.s", 4).await }
        });
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        drop(wire);
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::SessionEnded));
    }

    #[tokio::test]
    async fn debug_info_cached_at_readiness() {
        let (mut wire, reader, writer) = MockWire::new();
        let (client, _events) = connect(reader, writer);

        let probe = wire.recv_command().await;
        wire.send(&ok_response(
            probe.request_id,
            json!({
                "hasDwarf": true,
                "sourceFiles": ["counter.s"],
                "functions": {"entrypoint": 0},
            }),
        ))
        .await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        let summary = client.debug_info().await.unwrap();
        assert!(summary.has_dwarf);
        assert_eq!(summary.source_files, vec!["counter.s"]);
        assert_eq!(summary.functions["entrypoint"], 0);
    }
}
