//! In-memory backend doubles for tests.
//!
//! [`MockWire`] plays the backend's side of the transport over
//! `tokio::io::duplex` pairs, so client and session behavior can be
//! tested without spawning a process.

use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::task::JoinHandle;
use transport::{RequestId, Response};

use crate::client::{BoxedReader, BoxedWriter};

/// A command as observed by the mock backend.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceivedCommand {
    pub command: String,
    #[serde(default)]
    pub args: Option<Value>,
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
}

/// One scripted reply for [`MockWire::serve`].
pub enum Reply {
    /// Successful response to the triggering command.
    Ok(Value),
    /// Failed response to the triggering command.
    Fail(String),
    /// A fully specified record, for out-of-band traffic.
    Record(Response),
    /// A raw output line (markers, malformed text).
    Line(String),
}

/// The backend's side of an in-memory transport pair.
pub struct MockWire {
    commands: Lines<BufReader<DuplexStream>>,
    output: DuplexStream,
}

impl MockWire {
    /// Create a wire pair: the mock side plus boxed transport halves for
    /// [`BackendClient::connect`](crate::BackendClient::connect).
    pub fn new() -> (Self, BoxedReader, BoxedWriter) {
        let (client_read, mock_write) = tokio::io::duplex(64 * 1024);
        let (mock_read, client_write) = tokio::io::duplex(64 * 1024);
        let wire = Self {
            commands: BufReader::new(mock_read).lines(),
            output: mock_write,
        };
        (wire, Box::new(client_read), Box::new(client_write))
    }

    /// Read the next command sent by the client. Panics at end of stream.
    pub async fn recv_command(&mut self) -> ReceivedCommand {
        loop {
            let line = self
                .commands
                .next_line()
                .await
                .expect("reading command line")
                .expect("command stream closed");
            if line.trim().is_empty() {
                continue;
            }
            return serde_json::from_str(&line).expect("malformed command");
        }
    }

    /// Send a structured record to the client.
    pub async fn send(&mut self, record: &Response) {
        let bytes = transport::testing::raw_line(record);
        self.output.write_all(&bytes).await.expect("writing record");
    }

    /// Send a raw line (marker output or malformed text).
    pub async fn send_raw(&mut self, line: &str) {
        self.output
            .write_all(line.as_bytes())
            .await
            .expect("writing line");
        self.output.write_all(b"\n").await.expect("writing newline");
    }

    /// Answer the client's readiness probe with an empty debug-info
    /// summary, returning the probe command.
    pub async fn accept_probe(&mut self) -> ReceivedCommand {
        let probe = self.recv_command().await;
        assert_eq!(probe.command, "getDebugInfo");
        let reply = transport::testing::ok_response(probe.request_id, serde_json::json!({}));
        self.send(&reply).await;
        probe
    }

    /// Drive the wire from a script, replying to each incoming command
    /// in turn. The live command log is shared through the returned
    /// handle's companion `Arc`.
    pub fn serve<F>(mut self, mut script: F) -> (JoinHandle<()>, Arc<Mutex<Vec<ReceivedCommand>>>)
    where
        F: FnMut(&ReceivedCommand) -> Vec<Reply> + Send + 'static,
    {
        let log = Arc::new(Mutex::new(Vec::new()));
        let task_log = Arc::clone(&log);
        let handle = tokio::spawn(async move {
            loop {
                let Ok(Some(line)) = self.commands.next_line().await else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let Ok(command) = serde_json::from_str::<ReceivedCommand>(&line) else {
                    continue;
                };
                task_log.lock().expect("command log").push(command.clone());
                for reply in script(&command) {
                    let record = match reply {
                        Reply::Ok(data) => {
                            transport::testing::ok_response(command.request_id, data)
                        }
                        Reply::Fail(message) => {
                            transport::testing::err_response(command.request_id, message)
                        }
                        Reply::Record(record) => record,
                        Reply::Line(text) => {
                            if self.output.write_all(text.as_bytes()).await.is_err() {
                                return;
                            }
                            let _ = self.output.write_all(b"\n").await;
                            continue;
                        }
                    };
                    let bytes = transport::testing::raw_line(&record);
                    if self.output.write_all(&bytes).await.is_err() {
                        return;
                    }
                }
            }
        });
        (handle, log)
    }
}
