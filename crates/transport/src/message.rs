//! Wire types for the backend protocol.
//!
//! Outgoing traffic is a stream of [`Command`]s; incoming traffic is a
//! stream of [`Line`]s, each either plain text output or a structured
//! [`Response`] record.

use serde::{Deserialize, Serialize};

/// Identifier used to correlate a command with its response.
///
/// Allocated once per outbound command, unique and monotonically
/// increasing within a session. Responses echo it back; records without
/// one are unsolicited events.
pub type RequestId = i64;

/// Marker prefix for debuggee log lines. These bypass JSON parsing.
pub const LOG_MARKER: &str = "Program log:";

/// Marker prefix for backend diagnostic lines. These bypass JSON parsing.
pub const ERROR_MARKER: &str = "error:";

/// An outbound command for the backend.
#[derive(Debug, Clone, Serialize)]
pub struct Command {
    /// The command name (e.g. `continue`, `setBreakpoint`).
    pub command: String,
    /// Positional arguments, command-specific. Omitted when empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
    /// Correlation identifier echoed back in the response.
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
}

impl Command {
    pub fn new(
        command: impl Into<String>,
        args: Option<serde_json::Value>,
        request_id: RequestId,
    ) -> Self {
        Self {
            command: command.into(),
            args,
            request_id,
        }
    }
}

/// A structured record from the backend.
///
/// Records carrying a `requestId` answer a previously sent [`Command`];
/// records without one are unsolicited events. The `data` payload may
/// additionally carry a secondary event tag (`"type": "exit"` or
/// `"type": "error"`) which upstream treats as out-of-band regardless of
/// correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Whether the backend considers the command to have succeeded.
    pub success: bool,
    /// Command-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Failure reason when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Identifier of the command this record answers, if any.
    #[serde(
        rename = "requestId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub request_id: Option<RequestId>,
}

impl Response {
    /// The secondary event tag of the payload (`data.type`), if present.
    pub fn payload_tag(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.get("type"))
            .and_then(serde_json::Value::as_str)
    }
}

/// A classified line from the backend's output stream.
///
/// Classification precedes correlation and follows a strict priority:
/// log marker, then error marker, then structured parsing. A line that
/// fails structured parsing is not dropped; it is surfaced as
/// [`Line::Malformed`] so upstream can raise a protocol diagnostic.
#[derive(Debug, Clone)]
pub enum Line {
    /// Debuggee output (`Program log:` prefix). Forwarded verbatim.
    Log(String),
    /// Backend diagnostic (`error:` prefix). The marker is stripped.
    Diagnostic(String),
    /// A structured protocol record.
    Record(Response),
    /// A line that is neither marked nor valid JSON.
    Malformed { raw: String, reason: String },
}

impl Line {
    /// Classify one framed line.
    pub fn classify(raw: &str) -> Self {
        if raw.starts_with(LOG_MARKER) {
            return Line::Log(raw.to_string());
        }
        if let Some(rest) = raw.strip_prefix(ERROR_MARKER) {
            return Line::Diagnostic(rest.trim().to_string());
        }
        match serde_json::from_str::<Response>(raw) {
            Ok(record) => Line::Record(record),
            Err(e) => Line::Malformed {
                raw: raw.to_string(),
                reason: e.to_string(),
            },
        }
    }
}
