use transport::CodecError;

/// Errors surfaced by the backend client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A command was issued while no backend process is connected. Raised
    /// before a request identifier is allocated.
    #[error("no backend process is running")]
    NoProcess,

    /// The backend executable could not be found on `PATH`.
    #[error("backend executable not found")]
    BackendNotFound(#[source] which::Error),

    /// The backend process failed to start.
    #[error("failed to spawn backend process")]
    Spawn(#[source] std::io::Error),

    /// A standard stream of the spawned process was not available.
    #[error("backend process {0} stream unavailable")]
    StreamUnavailable(&'static str),

    /// Writing a command to the backend failed.
    #[error("sending command to backend")]
    Send(#[from] CodecError),

    /// The session ended before the request completed. Every pending
    /// request is rejected with this when the transport closes.
    #[error("backend session ended before the request completed")]
    SessionEnded,

    /// The backend answered the request with a failure.
    #[error("backend reported failure: {0}")]
    Backend(String),

    /// The backend answered with a payload that did not match the
    /// expected shape for the command.
    #[error("unexpected response payload")]
    Payload(#[source] serde_json::Error),
}
