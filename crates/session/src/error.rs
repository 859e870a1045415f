use backend::ClientError;

/// Session-level error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The backend process could not be started, or its transport broke.
    /// Fails the originating operation outright.
    #[error("backend transport failure")]
    Transport(#[source] ClientError),

    /// The backend sent data that does not match the protocol. The
    /// session continues; the offending data is diagnosable.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The backend explicitly reported a failure.
    #[error("backend fault: {0}")]
    BackendFault(String),

    /// The debuggee exited with a nonzero code.
    #[error("program exited with code {0}")]
    RuntimeExit(i64),

    /// The request was rejected locally, without contacting the
    /// backend. The session remains alive.
    #[error("{0}")]
    Validation(String),
}

impl From<ClientError> for SessionError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Backend(message) => SessionError::BackendFault(message),
            ClientError::Payload(e) => SessionError::Protocol(e.to_string()),
            other => SessionError::Transport(other),
        }
    }
}
