//! Backend process lifecycle.
//!
//! Spawns the debugger executable with arguments derived from the launch
//! configuration, wires its standard streams into a [`BackendClient`],
//! and guarantees the child is killed on every exit path.

use std::process::Stdio;
use std::sync::Arc;

use launch_configuration::SbpfLaunch;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::BackendClient;
use crate::error::ClientError;
use crate::event::BackendEvent;

/// Executable looked up on `PATH` when the launch configuration does not
/// pin a debugger path.
pub const BACKEND_PROGRAM: &str = "sbpf-debugger";

/// A running backend process and its connected client.
///
/// Dropping the handle cancels the process monitor, which kills the
/// child. `kill_on_drop` on the child is the fallback if the monitor
/// task itself is gone.
pub struct Backend {
    client: Arc<BackendClient>,
    cancel: CancellationToken,
}

impl Backend {
    /// Spawn the backend described by the launch configuration and
    /// connect a client over its standard streams.
    pub fn spawn(
        config: &SbpfLaunch,
    ) -> Result<(Self, mpsc::UnboundedReceiver<BackendEvent>), ClientError> {
        let executable = match &config.debugger_path {
            Some(path) => path.clone(),
            None => which::which(BACKEND_PROGRAM).map_err(ClientError::BackendNotFound)?,
        };
        let args = derive_args(config);
        tracing::debug!(executable = %executable.display(), ?args, "spawning backend");

        let mut child = Command::new(&executable)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ClientError::Spawn)?;

        let stdin = child
            .stdin
            .take()
            .ok_or(ClientError::StreamUnavailable("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(ClientError::StreamUnavailable("stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or(ClientError::StreamUnavailable("stderr"))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let client = BackendClient::connect(
            Box::new(stdout),
            Box::new(stdin),
            event_tx.clone(),
            cancel.child_token(),
        );

        tokio::spawn(forward_stderr(stderr, event_tx.clone()));
        tokio::spawn(monitor(child, event_tx, cancel.clone()));

        Ok((Self { client, cancel }, event_rx))
    }

    pub fn client(&self) -> Arc<BackendClient> {
        Arc::clone(&self.client)
    }

    /// Kill the backend process and stop the associated tasks.
    pub fn terminate(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// stderr is always informational output, never protocol data.
async fn forward_stderr(stderr: ChildStderr, events: mpsc::UnboundedSender<BackendEvent>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let _ = events.send(BackendEvent::Stderr(line));
    }
}

async fn monitor(mut child: Child, events: mpsc::UnboundedSender<BackendEvent>, cancel: CancellationToken) {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => {
                tracing::debug!(code = ?status.code(), "backend process exited");
                let _ = events.send(BackendEvent::ProcessExited { code: status.code() });
            }
            Err(e) => tracing::warn!(error = %e, "waiting for backend process"),
        },
        _ = cancel.cancelled() => {
            tracing::debug!("killing backend process");
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "killing backend process");
            }
        }
    }
}

fn derive_args(config: &SbpfLaunch) -> Vec<String> {
    let mut args = vec!["--file".to_string(), config.program.display().to_string()];
    if let Some(debug_info) = &config.debug_info {
        args.push("--debug-info".to_string());
        args.push(debug_info.display().to_string());
    }
    args.push("--input".to_string());
    args.push(config.input.clone());
    if let Some(heap_size) = config.heap_size {
        args.push("--heap".to_string());
        args.push(heap_size.to_string());
    }
    args.push("--max-ixs".to_string());
    args.push(config.max_instructions.to_string());
    args.push("--adapter".to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_args_defaults() {
        let config = SbpfLaunch::from_program("/tmp/counter.s");
        let args = derive_args(&config);
        assert_eq!(
            args,
            vec![
                "--file",
                "/tmp/counter.s",
                "--input",
                "0",
                "--max-ixs",
                "10000",
                "--adapter",
            ]
        );
    }

    #[test]
    fn derive_args_full() {
        let mut config = SbpfLaunch::from_program("/tmp/counter.s");
        config.debug_info = Some("/tmp/counter.debug".into());
        config.input = "1,0,0,0".to_string();
        config.heap_size = Some(4096);
        config.max_instructions = 500;

        let args = derive_args(&config);
        assert_eq!(
            args,
            vec![
                "--file",
                "/tmp/counter.s",
                "--debug-info",
                "/tmp/counter.debug",
                "--input",
                "1,0,0,0",
                "--heap",
                "4096",
                "--max-ixs",
                "500",
                "--adapter",
            ]
        );
    }
}
