use super::{Adapter, ChunkReceiver, ExecuteRequest, CHUNK_CAPACITY};
use crate::process::{ProcessKind, ProcessManager};
use crate::security::{sanitize_command_arg, validate_prompt};
use crate::{prompt, Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Adapter for command-line backends.
///
/// The prompt (with `@path` file references) travels in a single `-p`
/// argument slot; stdout is streamed back one line at a time.
pub struct CliAdapter {
    name: String,
    executable: String,
    process: Arc<ProcessManager>,
}

impl CliAdapter {
    pub fn new(name: String, executable: String, process: Arc<ProcessManager>) -> Self {
        Self {
            name,
            executable,
            process,
        }
    }

    fn build_prompt_arg(&self, request: &ExecuteRequest) -> Result<String> {
        let validated = validate_prompt(&request.prompt)?;

        let mut full_prompt = sanitize_command_arg(&prompt::file_references(&request.files));
        full_prompt.push_str(&sanitize_command_arg(validated));

        Ok(full_prompt)
    }

    fn spawn(&self, prompt_arg: &str) -> Result<Child> {
        debug!("Spawning {} for backend '{}'", self.executable, self.name);

        Command::new(&self.executable)
            .arg("-p")
            .arg(prompt_arg)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::unavailable(
                    &self.name,
                    format!("executable '{}' not found in PATH", self.executable),
                ),
                _ => Error::adapter(&self.name, format!("failed to spawn process: {e}")),
            })
    }
}

#[async_trait]
impl Adapter for CliAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "cli",
            "executable": self.executable,
        })
    }

    async fn execute(&self, request: ExecuteRequest) -> Result<ChunkReceiver> {
        let prompt_arg = self.build_prompt_arg(&request)?;
        let mut child = self.spawn(&prompt_arg)?;

        let pid = child
            .id()
            .ok_or_else(|| Error::adapter(&self.name, "child exited before it was tracked"))?;
        let token = self.process.register(pid, ProcessKind::Async);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::adapter(&self.name, "child stdout was not piped"))?;

        let (tx, rx) = mpsc::channel(CHUNK_CAPACITY);
        let name = self.name.clone();
        let process = Arc::clone(&self.process);
        let read_timeout = request.timeout;

        tokio::spawn(async move {
            stream_child(&name, child, stdout, tx, read_timeout).await;
            process.unregister(token);
        });

        Ok(rx)
    }

    async fn health_check(&self) -> Result<bool> {
        let child = Command::new(&self.executable)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(_) => return Ok(false),
        };

        match timeout(HEALTH_CHECK_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => Ok(status.success()),
            Ok(Err(_)) => Ok(false),
            Err(_) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                Ok(false)
            }
        }
    }
}

/// Pumps child stdout into the chunk channel line by line, then settles the
/// exit status. Any failure after output has started is delivered through
/// the channel.
async fn stream_child(
    backend: &str,
    mut child: Child,
    stdout: tokio::process::ChildStdout,
    tx: mpsc::Sender<Result<String>>,
    read_timeout: Option<Duration>,
) {
    let mut reader = BufReader::new(stdout);
    let mut buffer = Vec::new();

    loop {
        buffer.clear();
        let read = match read_timeout {
            Some(limit) => match timeout(limit, reader.read_until(b'\n', &mut buffer)).await {
                Ok(read) => read,
                Err(_) => {
                    warn!("Read from '{}' timed out, killing child", backend);
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    let _ = tx
                        .send(Err(Error::timeout(backend, limit.as_secs())))
                        .await;
                    return;
                }
            },
            None => reader.read_until(b'\n', &mut buffer).await,
        };

        match read {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buffer).to_string();
                if tx.send(Ok(line)).await.is_err() {
                    // Consumer abandoned the stream; release the child
                    debug!("Consumer gone, killing '{}' child", backend);
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    return;
                }
            }
            Err(e) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                let _ = tx
                    .send(Err(Error::adapter(backend, format!("read error: {e}"))))
                    .await;
                return;
            }
        }
    }

    let status = match child.wait().await {
        Ok(status) => status,
        Err(e) => {
            let _ = tx
                .send(Err(Error::adapter(backend, format!("wait failed: {e}"))))
                .await;
            return;
        }
    };

    if !status.success() {
        let mut stderr_text = String::new();
        if let Some(mut stderr) = child.stderr.take() {
            let _ = stderr.read_to_string(&mut stderr_text).await;
        }
        let code = status.code().unwrap_or(-1);
        let _ = tx
            .send(Err(Error::adapter(
                backend,
                format!("command failed with exit code {}: {}", code, stderr_text.trim()),
            )))
            .await;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn adapter(executable: &str) -> CliAdapter {
        CliAdapter::new(
            "test_cli".to_string(),
            executable.to_string(),
            Arc::new(ProcessManager::new()),
        )
    }

    /// Writes an executable script that ignores its arguments, sleeps, and
    /// optionally prints. The `-p <prompt>` convention means coreutils
    /// can't stand in for a slow backend.
    fn script(dir: &tempfile::TempDir, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("backend.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path.to_str().unwrap().to_string()
    }

    async fn collect(mut rx: ChunkReceiver) -> Result<String> {
        let mut text = String::new();
        while let Some(chunk) = rx.recv().await {
            text.push_str(&chunk?);
        }
        Ok(text)
    }

    #[tokio::test]
    async fn test_execute_streams_stdout() {
        let adapter = adapter("echo");
        let rx = adapter
            .execute(ExecuteRequest::new("hello world"))
            .await
            .unwrap();

        let output = collect(rx).await.unwrap();
        // echo prints its arguments: "-p" slot then the prompt
        assert!(output.contains("hello world"));
    }

    #[tokio::test]
    async fn test_execute_missing_executable_is_unavailable() {
        let adapter = adapter("definitely_not_a_real_binary_xyz");
        let err = adapter
            .execute(ExecuteRequest::new("hello"))
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_execute_rejects_dangerous_prompt() {
        let adapter = adapter("echo");
        let err = adapter
            .execute(ExecuteRequest::new("analyze; rm -rf /"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_adapter_error() {
        let adapter = adapter("false");
        let rx = adapter.execute(ExecuteRequest::new("ignored")).await.unwrap();
        let err = collect(rx).await.unwrap_err();
        match err {
            Error::Adapter { message, .. } => assert!(message.contains("exit code")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_read_timeout_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter(&script(&dir, "sleep 5"));

        let request = ExecuteRequest::new("blocked").with_timeout(Some(Duration::from_millis(100)));
        let rx = adapter.execute(request).await.unwrap();
        let err = collect(rx).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_process_registered_during_execution() {
        let dir = tempfile::tempdir().unwrap();
        let process = Arc::new(ProcessManager::new());
        let adapter = CliAdapter::new(
            "test_cli".to_string(),
            script(&dir, "sleep 0.3\necho done"),
            Arc::clone(&process),
        );

        let rx = adapter.execute(ExecuteRequest::new("go")).await.unwrap();
        assert_eq!(process.live_count(), 1);

        let output = collect(rx).await.unwrap();
        assert!(output.contains("done"));
        // Give the producer task a beat to unregister
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(process.live_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_line_flushed_at_eof() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter(&script(&dir, "printf 'no trailing newline'"));

        let rx = adapter.execute(ExecuteRequest::new("go")).await.unwrap();
        let output = collect(rx).await.unwrap();
        assert_eq!(output, "no trailing newline");
    }

    #[tokio::test]
    async fn test_stderr_captured_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter(&script(&dir, "echo boom >&2\nexit 3"));

        let rx = adapter.execute(ExecuteRequest::new("go")).await.unwrap();
        let err = collect(rx).await.unwrap_err();
        match err {
            Error::Adapter { message, retryable, .. } => {
                assert!(message.contains("exit code 3"));
                assert!(message.contains("boom"));
                assert!(retryable);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_health_check_healthy_tool() {
        // `true` exits 0 regardless of arguments
        let adapter = adapter("true");
        assert!(adapter.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_health_check_missing_tool() {
        let adapter = adapter("definitely_not_a_real_binary_xyz");
        assert!(!adapter.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_health_check_failing_tool() {
        let adapter = adapter("false");
        assert!(!adapter.health_check().await.unwrap());
    }

    #[test]
    fn test_build_prompt_arg_includes_file_refs() {
        let adapter = adapter("echo");
        let request = ExecuteRequest::new("review this")
            .with_files(vec![std::path::PathBuf::from("/tmp/a.rs")]);

        let arg = adapter.build_prompt_arg(&request).unwrap();
        assert_eq!(arg, "@/tmp/a.rs review this");
    }
}
