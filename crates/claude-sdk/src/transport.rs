use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::{self, PromptInput, NESTED_SESSION_VAR};
use crate::decoder::{NdjsonDecoder, MAX_BUFFER_SIZE};
use crate::types::{InputFormat, QueryOptions};
use crate::{ClaudeSdkError, DecodeFailure, Result};

/// How long `disconnect` waits after SIGTERM before killing outright.
pub const GRACE_PERIOD: Duration = Duration::from_secs(5);

// ─── TransportConfig ──────────────────────────────────────────────────────

/// Everything needed to spawn one CLI subprocess.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub cli_path: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Set on top of the inherited environment (`CLAUDECODE` is always removed).
    pub env: Vec<(String, String)>,
    pub input_format: InputFormat,
    pub max_buffer_size: usize,
}

impl TransportConfig {
    pub fn new(cli_path: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            cli_path: cli_path.into(),
            args,
            cwd: None,
            env: Vec::new(),
            input_format: InputFormat::Text,
            max_buffer_size: MAX_BUFFER_SIZE,
        }
    }

    /// Derive arguments, environment and limits from query options.
    pub fn from_options(cli_path: PathBuf, opts: &QueryOptions, input: &PromptInput) -> Self {
        Self {
            cli_path,
            args: command::build_args(opts, input),
            cwd: opts.cwd.clone(),
            env: command::build_env(opts),
            input_format: opts.input_format,
            max_buffer_size: opts.max_buffer_size,
        }
    }
}

// ─── ProcessSession ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Streaming,
    /// stdout closed; exit status not yet checked.
    Eof,
    Done,
}

/// One live subprocess and its pipes. Exists only between connect and
/// disconnect.
struct ProcessSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    /// Drains stderr line by line; resolves to everything it read.
    stderr_task: Option<JoinHandle<String>>,
    decoder: NdjsonDecoder,
    line: Vec<u8>,
    state: ReadState,
}

impl ProcessSession {
    /// Next complete stdout line without its terminator, or `None` at EOF.
    ///
    /// A line longer than the decoder's limit is rejected here, before it
    /// is ever fully held in memory.
    async fn read_line(&mut self) -> Result<Option<String>> {
        self.line.clear();
        loop {
            let available = self
                .stdout
                .fill_buf()
                .await
                .map_err(|e| ClaudeSdkError::connection_io("failed to read process stdout", e))?;
            if available.is_empty() {
                if self.line.is_empty() {
                    return Ok(None);
                }
                break;
            }

            let (content, consumed, complete) = match available.iter().position(|b| *b == b'\n') {
                Some(i) => (&available[..i], i + 1, true),
                None => (available, available.len(), false),
            };
            self.line.extend_from_slice(content);
            self.stdout.consume(consumed);

            if self.decoder.buffer_len() + self.line.len() > self.decoder.max_buffer_size() {
                let pending = String::from_utf8_lossy(&self.line).into_owned();
                self.line.clear();
                return Err(self.decoder.overflow(&pending));
            }
            if complete {
                break;
            }
        }
        let line = std::mem::take(&mut self.line);
        String::from_utf8(line)
            .map(Some)
            .map_err(|e| ClaudeSdkError::JsonDecode {
                line: String::from_utf8_lossy(e.as_bytes()).into_owned(),
                source: DecodeFailure::InvalidUtf8(e),
            })
    }

    /// Wait for exit, collect stderr, and turn a failed exit into an error.
    async fn check_exit(&mut self) -> Result<()> {
        self.stdin.take();
        let status = self.child.wait().await?;
        let stderr = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        exit_error(status, stderr)
    }
}

fn exit_error(status: ExitStatus, stderr: String) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    Err(ClaudeSdkError::Process {
        exit_code: status.code(),
        stderr,
    })
}

// ─── SubprocessTransport ──────────────────────────────────────────────────

/// Owns at most one `claude` subprocess and mediates all I/O with it.
///
/// `connect` spawns, `send`/`send_all` write stream-json turns to stdin,
/// `next_value`/`receive` decode stdout, and `disconnect` tears everything
/// down. Dropping a connected transport kills the child.
pub struct SubprocessTransport {
    config: TransportConfig,
    session: Option<ProcessSession>,
}

impl SubprocessTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    /// Spawn the subprocess. A no-op when already connected.
    pub async fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let cli = self.config.cli_path.display().to_string();

        if let Some(cwd) = &self.config.cwd {
            if !cwd.is_dir() {
                return Err(ClaudeSdkError::connection(format!(
                    "working directory does not exist: {}",
                    cwd.display()
                )));
            }
        }

        let mut cmd = Command::new(&self.config.cli_path);
        cmd.args(&self.config.args)
            .env_remove(NESTED_SESSION_VAR)
            .envs(self.config.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.config.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ClaudeSdkError::CliNotFound {
                    message: format!("Claude Code not found or not executable at: {cli} ({e})"),
                    path: cli.clone(),
                }
            }
            _ => ClaudeSdkError::connection_io(format!("failed to start {cli}"), e),
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClaudeSdkError::connection("stdout not captured"))?;

        // Single-shot prompts travel in argv; closing stdin now tells the
        // CLI there is nothing more to read.
        let stdin = match self.config.input_format {
            InputFormat::StreamJson => child.stdin.take(),
            InputFormat::Text => {
                child.stdin.take();
                None
            }
        };

        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut captured = String::new();
                let mut reader = BufReader::new(stderr);
                let mut raw = Vec::new();
                // Bytes, not lines: stderr is drained to EOF whatever its encoding.
                loop {
                    raw.clear();
                    match reader.read_until(b'\n', &mut raw).await {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                    let line = String::from_utf8_lossy(&raw);
                    let line = line.trim_end_matches(['\r', '\n']);
                    debug!(target: "claude_sdk::stderr", "{line}");
                    captured.push_str(line);
                    captured.push('\n');
                }
                captured
            })
        });

        info!(
            pid = child.id(),
            cli = %cli,
            streaming = stdin.is_some(),
            "connected to claude CLI"
        );
        debug!(
            argc = self.config.args.len(),
            cwd = ?self.config.cwd,
            args = ?self.config.args,
            "spawned claude CLI"
        );

        self.session = Some(ProcessSession {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr_task,
            decoder: NdjsonDecoder::new(self.config.max_buffer_size),
            line: Vec::new(),
            state: ReadState::Streaming,
        });
        Ok(())
    }

    /// Write one JSON document plus newline to stdin and flush.
    pub async fn send(&mut self, message: &Value) -> Result<()> {
        let stdin = self
            .session
            .as_mut()
            .and_then(|s| s.stdin.as_mut())
            .ok_or_else(ClaudeSdkError::not_connected)?;

        let mut buf = serde_json::to_vec(message).map_err(std::io::Error::from)?;
        buf.push(b'\n');

        let written = match stdin.write_all(&buf).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };
        written.map_err(|e| {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                ClaudeSdkError::connection_io("process terminated unexpectedly", e)
            } else {
                ClaudeSdkError::connection_io("failed to write to process stdin", e)
            }
        })
    }

    /// Send every message in order, then close stdin.
    pub async fn send_all(&mut self, messages: &[Value]) -> Result<()> {
        for message in messages {
            self.send(message).await?;
        }
        self.close_stdin();
        Ok(())
    }

    /// Close stdin, signalling that no more turns will follow.
    pub fn close_stdin(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.stdin.take();
        }
    }

    /// Next decoded stdout document.
    ///
    /// Returns `Ok(None)` once stdout has ended and the process exited
    /// successfully; a failed exit surfaces as [`ClaudeSdkError::Process`].
    pub async fn next_value(&mut self) -> Result<Option<Value>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(ClaudeSdkError::not_connected)?;

        loop {
            match session.state {
                ReadState::Done => return Ok(None),
                ReadState::Eof => {
                    session.state = ReadState::Done;
                    session.check_exit().await?;
                    return Ok(None);
                }
                ReadState::Streaming => match session.read_line().await? {
                    Some(line) => {
                        if let Some(value) = session.decoder.push(&line)? {
                            return Ok(Some(value));
                        }
                    }
                    None => {
                        session.state = ReadState::Eof;
                        if let Some(value) = session.decoder.finish()? {
                            return Ok(Some(value));
                        }
                    }
                },
            }
        }
    }

    /// Deliver every decoded document to `on_message`, in arrival order,
    /// until stdout ends.
    pub async fn receive<F>(&mut self, mut on_message: F) -> Result<()>
    where
        F: FnMut(Value),
    {
        while let Some(value) = self.next_value().await? {
            on_message(value);
        }
        Ok(())
    }

    /// Point-in-time liveness check.
    pub fn is_connected(&mut self) -> bool {
        self.session
            .as_mut()
            .is_some_and(|s| matches!(s.child.try_wait(), Ok(None)))
    }

    pub fn pid(&self) -> Option<u32> {
        self.session.as_ref().and_then(|s| s.child.id())
    }

    /// Terminate the subprocess and release its pipes.
    ///
    /// SIGTERM first, then SIGKILL after [`GRACE_PERIOD`]. Errors are
    /// swallowed; calling this twice, or before `connect`, is a no-op.
    pub async fn disconnect(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        session.stdin.take();

        if matches!(session.child.try_wait(), Ok(None)) {
            let pid = session.child.id();
            terminate(&mut session.child);
            if tokio::time::timeout(GRACE_PERIOD, session.child.wait())
                .await
                .is_err()
            {
                warn!(pid, "claude CLI ignored SIGTERM; killing it");
                let _ = session.child.kill().await;
            }
        }

        if let Some(task) = session.stderr_task.take() {
            task.abort();
        }
        info!("disconnected from claude CLI");
    }
}

impl Drop for SubprocessTransport {
    fn drop(&mut self) {
        if let Some(session) = self.session.as_mut() {
            let _ = session.child.start_kill();
            if let Some(task) = session.stderr_task.take() {
                task.abort();
            }
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    match child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()) {
        // SAFETY: plain signal delivery to our own child; no memory involved.
        Some(pid) => unsafe {
            libc::kill(pid, libc::SIGTERM);
        },
        None => {
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

/// One stream-json user turn for stdin.
pub fn user_turn(text: impl Into<String>) -> Value {
    serde_json::json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": [{"type": "text", "text": text.into()}]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_turn_shape() {
        let turn = user_turn("hello");
        assert_eq!(turn["type"], "user");
        assert_eq!(turn["message"]["role"], "user");
        assert_eq!(turn["message"]["content"][0]["type"], "text");
        assert_eq!(turn["message"]["content"][0]["text"], "hello");
    }

    #[test]
    fn config_from_options_uses_builder() {
        let opts = QueryOptions {
            model: Some("opus".into()),
            cwd: Some(PathBuf::from("/tmp")),
            input_format: InputFormat::StreamJson,
            max_buffer_size: 1024,
            ..Default::default()
        };
        let cfg = TransportConfig::from_options("claude".into(), &opts, &PromptInput::Streaming);
        assert!(cfg.args.contains(&"--model".to_string()));
        assert_eq!(cfg.args.last().map(String::as_str), Some("--print"));
        assert_eq!(cfg.cwd.as_deref(), Some(std::path::Path::new("/tmp")));
        assert_eq!(cfg.input_format, InputFormat::StreamJson);
        assert_eq!(cfg.max_buffer_size, 1024);
        assert!(cfg
            .env
            .iter()
            .any(|(k, v)| k == command::ENTRYPOINT_VAR && v == command::ENTRYPOINT));
    }

    #[tokio::test]
    async fn unconnected_operations() {
        let mut transport = SubprocessTransport::new(TransportConfig::new("claude", vec![]));
        assert!(!transport.is_connected());
        assert!(transport.pid().is_none());

        let err = transport.send(&user_turn("x")).await.unwrap_err();
        assert!(err.is_connection());
        assert!(err.to_string().contains("not connected"));

        let err = transport.next_value().await.unwrap_err();
        assert!(err.is_connection());

        transport.disconnect().await;
        transport.disconnect().await;
    }
}
