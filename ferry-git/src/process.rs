//! Git subprocess invocation
//!
//! Commands are always built from an argument array, never a shell string.
//! Output is fully captured; long-running invocations can stream their
//! output line-by-line and be killed through a [`CancelToken`] or timeout.
//!
//! Git writes progress to stderr using carriage-return updates, so the
//! streaming reader splits on both `\r` and `\n`.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::error::GitError;

/// Default bound for non-interactive git commands
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Captured result of one git invocation
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl GitOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Cooperative kill switch for a streaming invocation.
///
/// Cloned freely; firing it once kills the process it was passed to and
/// surfaces [`GitError::Cancelled`] from the invocation.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the version-control executable with argument arrays
#[derive(Debug, Clone)]
pub struct GitRunner {
    program: String,
    timeout: Duration,
}

impl GitRunner {
    pub fn new() -> Self {
        Self {
            program: "git".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            program: "git".to_string(),
            timeout,
        }
    }

    /// Overrides the executable; used by tests and non-standard installs.
    pub fn with_program(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Runs the command and captures its output. The child is killed if the
    /// timeout elapses.
    pub async fn run(&self, args: &[&str], cwd: Option<&Path>) -> Result<GitOutput, GitError> {
        debug!("running {} {:?} in {:?}", self.program, args, cwd);

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(GitError::Timeout {
                    args: args.join(" "),
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        Ok(GitOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Like [`GitRunner::run`] but a non-zero exit is an error.
    pub async fn run_checked(
        &self,
        args: &[&str],
        cwd: Option<&Path>,
    ) -> Result<GitOutput, GitError> {
        let output = self.run(args, cwd).await?;
        if !output.success() {
            return Err(GitError::CommandFailed {
                args: args.join(" "),
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Runs the command, feeding every output segment (stdout and stderr,
    /// split on `\r`/`\n`) to `on_line` as it arrives. The child is killed
    /// when the token fires or the timeout elapses.
    pub async fn run_streaming(
        &self,
        args: &[&str],
        cwd: Option<&Path>,
        cancel: &CancelToken,
        mut on_line: impl FnMut(&str),
    ) -> Result<GitOutput, GitError> {
        debug!("streaming {} {:?} in {:?}", self.program, args, cwd);

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn()?;
        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
        let stdout_task = tokio::spawn(read_segments(stdout, line_tx.clone()));
        let stderr_task = tokio::spawn(read_segments(stderr, line_tx));

        let mut cancel_rx = cancel.subscribe();
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        let mut lines_open = true;
        let status = loop {
            tokio::select! {
                segment = line_rx.recv(), if lines_open => match segment {
                    Some(line) => on_line(&line),
                    None => lines_open = false,
                },
                result = child.wait() => break result?,
                _ = async { let _ = cancel_rx.wait_for(|cancelled| *cancelled).await; } => {
                    let _ = child.kill().await;
                    return Err(GitError::Cancelled);
                }
                _ = &mut deadline => {
                    let _ = child.kill().await;
                    return Err(GitError::Timeout {
                        args: args.join(" "),
                        seconds: self.timeout.as_secs(),
                    });
                }
            }
        };

        let stdout_text = stdout_task.await.unwrap_or_default();
        let stderr_text = stderr_task.await.unwrap_or_default();
        // Flush segments that arrived between the exit and the reader joins.
        while let Ok(line) = line_rx.try_recv() {
            on_line(&line);
        }

        Ok(GitOutput {
            stdout: stdout_text,
            stderr: stderr_text,
            exit_code: status.code().unwrap_or(-1),
        })
    }
}

impl Default for GitRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a stream to EOF, forwarding each `\r`/`\n`-delimited segment and
/// returning the collected text.
async fn read_segments<R: tokio::io::AsyncRead + Unpin>(
    mut reader: R,
    tx: mpsc::UnboundedSender<String>,
) -> String {
    let mut collected = String::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                for &byte in &buf[..n] {
                    if byte == b'\n' || byte == b'\r' {
                        if !pending.is_empty() {
                            let segment = String::from_utf8_lossy(&pending).into_owned();
                            collected.push_str(&segment);
                            collected.push('\n');
                            let _ = tx.send(segment);
                            pending.clear();
                        }
                    } else {
                        pending.push(byte);
                    }
                }
            }
        }
    }

    if !pending.is_empty() {
        let segment = String::from_utf8_lossy(&pending).into_owned();
        collected.push_str(&segment);
        let _ = tx.send(segment);
    }

    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc as StdArc, Mutex};

    fn sh(timeout: Duration) -> GitRunner {
        GitRunner::with_program("sh", timeout)
    }

    #[tokio::test]
    async fn test_run_captures_output_and_exit_code() {
        let runner = sh(Duration::from_secs(5));
        let output = runner
            .run(&["-c", "echo out; echo err >&2; exit 3"], None)
            .await
            .unwrap();

        assert_eq!(output.exit_code, 3);
        assert!(output.stdout.contains("out"));
        assert!(output.stderr.contains("err"));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_run_checked_fails_on_nonzero_exit() {
        let runner = sh(Duration::from_secs(5));
        let err = runner
            .run_checked(&["-c", "echo broken >&2; exit 1"], None)
            .await
            .unwrap_err();

        match err {
            GitError::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, 1);
                assert!(stderr.contains("broken"));
            }
            other => panic!("expected CommandFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_times_out_and_kills() {
        let runner = sh(Duration::from_millis(200));
        let err = runner.run(&["-c", "sleep 10"], None).await.unwrap_err();
        assert!(matches!(err, GitError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_streaming_splits_on_carriage_returns() {
        let runner = sh(Duration::from_secs(5));
        let seen: StdArc<Mutex<Vec<String>>> = StdArc::new(Mutex::new(Vec::new()));
        let sink = StdArc::clone(&seen);

        let output = runner
            .run_streaming(
                &["-c", "printf 'a\\rb\\rc\\n'"],
                None,
                &CancelToken::new(),
                |line| sink.lock().unwrap().push(line.to_string()),
            )
            .await
            .unwrap();

        assert_eq!(output.exit_code, 0);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_streaming_cancel_kills_child() {
        let runner = sh(Duration::from_secs(30));
        let token = CancelToken::new();
        let trigger = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = runner
            .run_streaming(&["-c", "sleep 20"], None, &token, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, GitError::Cancelled));
        assert!(token.is_cancelled());
    }
}
