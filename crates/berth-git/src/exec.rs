//! Git subprocess execution and result classification.
//!
//! [`git`] is the single entry point callers use for every invocation. It
//! runs the external `git` binary, captures its output and duration for
//! classification, and either hands back a [`GitResult`] or fails with a
//! [`GitCommandError`](crate::error::GitCommandError) carrying the full
//! output and argument vector.
//!
//! Concurrent invocations against the same repository are not serialized
//! here; git's own lock file surfaces as
//! [`GitErrorKind::LockFileExists`](crate::error::GitErrorKind) and is
//! fatal unless the caller opted into it.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tracing::{debug, error};

use crate::error::{parse_error, Error, GitCommandError, GitErrorKind, Result};

/// How long an invocation may take before it is logged.
const SLOW_COMMAND_THRESHOLD: Duration = Duration::from_millis(100);

/// How much of stdout/stderr to include when logging an unexpected failure.
const LOG_OUTPUT_LIMIT: usize = 256;

/// Per-invocation configuration for [`git`].
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Exit codes which indicate success to the caller. Unexpected exit
    /// codes are logged and surfaced as an error. Defaults to `{0}`.
    pub success_exit_codes: HashSet<i32>,

    /// The git errors which are expected by the caller and returned as
    /// values inside [`GitResult`]. Unexpected errors are logged and
    /// surfaced as an error. Defaults to none.
    pub expected_errors: HashSet<GitErrorKind>,

    /// Extra environment variables for the child process.
    pub env: HashMap<String, String>,

    /// Payload written to the child's stdin, which is closed afterwards.
    pub stdin: Option<String>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            success_exit_codes: HashSet::from([0]),
            expected_errors: HashSet::new(),
            env: HashMap::new(),
            stdin: None,
        }
    }
}

/// The classified result of a git invocation.
///
/// Always unambiguous: either the exit code was in the accepted set (then
/// `error_kind` is `None`), or it carries the recognized kind the caller
/// opted into. Everything else never reaches the caller as a value.
#[derive(Debug, Clone)]
pub struct GitResult {
    /// The exit code the process ended with.
    pub exit_code: i32,

    /// Raw standard output.
    pub stdout: String,

    /// Raw standard error.
    pub stderr: String,

    /// Wall-clock duration of the invocation.
    pub duration: Duration,

    /// The recognized error, `None` when the exit code was accepted or
    /// when no failure signature matched.
    pub error_kind: Option<GitErrorKind>,

    /// The fixed description for `error_kind`.
    pub error_description: Option<&'static str>,
}

/// Run git with the given arguments in the given working directory.
///
/// * `name` identifies the calling domain operation (`"get_commits"`,
///   `"pull"`, ...) in logs.
///
/// Returns the classified result. An exit code outside
/// `options.success_exit_codes` with an error outside
/// `options.expected_errors` fails with [`Error::Command`].
pub async fn git(
    args: &[&str],
    path: &Path,
    name: &str,
    options: ExecutionOptions,
) -> Result<GitResult> {
    let (output, duration) = run(args, path, &options).await?;
    log_slow_command(name, args, duration);
    classify(output, duration, args, &options)
}

/// Like [`git`], but streams stderr line-by-line to `on_stderr_line` while
/// the process runs. Used for network operations under `--progress`.
///
/// Lines are split on both `\r` and `\n` since git rewrites progress lines
/// in place with carriage returns. The callback runs synchronously on the
/// read loop and must not block, or the child stalls on a full pipe.
pub async fn git_with_progress<F>(
    args: &[&str],
    path: &Path,
    name: &str,
    options: ExecutionOptions,
    on_stderr_line: F,
) -> Result<GitResult>
where
    F: FnMut(&str) + Send,
{
    let (output, duration) = run_streaming(args, path, &options, on_stderr_line).await?;
    log_slow_command(name, args, duration);
    classify(output, duration, args, &options)
}

struct RawOutput {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

fn build_command(args: &[&str], path: &Path, options: &ExecutionOptions) -> Command {
    let mut command = Command::new("git");
    command
        .args(args)
        .current_dir(path)
        .stdin(if options.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in &options.env {
        command.env(key, value);
    }
    command
}

async fn run(
    args: &[&str],
    path: &Path,
    options: &ExecutionOptions,
) -> Result<(RawOutput, Duration)> {
    let start = Instant::now();
    let mut child = build_command(args, path, options).spawn()?;

    let stdin_pipe = child.stdin.take();
    let (output, ()) = tokio::try_join!(
        child.wait_with_output(),
        write_stdin(stdin_pipe, options.stdin.as_deref()),
    )?;
    let duration = start.elapsed();

    Ok((
        RawOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        },
        duration,
    ))
}

async fn run_streaming<F>(
    args: &[&str],
    path: &Path,
    options: &ExecutionOptions,
    mut on_stderr_line: F,
) -> Result<(RawOutput, Duration)>
where
    F: FnMut(&str) + Send,
{
    let start = Instant::now();
    let mut child = build_command(args, path, options).spawn()?;

    let stdin_pipe = child.stdin.take();
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();

    let stdout_task = async {
        let mut buf = String::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            pipe.read_to_string(&mut buf).await?;
        }
        Ok::<String, std::io::Error>(buf)
    };

    let stderr_task = async {
        let mut raw = Vec::new();
        let mut line_start = 0;
        let mut chunk = [0u8; 4096];
        if let Some(pipe) = stderr_pipe.as_mut() {
            loop {
                let read = pipe.read(&mut chunk).await?;
                if read == 0 {
                    break;
                }
                raw.extend_from_slice(&chunk[..read]);
                // Scan only the freshly appended bytes for terminators.
                let mut cursor = raw.len() - read;
                while cursor < raw.len() {
                    if raw[cursor] == b'\n' || raw[cursor] == b'\r' {
                        if cursor > line_start {
                            let line = String::from_utf8_lossy(&raw[line_start..cursor]);
                            on_stderr_line(&line);
                        }
                        line_start = cursor + 1;
                    }
                    cursor += 1;
                }
            }
        }
        if line_start < raw.len() {
            let line = String::from_utf8_lossy(&raw[line_start..]);
            on_stderr_line(&line);
        }
        Ok::<String, std::io::Error>(String::from_utf8_lossy(&raw).to_string())
    };

    let (stdout, stderr, status, ()) = tokio::try_join!(
        stdout_task,
        stderr_task,
        async { child.wait().await },
        write_stdin(stdin_pipe, options.stdin.as_deref()),
    )?;
    let duration = start.elapsed();

    Ok((
        RawOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout,
            stderr,
        },
        duration,
    ))
}

/// Write the payload and close stdin to signal EOF. Runs concurrently with
/// output draining: a child that fills its stdout pipe before reading all
/// of stdin would otherwise deadlock against a sequential write.
async fn write_stdin(pipe: Option<ChildStdin>, input: Option<&str>) -> std::io::Result<()> {
    if let (Some(mut stdin), Some(input)) = (pipe, input) {
        match stdin.write_all(input.as_bytes()).await {
            // The child may exit without draining its stdin.
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            other => other?,
        }
    }
    Ok(())
}

fn log_slow_command(name: &str, args: &[&str], duration: Duration) {
    if duration > SLOW_COMMAND_THRESHOLD {
        debug!(
            "executing: {name}: git {} (took {:.3}s)",
            args.join(" "),
            duration.as_secs_f64()
        );
    }
}

/// Map raw output into a [`GitResult`] or a fatal error, per the two-tier
/// model: expected errors are values, everything else aborts the caller.
fn classify(
    output: RawOutput,
    duration: Duration,
    args: &[&str],
    options: &ExecutionOptions,
) -> Result<GitResult> {
    let acceptable_exit_code = options.success_exit_codes.contains(&output.exit_code);

    let error_kind = if acceptable_exit_code {
        None
    } else {
        parse_error(&output.stderr).or_else(|| parse_error(&output.stdout))
    };
    let error_description = error_kind.map(GitErrorKind::description);

    let result = GitResult {
        exit_code: output.exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
        duration,
        error_kind,
        error_description,
    };

    let acceptable_error = match error_kind {
        Some(kind) => options.expected_errors.contains(&kind),
        None => true,
    };

    if acceptable_exit_code || (error_kind.is_some() && acceptable_error) {
        return Ok(result);
    }

    error!(
        "`git {}` exited with an unexpected code: {}. The caller should either handle this error, or expect that exit code.",
        args.join(" "),
        result.exit_code
    );
    if !result.stdout.is_empty() {
        error!("stdout: {}", truncate(&result.stdout, LOG_OUTPUT_LIMIT));
    }
    if !result.stderr.is_empty() {
        error!("stderr: {}", truncate(&result.stderr, LOG_OUTPUT_LIMIT));
    }
    if let Some(kind) = error_kind {
        error!(
            "(the error was parsed as {kind:?}: {})",
            error_description.unwrap_or_default()
        );
    }

    Err(Error::from(GitCommandError {
        result,
        args: args.iter().map(|a| a.to_string()).collect(),
    }))
}

fn truncate(text: &str, limit: usize) -> &str {
    let mut end = text.len().min(limit);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
