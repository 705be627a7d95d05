//! Child process plumbing: bounded capture with a timeout for hooks, and
//! line-by-line streaming for the engine.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured output of a command run to completion.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Trimmed, lossily decoded stdout.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }

    /// Human-readable dump of both streams for a log file.
    pub fn render_log(&self, label: &str) -> String {
        let mut buf = String::new();
        buf.push_str("=== stdout ===\n");
        buf.push_str(&String::from_utf8_lossy(&self.stdout));
        if self.stdout_truncated > 0 {
            buf.push_str(&format!(
                "\n[{label} stdout truncated {} bytes]\n",
                self.stdout_truncated
            ));
        }
        buf.push_str("\n=== stderr ===\n");
        buf.push_str(&String::from_utf8_lossy(&self.stderr));
        if self.stderr_truncated > 0 {
            buf.push_str(&format!(
                "\n[{label} stderr truncated {} bytes]\n",
                self.stderr_truncated
            ));
        }
        if self.timed_out {
            buf.push_str(&format!("\n[{label} timed out]\n"));
        }
        buf
    }
}

/// Run `cmd` to completion, killing it after `timeout`.
///
/// Both pipes are drained on helper threads so a chatty child cannot block on a
/// full pipe; at most `output_limit_bytes` of each stream is kept.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = spawn(&mut cmd)?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_handle = thread::spawn(move || read_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_reader(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_reader(stderr_handle).context("join stderr")?;
    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Result of a streamed command.
#[derive(Debug)]
pub struct StreamedOutput {
    pub status: ExitStatus,
    pub stderr: Vec<u8>,
    pub stderr_truncated: usize,
    /// Stdout lines handed to the callback.
    pub lines: usize,
}

/// Run `cmd`, feeding `stdin` and handing each stdout line to `on_line` as it arrives.
///
/// Blocks until stdout reaches EOF and the child exits. When `tee_path` is set,
/// every stdout line is also appended to that file and flushed immediately.
#[instrument(skip_all, fields(stderr_limit_bytes, tee = tee_path.is_some()))]
pub fn run_streaming(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    stderr_limit_bytes: usize,
    tee_path: Option<&Path>,
    mut on_line: impl FnMut(&str),
) -> Result<StreamedOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let mut tee = match tee_path {
        Some(path) => Some(open_tee(path)?),
        None => None,
    };

    let mut child = spawn(&mut cmd)?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stderr_handle = thread::spawn(move || read_limited(stderr, stderr_limit_bytes));

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        if let Err(err) = child_stdin.write_all(input) {
            drop(child_stdin);
            reap(&mut child);
            return Err(anyhow!(err).context("write stdin"));
        }
        // Dropping the handle closes the pipe so the child sees EOF.
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let mut reader = BufReader::new(stdout);
    let mut lines = 0usize;
    let mut raw = Vec::new();
    loop {
        raw.clear();
        let n = reader.read_until(b'\n', &mut raw).context("read stdout")?;
        if n == 0 {
            break;
        }
        if let Some(writer) = tee.as_mut()
            && let Err(err) = writer.write_all(&raw).and_then(|()| writer.flush())
        {
            warn!(err = %err, "failed to write transcript line");
        }
        lines += 1;
        on_line(&String::from_utf8_lossy(&raw));
    }

    let status = child.wait().context("wait for command")?;
    let (stderr, stderr_truncated) = join_reader(stderr_handle).context("join stderr")?;
    debug!(exit_code = ?status.code(), lines, "streamed command finished");
    Ok(StreamedOutput {
        status,
        stderr,
        stderr_truncated,
        lines,
    })
}

/// Kill and wait for a child abandoned on an error path.
fn reap(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!(err = %err, "kill after failed stdin write");
    }
    if let Err(err) = child.wait() {
        warn!(err = %err, "failed to wait for abandoned child");
    }
}

fn spawn(cmd: &mut Command) -> Result<Child> {
    debug!(program = ?cmd.get_program(), "spawning child process");
    cmd.spawn().map_err(|err| {
        error!(program = ?cmd.get_program(), err = %err, "failed to spawn command");
        anyhow!(err).context(format!("spawn {}", cmd.get_program().to_string_lossy()))
    })
}

fn open_tee(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create transcript dir {}", parent.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("create transcript {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn join_reader(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
}

/// Drain `reader` fully, keeping at most `limit` bytes.
fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut kept = Vec::new();
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(kept.len()).min(n);
        kept.extend_from_slice(&chunk[..room]);
        dropped += n - room;
    }
    Ok((kept, dropped))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn bounded_capture_truncates_and_reports() {
        let out = run_with_timeout(sh("printf 'abcdefgh'; printf 'err' >&2"), Duration::from_secs(5), 4)
            .expect("run");
        assert!(out.succeeded());
        assert_eq!(out.stdout, b"abcd");
        assert_eq!(out.stdout_truncated, 4);
        assert!(out.render_log("hook").contains("[hook stdout truncated 4 bytes]"));
    }

    #[test]
    fn timeout_kills_child() {
        let out = run_with_timeout(sh("sleep 5"), Duration::from_millis(100), 1024).expect("run");
        assert!(out.timed_out);
        assert!(!out.succeeded());
    }

    #[test]
    fn streaming_delivers_lines_and_tees() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tee = temp.path().join("t").join("stream.jsonl");
        let mut seen = Vec::new();
        let out = run_streaming(
            sh("cat; echo second; echo oops >&2"),
            Some(b"first\n"),
            1024,
            Some(&tee),
            |line| seen.push(line.trim_end().to_string()),
        )
        .expect("run");
        assert!(out.status.success());
        assert_eq!(seen, vec!["first", "second"]);
        assert_eq!(out.lines, 2);
        assert_eq!(String::from_utf8_lossy(&out.stderr).trim(), "oops");
        assert_eq!(fs::read_to_string(&tee).expect("tee"), "first\nsecond\n");
    }

    #[test]
    fn failed_stdin_write_reaps_child() {
        // The child exits without reading; a large write hits a closed pipe.
        let input = vec![b'x'; 4 * 1024 * 1024];
        let err = run_streaming(sh("exit 0"), Some(&input), 1024, None, |_| {}).unwrap_err();
        assert!(format!("{err:#}").contains("write stdin"));
    }

    #[test]
    fn spawn_failure_names_program() {
        let err = run_with_timeout(
            Command::new("definitely-not-a-real-program-xyz"),
            Duration::from_secs(1),
            16,
        )
        .unwrap_err();
        assert!(err.to_string().contains("definitely-not-a-real-program-xyz"));
    }
}
