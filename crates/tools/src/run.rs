//! `run`: execute a shell command in the project root.
//!
//! The command runs under `sh -c` in its own process group with stdin
//! closed. Stdout and stderr are drained concurrently with the wait so a
//! chatty process cannot block on a full pipe. On timeout the whole group is
//! killed and the child reaped before the error is returned. If the call is
//! cancelled mid-flight the group is killed when the future is dropped.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tasktier_core::error::ToolError;
use tasktier_core::tool::{Tool, ToolName, required_str};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Limits for `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    /// Used when the call gives no `timeout_secs`
    pub default_timeout_secs: u64,
    /// Per-call timeouts are clamped to this
    pub max_timeout_secs: u64,
    /// Captured bytes kept per stream
    pub max_output_bytes: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            max_timeout_secs: 300,
            max_output_bytes: 64 * 1024,
        }
    }
}

pub struct RunTool {
    root: PathBuf,
    settings: RunSettings,
}

impl RunTool {
    pub fn new(root: PathBuf, settings: RunSettings) -> Self {
        Self { root, settings }
    }

    fn timeout_for(&self, input: &serde_json::Value) -> u64 {
        input
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.settings.default_timeout_secs)
            .clamp(1, self.settings.max_timeout_secs.max(1))
    }

    fn failed(reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: ToolName::Run.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Tool for RunTool {
    fn name(&self) -> ToolName {
        ToolName::Run
    }

    fn description(&self) -> &str {
        "Run a shell command in the project root and return its exit code, stdout and \
         stderr. Commands are killed when they exceed their timeout."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": format!(
                        "Wall-clock limit in seconds (default {}, max {})",
                        self.settings.default_timeout_secs, self.settings.max_timeout_secs
                    )
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: &serde_json::Value) -> Result<String, ToolError> {
        let command = required_str(input, "command")?;
        let timeout_secs = self.timeout_for(input);
        let limit = self.settings.max_output_bytes;

        debug!(command = %command, timeout_secs, "Executing shell command");

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| Self::failed(e.to_string()))?;
        let pid = child.id();
        let mut group = GroupGuard::new(pid);
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let finished = tokio::time::timeout(Duration::from_secs(timeout_secs), async {
            tokio::join!(
                child.wait(),
                drain(stdout, limit),
                drain(stderr, limit)
            )
        })
        .await;

        let (status, stdout, stderr) = match finished {
            Ok(parts) => {
                group.disarm();
                parts
            }
            Err(_) => {
                warn!(command = %command, timeout_secs, "Command timed out, killing process group");
                group.kill();
                let _ = child.kill().await;
                return Err(ToolError::Timeout {
                    tool_name: ToolName::Run.to_string(),
                    timeout_secs,
                });
            }
        };

        let status = status.map_err(|e| Self::failed(e.to_string()))?;
        let code = status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "terminated by signal".into());
        if !status.success() {
            debug!(command = %command, exit_code = %code, "Command exited unsuccessfully");
        }
        Ok(format_output(&code, &stdout, &stderr, limit))
    }
}

/// Captured bytes of one stream, up to `limit`, plus the total seen.
struct Captured {
    kept: Vec<u8>,
    total: usize,
}

/// Read a stream to EOF, keeping at most `limit` bytes. Reading continues
/// past the limit so the writer never blocks.
async fn drain<R: AsyncRead + Unpin>(stream: Option<R>, limit: usize) -> Captured {
    let mut captured = Captured {
        kept: Vec::new(),
        total: 0,
    };
    let Some(mut stream) = stream else {
        return captured;
    };
    let mut buf = [0u8; 8192];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                captured.total += n;
                let room = limit.saturating_sub(captured.kept.len());
                captured.kept.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    captured
}

/// Kills the child's process group on drop unless disarmed. `kill_on_drop`
/// only reaches `sh`; this also reaches anything it spawned.
struct GroupGuard {
    pid: Option<u32>,
    armed: bool,
}

impl GroupGuard {
    fn new(pid: Option<u32>) -> Self {
        Self { pid, armed: true }
    }

    /// The child exited and was reaped; its pid may be reused from here on.
    fn disarm(&mut self) {
        self.armed = false;
    }

    fn kill(&mut self) {
        if self.armed {
            kill_group(self.pid);
            self.armed = false;
        }
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if self.armed {
            debug!(pid = ?self.pid, "Run cancelled, killing process group");
        }
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    if let Some(pid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) {
        // SAFETY: killpg has no memory-safety preconditions; the group id is
        // the child's pid because it was spawned with process_group(0).
        unsafe {
            libc::killpg(pid, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

fn format_output(code: &str, stdout: &Captured, stderr: &Captured, limit: usize) -> String {
    let mut out = format!("exit code: {code}");
    for (label, stream) in [("stdout", stdout), ("stderr", stderr)] {
        if stream.total == 0 {
            continue;
        }
        let mut text = String::from_utf8_lossy(&stream.kept).into_owned();
        truncate_at_boundary(&mut text, limit);
        out.push_str(&format!("\n--- {label} ---\n{}", text.trim_end()));
        if stream.total > stream.kept.len() {
            out.push_str(&format!(
                "\n[{label} truncated: {} of {} bytes shown]",
                text.len(),
                stream.total
            ));
        }
    }
    if stdout.total == 0 && stderr.total == 0 {
        out.push_str("\n(no output)");
    }
    out
}

fn truncate_at_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tasktier_core::error::ToolErrorKind;

    fn tool(dir: &std::path::Path, settings: RunSettings) -> RunTool {
        RunTool::new(dir.to_path_buf(), settings)
    }

    #[tokio::test]
    async fn captures_exit_code_and_streams() {
        let dir = tempfile::tempdir().unwrap();
        let out = tool(dir.path(), RunSettings::default())
            .execute(&serde_json::json!({"command": "echo hello; echo oops >&2; exit 3"}))
            .await
            .unwrap();
        assert!(out.starts_with("exit code: 3"));
        assert!(out.contains("--- stdout ---\nhello"));
        assert!(out.contains("--- stderr ---\noops"));
    }

    #[tokio::test]
    async fn runs_in_project_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let out = tool(dir.path(), RunSettings::default())
            .execute(&serde_json::json!({"command": "ls"}))
            .await
            .unwrap();
        assert!(out.contains("marker.txt"));
    }

    #[tokio::test]
    async fn long_output_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RunSettings {
            max_output_bytes: 100,
            ..RunSettings::default()
        };
        let out = tool(dir.path(), settings)
            .execute(&serde_json::json!({"command": "yes x | head -c 5000"}))
            .await
            .unwrap();
        assert!(out.contains("[stdout truncated: 100 of 5000 bytes shown]"));
    }

    #[test]
    fn timeout_is_clamped() {
        let run = RunTool::new(
            PathBuf::from("."),
            RunSettings {
                default_timeout_secs: 10,
                max_timeout_secs: 20,
                max_output_bytes: 10,
            },
        );
        assert_eq!(run.timeout_for(&serde_json::json!({})), 10);
        assert_eq!(run.timeout_for(&serde_json::json!({"timeout_secs": 999})), 20);
        assert_eq!(run.timeout_for(&serde_json::json!({"timeout_secs": 0})), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let err = tool(dir.path(), RunSettings::default())
            .execute(&serde_json::json!({
                "command": "echo $$ > pid.txt; exec sleep 30",
                "timeout_secs": 1
            }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(10));

        let pid: libc::pid_t = std::fs::read_to_string(dir.path().join("pid.txt"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        // the child was reaped, so the pid no longer names a process
        let alive = unsafe { libc::kill(pid, 0) } == 0;
        assert!(!alive);
    }

    /// A live, non-zombie process with this pid exists.
    #[cfg(target_os = "linux")]
    fn running(pid: libc::pid_t) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .map(str::trim_start)
                .is_some_and(|state| !state.starts_with('Z') && !state.starts_with('X')),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn cancelled_execute_kills_background_children() {
        let dir = tempfile::tempdir().unwrap();
        let run = tool(dir.path(), RunSettings::default());
        let input = serde_json::json!({"command": "sleep 60 & echo $! > bg.pid; wait"});

        let cancelled =
            tokio::time::timeout(Duration::from_millis(700), run.execute(&input)).await;
        assert!(cancelled.is_err());

        let pid: libc::pid_t = std::fs::read_to_string(dir.path().join("bg.pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let mut alive = true;
        for _ in 0..40 {
            if !running(pid) {
                alive = false;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!alive, "background sleep {pid} outlived the cancelled call");
    }
}
