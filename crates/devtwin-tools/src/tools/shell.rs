//! shell — non-interactive command execution with hard timeout
//!
//! Output is framed as `$ <cmd>\n[exit <code>]\n<output>`; the `[exit N]`
//! marker is the canonical signal downstream consumers parse. On timeout
//! the whole process tree is killed (the child runs in its own process
//! group) and `[KILLED AFTER TIMEOUT]` is appended to the output.

use crate::registry::{Tool, ToolResult};
use devtwin_core::{DevtwinConfig, DockerTarget};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::debug;

pub struct ShellTool {
    repo_dir: PathBuf,
    docker: Option<DockerTarget>,
    config: DevtwinConfig,
}

impl ShellTool {
    pub fn new(
        repo_dir: impl AsRef<Path>,
        docker: Option<DockerTarget>,
        config: DevtwinConfig,
    ) -> Self {
        Self {
            repo_dir: repo_dir.as_ref().to_path_buf(),
            docker,
            config,
        }
    }
}

#[async_trait::async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run a shell command in the repository root. Prefer non-interactive \
         flags (--yes, -y, CI=1); provide input via stdin if unavoidable. \
         Timeout is in seconds, defaults to 60 and is capped at 600."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default 60, max 600)"
                },
                "stdin": {
                    "type": "string",
                    "description": "Text piped to the command's stdin"
                },
                "stream": {
                    "type": "boolean",
                    "description": "Capture stdout and stderr interleaved"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(command) = args["command"].as_str() else {
            return ToolResult::error("Missing required parameter: command");
        };
        let default_timeout = self.config.timeouts.default_shell_timeout;
        let max_timeout = self.config.timeouts.max_shell_timeout;
        let timeout = args["timeout"]
            .as_u64()
            .unwrap_or(default_timeout)
            .clamp(1, max_timeout);
        let stdin = args["stdin"].as_str();

        debug!("shell: {}", command.chars().take(120).collect::<String>());

        // Transparently rewrap for a container target; the framing still
        // shows the original command.
        let exec_cmd = match &self.docker {
            Some(docker) => {
                let workdir = docker
                    .workdir
                    .clone()
                    .unwrap_or_else(|| self.config.docker.workspace_dir.clone());
                format!(
                    "docker exec -w {} {} sh -lc \"{}\"",
                    workdir,
                    docker.container_id,
                    command.replace('"', "\\\"")
                )
            }
            None => command.to_string(),
        };

        let (code, out, err) = run_shell(&exec_cmd, &self.repo_dir, timeout, stdin).await;
        let mut combined = out;
        if !err.trim().is_empty() {
            if !combined.trim().is_empty() {
                combined.push('\n');
            }
            combined.push_str(&err);
        }
        ToolResult::text(format!("$ {command}\n[exit {code}]\n{combined}"))
    }
}

/// Run a command under the platform shell with a hard timeout.
/// Returns (exit_code, stdout, stderr); decoding is lossy UTF-8 so garbage
/// build output cannot crash the run.
pub async fn run_shell(
    command: &str,
    cwd: &Path,
    timeout_secs: u64,
    stdin: Option<&str>,
) -> (i32, String, String) {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-lc").arg(command);
        c
    };
    cmd.current_dir(cwd)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // Own process group so a timeout can take down the whole tree
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => return (-1, String::new(), format!("failed to spawn: {e}")),
    };

    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            let _ = pipe.write_all(input.as_bytes()).await;
        }
    }

    // Drain pipes concurrently with wait() so a chatty child cannot block
    let stdout_task = tokio::spawn(read_pipe(child.stdout.take()));
    let stderr_task = tokio::spawn(read_pipe(child.stderr.take()));

    let mut timed_out = false;
    let status = match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(_)) => None,
        Err(_) => {
            timed_out = true;
            kill_process_tree(&mut child).await;
            child.wait().await.ok()
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let mut stderr = stderr_task.await.unwrap_or_default();
    if timed_out {
        stderr.push_str("\n[KILLED AFTER TIMEOUT]");
    }

    (exit_code(status), stdout, stderr)
}

async fn read_pipe(pipe: Option<impl tokio::io::AsyncRead + Unpin>) -> String {
    use tokio::io::AsyncReadExt;
    match pipe {
        Some(mut p) => {
            let mut buf = Vec::new();
            let _ = p.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        }
        None => String::new(),
    }
}

/// SIGTERM the process group, give it half a second, then SIGKILL.
/// Windows delegates to `taskkill /F /T`.
async fn kill_process_tree(child: &mut Child) {
    let Some(pid) = child.id() else {
        let _ = child.kill().await;
        return;
    };
    #[cfg(unix)]
    {
        unsafe {
            libc::killpg(pid as i32, libc::SIGTERM);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        if matches!(child.try_wait(), Ok(None)) {
            unsafe {
                libc::killpg(pid as i32, libc::SIGKILL);
            }
        }
    }
    #[cfg(windows)]
    {
        let _ = Command::new("taskkill")
            .args(["/F", "/T", "/PID", &pid.to_string()])
            .output()
            .await;
        let _ = child.kill().await;
    }
}

fn exit_code(status: Option<std::process::ExitStatus>) -> i32 {
    let Some(status) = status else {
        return -1;
    };
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}
