//! Shell script hook.
//!
//! [`ShellHook`] spawns `bash` with the configured script, pipes the
//! JSON-encoded event to stdin, and captures stdout/stderr into the task's
//! output sink. A non-zero exit code or an expired timeout fails the hook.
//!
//! The child also receives the run context as environment variables:
//! `STRATA_RUN_ID`, `STRATA_HOOK_RUN_ID`, `STRATA_ACTION_NAME`,
//! `STRATA_HOOK_ID`, `STRATA_EVENT_TYPE`, `STRATA_REPOSITORY_ID`,
//! `STRATA_BRANCH_ID` and `STRATA_SOURCE_REF`.
//!
//! Properties:
//!
//! | Property       | Required | Default |
//! |----------------|----------|---------|
//! | `script_path`  | yes      |         |
//! | `args`         | no       | none    |
//! | `env`          | no       | none    |
//! | `timeout_secs` | no       | `300`   |

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use strata_core::action::ActionHook;
use strata_core::event::Event;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use super::{parse_properties, Hook, HookConfigError, HookError};
use crate::output::HookOutputWriter;

/// Type tag of this hook in action definitions.
pub const HOOK_TYPE: &str = "shell";

/// Script timeout when the declaration sets none.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Maximum stdout or stderr size captured per stream (10 MiB).
const MAX_OUTPUT_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct ShellProperties {
    script_path: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

/// Runs a local script for each event.
#[derive(Debug, Clone)]
pub struct ShellHook {
    script_path: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    timeout: Duration,
}

/// Captured result of a finished script.
struct ScriptOutput {
    stdout: String,
    stderr: String,
    exit_code: i32,
    duration_ms: u64,
}

impl ShellHook {
    /// Build from a hook declaration.
    ///
    /// The script's existence is checked at run time, not here.
    pub fn from_declaration(hook: &ActionHook) -> Result<Self, HookConfigError> {
        let props: ShellProperties = parse_properties(hook)?;
        if props.script_path.trim().is_empty() {
            return Err(HookConfigError::InvalidProperties(
                "script_path must not be empty".to_string(),
            ));
        }
        let timeout = match props.timeout_secs {
            Some(0) => {
                return Err(HookConfigError::InvalidProperties(
                    "timeout_secs must be positive".to_string(),
                ))
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_TIMEOUT,
        };
        Ok(Self {
            script_path: PathBuf::from(props.script_path),
            args: props.args,
            env: props.env,
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn command(&self, event: &Event, output: &HookOutputWriter) -> Command {
        let mut cmd = Command::new("bash");
        cmd.arg(&self.script_path).args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd.env("STRATA_RUN_ID", output.run_id())
            .env("STRATA_HOOK_RUN_ID", output.hook_run_id())
            .env("STRATA_ACTION_NAME", output.action_name())
            .env("STRATA_HOOK_ID", output.hook_id())
            .env("STRATA_EVENT_TYPE", event.event_type.as_str())
            .env("STRATA_REPOSITORY_ID", &event.repository_id)
            .env("STRATA_BRANCH_ID", &event.branch_id)
            .env("STRATA_SOURCE_REF", &event.source_ref);
        cmd
    }

    /// Spawn the script, feed `input` on stdin, wait for it to exit, and
    /// drain its output, all within the timeout.
    ///
    /// A background process that inherits stdout keeps the stream open after
    /// the script exits; that counts against the timeout too. On timeout the
    /// child is dropped, and `kill_on_drop` kills it.
    async fn execute(&self, mut cmd: Command, input: Vec<u8>) -> Result<ScriptOutput, HookError> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let mut child = cmd.spawn()?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let feed = async move {
            if let Some(mut stdin) = stdin {
                // The script may exit without reading stdin.
                let _ = stdin.write_all(&input).await;
            }
        };
        let run = async {
            let ((), stdout, stderr, status) =
                tokio::join!(feed, read_stream(stdout), read_stream(stderr), child.wait());
            status.map(|status| (status, stdout, stderr))
        };

        match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok((status, stdout, stderr))) => Ok(ScriptOutput {
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                exit_code: status.code().unwrap_or(-1),
                duration_ms: start.elapsed().as_millis() as u64,
            }),
            Ok(Err(e)) => Err(HookError::Io(e)),
            Err(_elapsed) => Err(HookError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl Hook for ShellHook {
    async fn run(&self, event: &Event, output: &HookOutputWriter) -> Result<(), HookError> {
        if !tokio::fs::try_exists(&self.script_path).await.unwrap_or(false) {
            return Err(HookError::ScriptNotFound(
                self.script_path.display().to_string(),
            ));
        }

        let input = serde_json::to_vec(event)?;
        let cmd = self.command(event, output);

        let result = match self.execute(cmd, input).await {
            Ok(result) => result,
            Err(e) => {
                let log = format!("Script: {}\n\n{e}\n", self.script_path.display());
                output.write(log.as_bytes()).await?;
                return Err(e);
            }
        };

        let log = format!(
            "Script: {}\nExit code: {}\nDuration: {}ms\n\n--- stdout ---\n{}\n--- stderr ---\n{}\n",
            self.script_path.display(),
            result.exit_code,
            result.duration_ms,
            result.stdout,
            result.stderr,
        );
        output.write(log.as_bytes()).await?;

        if result.exit_code != 0 {
            tracing::debug!(
                run_id = output.run_id(),
                hook_id = output.hook_id(),
                exit_code = result.exit_code,
                "Shell hook exited with failure"
            );
            return Err(HookError::ExitStatus {
                exit_code: result.exit_code,
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Read an entire output stream, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use serde_json::json;
    use strata_core::event::EventType;

    use super::*;
    use crate::output::MemoryOutputWriter;

    /// Create a temporary shell script from the given body.
    fn write_temp_script(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new()
            .suffix(".sh")
            .tempfile()
            .expect("create temp file");
        writeln!(f, "#!/bin/bash").expect("write shebang");
        write!(f, "{body}").expect("write body");
        f.flush().expect("flush script");
        f
    }

    fn hook_for(script: &tempfile::NamedTempFile, extra: serde_json::Value) -> ShellHook {
        let mut properties = serde_json::Map::new();
        properties.insert(
            "script_path".to_string(),
            json!(script.path().to_str().expect("path")),
        );
        if let serde_json::Value::Object(extra) = extra {
            properties.extend(extra);
        }
        let decl = ActionHook {
            id: "script".to_string(),
            hook_type: HOOK_TYPE.to_string(),
            description: None,
            properties,
        };
        ShellHook::from_declaration(&decl).expect("valid declaration")
    }

    fn output(sink: Arc<MemoryOutputWriter>) -> HookOutputWriter {
        HookOutputWriter::new("r1", "hr1", "check", "script", sink)
    }

    fn event() -> Event {
        Event::new(EventType::PreMerge, "repo", "feature/x", "main")
    }

    #[tokio::test]
    async fn test_shell_reads_event_from_stdin() {
        let script = write_temp_script("cat\n");
        let hook = hook_for(&script, json!({}));
        let sink = Arc::new(MemoryOutputWriter::new());
        let out = output(sink.clone());

        hook.run(&event(), &out).await.expect("run");

        let log = String::from_utf8(sink.get(&out.path()).unwrap()).unwrap();
        assert!(log.contains("\"pre-merge\""));
        assert!(log.contains("Exit code: 0"));
    }

    #[tokio::test]
    async fn test_shell_env_and_args() {
        let script = write_temp_script("echo \"$MY_VAR $STRATA_BRANCH_ID $1\"\n");
        let hook = hook_for(
            &script,
            json!({ "env": { "MY_VAR": "hello" }, "args": ["first"] }),
        );
        let sink = Arc::new(MemoryOutputWriter::new());
        let out = output(sink.clone());

        hook.run(&event(), &out).await.expect("run");

        let log = String::from_utf8(sink.get(&out.path()).unwrap()).unwrap();
        assert!(log.contains("hello feature/x first"));
    }

    #[tokio::test]
    async fn test_shell_nonzero_exit_fails() {
        let script = write_temp_script("echo bad input >&2\nexit 3\n");
        let hook = hook_for(&script, json!({}));
        let sink = Arc::new(MemoryOutputWriter::new());

        let result = hook.run(&event(), &output(sink)).await;
        assert_matches!(
            result,
            Err(HookError::ExitStatus { exit_code: 3, stderr }) if stderr == "bad input"
        );
    }

    #[tokio::test]
    async fn test_shell_timeout_kills_script() {
        let script = write_temp_script("sleep 30\n");
        let hook = hook_for(&script, json!({ "timeout_secs": 1 }));
        let sink = Arc::new(MemoryOutputWriter::new());
        let out = output(sink.clone());

        let result = hook.run(&event(), &out).await;
        assert_matches!(result, Err(HookError::Timeout { .. }));
        assert!(sink.get(&out.path()).is_some());
    }

    #[tokio::test]
    async fn test_shell_timeout_covers_background_output() {
        let script = write_temp_script("sleep 5 &\nexit 0\n");
        let hook = hook_for(&script, json!({ "timeout_secs": 1 }));
        let sink = Arc::new(MemoryOutputWriter::new());

        let started = Instant::now();
        let result = hook.run(&event(), &output(sink)).await;
        assert_matches!(result, Err(HookError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_shell_timeout_covers_unread_stdin() {
        let script = write_temp_script("sleep 30\n");
        let hook = hook_for(&script, json!({ "timeout_secs": 1 }));
        let sink = Arc::new(MemoryOutputWriter::new());
        let large = event().with_commit("x".repeat(4 * 1024 * 1024), "committer");

        let started = Instant::now();
        let result = hook.run(&large, &output(sink)).await;
        assert_matches!(result, Err(HookError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_shell_missing_script() {
        let decl = ActionHook {
            id: "script".to_string(),
            hook_type: HOOK_TYPE.to_string(),
            description: None,
            properties: match json!({ "script_path": "/nonexistent/strata-hook.sh" }) {
                serde_json::Value::Object(map) => map,
                _ => unreachable!(),
            },
        };
        let hook = ShellHook::from_declaration(&decl).unwrap();
        let sink = Arc::new(MemoryOutputWriter::new());
        assert_matches!(
            hook.run(&event(), &output(sink)).await,
            Err(HookError::ScriptNotFound(_))
        );
    }

    #[test]
    fn test_shell_rejects_zero_timeout() {
        let decl = ActionHook {
            id: "script".to_string(),
            hook_type: HOOK_TYPE.to_string(),
            description: None,
            properties: match json!({ "script_path": "x.sh", "timeout_secs": 0 }) {
                serde_json::Value::Object(map) => map,
                _ => unreachable!(),
            },
        };
        assert_matches!(
            ShellHook::from_declaration(&decl),
            Err(HookConfigError::InvalidProperties(_))
        );
    }
}
