//! MATLAB engine binding driving a `matlab -nodesktop` child process
//!
//! Each call is written to a scratch `.m` script on the MATLAB path and
//! invoked by name, so the current folder is left alone. A one-line
//! `try/catch` wrapper prints a numbered completion marker:
//!
//! ```text
//! <<<MLH:7:OK>>>
//! <<<MLH:7:ERR>>>Undefined function or variable 'foo'.
//! ```
//!
//! Everything printed before the marker is the cell's stdout. Values are
//! returned through `jsonencode` on a `<<<MLH:VAL>>>` line.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use super::{quote, Engine, EngineError, EngineValue, EvalOutput, Handle, LastWarning};

/// Marker prefix for completion and value lines
const MARKER: &str = "<<<MLH:";
const VALUE_MARKER: &str = "<<<MLH:VAL>>>";

/// Grace period for `exit` before the process is killed
const QUIT_TIMEOUT: Duration = Duration::from_secs(5);

/// A MATLAB session in a child process
pub struct MatlabProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr: Arc<Mutex<String>>,
    scratch: TempDir,
    sequence: u64,
}

impl MatlabProcess {
    /// Spawn MATLAB and wait until it answers a first command
    pub async fn launch(binary: &Path, startup_timeout: Duration) -> Result<Self, EngineError> {
        debug!(binary = %binary.display(), "launching MATLAB");

        let mut child = Command::new(binary)
            .args(["-nodesktop", "-nosplash"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::host(format!("failed to spawn {}: {}", binary.display(), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::host("MATLAB stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::host("MATLAB stdout unavailable"))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::host("MATLAB stderr unavailable"))?;

        // Drain stderr continuously so the child never blocks on a full pipe
        let stderr = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&stderr);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr_pipe).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let mut buf = sink.lock();
                buf.push_str(&line);
                buf.push('\n');
            }
        });

        let scratch = tempfile::Builder::new()
            .prefix("mlh_")
            .tempdir()
            .map_err(|e| EngineError::host(format!("failed to create scratch directory: {}", e)))?;

        let mut process = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            stderr,
            scratch,
            sequence: 0,
        };

        let scratch_dir = process.scratch.path().to_string_lossy().into_owned();
        let addpath = format!("addpath({});\n", quote(&scratch_dir));
        process
            .stdin
            .write_all(addpath.as_bytes())
            .await
            .map_err(|e| EngineError::host(format!("failed to send code to MATLAB: {}", e)))?;

        let ready = tokio::time::timeout(startup_timeout, process.run_cell("format long", false)).await;
        match ready {
            Ok(Ok(_)) => Ok(process),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(EngineError::host(format!(
                "MATLAB did not become ready within {}s",
                startup_timeout.as_secs()
            ))),
        }
    }

    /// Run one code cell and wait for its completion marker
    async fn run_cell(&mut self, code: &str, capture: bool) -> Result<EvalOutput, EngineError> {
        self.sequence += 1;
        let n = self.sequence;
        let path = self.scratch.path().join(format!("{}.m", cell_name(n)));
        tokio::fs::write(&path, code)
            .await
            .map_err(|e| EngineError::host(format!("failed to write {}: {}", path.display(), e)))?;

        self.stderr.lock().clear();
        let command = cell_command(n);
        self.stdin
            .write_all(command.as_bytes())
            .await
            .map_err(|e| EngineError::host(format!("failed to send code to MATLAB: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| EngineError::host(format!("failed to send code to MATLAB: {}", e)))?;

        let ok = format!("{}{}:OK>>>", MARKER, n);
        let err = format!("{}{}:ERR>>>", MARKER, n);
        let mut lines: Vec<String> = Vec::new();
        let outcome = loop {
            let line = self
                .stdout
                .next_line()
                .await
                .map_err(|e| EngineError::host(format!("failed to read MATLAB output: {}", e)))?
                .ok_or_else(|| EngineError::host("MATLAB process exited"))?;
            let line = strip_prompts(&line);

            if line.contains(&ok) {
                break None;
            }
            if let Some(pos) = line.find(&err) {
                break Some(line[pos + err.len()..].trim().to_string());
            }
            lines.push(line.to_string());
        };

        if let Err(e) = tokio::fs::remove_file(&path).await {
            debug!(path = %path.display(), error = %e, "could not remove scratch cell");
        }

        // The marker is printed after a newline of its own
        if lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        let output = if capture {
            let mut stdout = lines.join("\n");
            if !stdout.is_empty() {
                stdout.push('\n');
            }
            EvalOutput::new(stdout, std::mem::take(&mut *self.stderr.lock()))
        } else {
            EvalOutput::default()
        };

        match outcome {
            None => Ok(output),
            Some(message) => Err(EngineError::Execution { message, output }),
        }
    }

    /// Evaluate `setup`, then return the JSON-encoded value of `expr`.
    /// `scratch` names the variables `setup` assigns.
    async fn query(
        &mut self,
        setup: &str,
        expr: &str,
        scratch: &[&str],
    ) -> Result<EngineValue, EngineError> {
        let code = query_code(setup, expr, scratch);
        let output = self.run_cell(&code, true).await?;
        let payload = output
            .stdout
            .lines()
            .find_map(|line| line.strip_prefix(VALUE_MARKER))
            .ok_or_else(|| EngineError::host(format!("no value returned for '{}'", expr)))?;
        let json: serde_json::Value = serde_json::from_str(payload.trim())
            .map_err(|e| EngineError::host(format!("unreadable value for '{}': {}", expr, e)))?;
        Ok(EngineValue::from_json(json))
    }
}

fn cell_name(n: u64) -> String {
    format!("mlh_cell_{}", n)
}

/// Command line that runs cell `n` from the path and reports completion
fn cell_command(n: u64) -> String {
    format!(
        "try, rehash; {cell}; fprintf('\\n{m}{n}:OK>>>\\n'); catch mlh_err, fprintf('\\n{m}{n}:ERR>>>%s\\n', strrep(mlh_err.message, newline, ' ')); clear mlh_err; end\n",
        cell = cell_name(n),
        m = MARKER,
        n = n,
    )
}

fn query_code(setup: &str, expr: &str, scratch: &[&str]) -> String {
    let mut cleanup = vec!["mlh_val"];
    cleanup.extend_from_slice(scratch);
    format!(
        "{setup}\nmlh_val = {expr};\nif isa(mlh_val, 'matlab.graphics.Graphics'), mlh_val = double(mlh_val); end\nfprintf('{marker}%s\\n', jsonencode(mlh_val));\nclear {cleanup}\n",
        setup = setup,
        expr = expr,
        marker = VALUE_MARKER,
        cleanup = cleanup.join(" "),
    )
}

fn strip_prompts(line: &str) -> &str {
    let mut rest = line;
    while let Some(stripped) = rest.strip_prefix(">> ") {
        rest = stripped;
    }
    rest
}

fn handle_expr(handle: Handle) -> String {
    if handle == Handle::ROOT {
        "groot".to_string()
    } else {
        format!("handle({})", handle)
    }
}

#[async_trait]
impl Engine for MatlabProcess {
    fn name(&self) -> &str {
        "matlab"
    }

    async fn version(&mut self) -> Result<String, EngineError> {
        let value = self.query("", "version", &[]).await?;
        Ok(value.to_string())
    }

    async fn eval(&mut self, code: &str, capture: bool) -> Result<EvalOutput, EngineError> {
        self.run_cell(code, capture).await
    }

    async fn eval_expression(&mut self, expr: &str) -> Result<EngineValue, EngineError> {
        self.query("", expr, &[]).await
    }

    async fn get_variable(&mut self, name: &str) -> Result<EngineValue, EngineError> {
        self.query("", name, &[]).await
    }

    async fn clear_variables(&mut self, names: Option<&[String]>) -> Result<(), EngineError> {
        let code = match names {
            Some(names) if !names.is_empty() => format!("clear {}", names.join(" ")),
            _ => "clear".to_string(),
        };
        self.run_cell(&code, false).await.map(|_| ())
    }

    async fn get_property(
        &mut self,
        handle: Handle,
        property: &str,
    ) -> Result<EngineValue, EngineError> {
        let expr = format!("get({}, {})", handle_expr(handle), quote(property));
        self.query("", &expr, &[]).await
    }

    async fn set_property(
        &mut self,
        handle: Handle,
        property: &str,
        value: EngineValue,
    ) -> Result<(), EngineError> {
        let code = format!(
            "set({}, {}, {});",
            handle_expr(handle),
            quote(property),
            value.to_matlab_literal()
        );
        self.run_cell(&code, false).await.map(|_| ())
    }

    async fn last_warning(&mut self) -> Result<LastWarning, EngineError> {
        let value = self
            .query(
                "[mlh_wm, mlh_wi] = lastwarn;",
                "{mlh_wm, mlh_wi}",
                &["mlh_wm", "mlh_wi"],
            )
            .await?;
        let mut texts = value.texts().into_iter();
        let message = texts.next().unwrap_or_default();
        let id = texts.next().unwrap_or_default();
        Ok(LastWarning::new(message, id))
    }

    async fn clear_last_warning(&mut self) -> Result<(), EngineError> {
        self.run_cell("lastwarn('');", false).await.map(|_| ())
    }

    async fn quit(&mut self) -> Result<(), EngineError> {
        if let Err(e) = self.stdin.write_all(b"exit\n").await {
            debug!(error = %e, "MATLAB stdin already closed");
        }
        match tokio::time::timeout(QUIT_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(%status, "MATLAB exited");
                Ok(())
            }
            Ok(Err(e)) => Err(EngineError::host(format!("failed to wait for MATLAB: {}", e))),
            Err(_) => {
                warn!("MATLAB did not exit in time; killing process");
                self.child
                    .kill()
                    .await
                    .map_err(|e| EngineError::host(format!("failed to kill MATLAB: {}", e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_prompts() {
        assert_eq!(strip_prompts(">> >> hello"), "hello");
        assert_eq!(strip_prompts("plain"), "plain");
    }

    #[test]
    fn test_cell_runs_by_name_without_changing_folder() {
        let command = cell_command(7);
        assert!(command.contains("mlh_cell_7;"));
        assert!(!command.contains("run("));
        assert!(!command.contains("cd("));
        assert!(command.contains("<<<MLH:7:OK>>>"));
        assert!(command.contains("<<<MLH:7:ERR>>>"));
        assert!(command.ends_with("end\n"));
    }

    #[test]
    fn test_query_clears_scratch_variables() {
        let code = query_code(
            "[mlh_wm, mlh_wi] = lastwarn;",
            "{mlh_wm, mlh_wi}",
            &["mlh_wm", "mlh_wi"],
        );
        assert!(code.starts_with("[mlh_wm, mlh_wi] = lastwarn;\n"));
        assert!(code.ends_with("clear mlh_val mlh_wm mlh_wi\n"));

        let plain = query_code("", "version", &[]);
        assert!(plain.ends_with("clear mlh_val\n"));
    }

    #[test]
    fn test_handle_expr() {
        assert_eq!(handle_expr(Handle::ROOT), "groot");
        assert_eq!(handle_expr(Handle::from(2)), "handle(2)");
    }

    #[tokio::test]
    async fn test_launch_missing_binary_is_host_error() {
        let err = MatlabProcess::launch(
            Path::new("/nonexistent/matlab-binary"),
            Duration::from_secs(1),
        )
        .await
        .err()
        .unwrap();
        assert!(!err.is_execution());
    }
}
