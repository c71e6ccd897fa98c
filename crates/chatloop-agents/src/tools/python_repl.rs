use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chatloop_common::{Error, Result};
use serde_json::json;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{Tool, ToolContext, ToolOutput, string_arg};

const TOOL_NAME: &str = "python_repl";

/// Runs a code snippet in a fresh interpreter process (`<interpreter> -c <code>`).
///
/// No sandboxing beyond the wall-clock timeout; the child is killed if the
/// timeout fires or the turn is dropped.
pub struct PythonReplTool {
    interpreter: String,
    timeout: Duration,
}

impl PythonReplTool {
    pub fn new(interpreter: String, timeout: Duration) -> Self {
        Self {
            interpreter,
            timeout,
        }
    }

    fn failure(reason: impl Into<String>) -> Error {
        Error::ToolInvocation {
            name: TOOL_NAME.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Tool for PythonReplTool {
    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    fn description(&self) -> &'static str {
        "Execute Python code and return what it prints. Use this for calculations \
         or data manipulation. The input must be valid Python; print any value \
         you want to see."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Python source to run"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, _context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let code = string_arg(TOOL_NAME, &args, "code")?;
        debug!(interpreter = %self.interpreter, bytes = code.len(), "running code");

        let child = Command::new(&self.interpreter)
            .arg("-c")
            .arg(&code)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Self::failure(format!("failed to start {}: {e}", self.interpreter)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                warn!(timeout = ?self.timeout, "code execution timed out");
                Self::failure(format!("timed out after {}s", self.timeout.as_secs()))
            })?
            .map_err(|e| Self::failure(format!("failed to collect output: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        if output.status.success() {
            return Ok(ToolOutput::success(stdout));
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        let detail = if stderr.is_empty() { stdout } else { stderr };
        Ok(ToolOutput::error(format!("{} ({})", detail, output.status)))
    }
}
