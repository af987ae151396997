//! Subprocess sandbox for CODE nodes.
//!
//! Runs user code in a fresh `python3` / `node` process with a cleared
//! environment. Inputs arrive as JSON on stdin and are exposed as `inputs`;
//! the code assigns `result`, which the wrapper prints on a marker line.
//! Everything else written to stdout is collected as logs.
//!
//! A static denylist rejects code that reaches for the filesystem, process
//! control or dynamic evaluation before anything is spawned. This is a
//! guard rail for trusted authors, not an isolation boundary.

use std::process::Stdio;
use std::time::Duration;

use futures_util::future::BoxFuture;
use nodeflow_core::sandbox::{CodeSandbox, SandboxError, SandboxOutput, SandboxRequest};
use nodeflow_types::config::SandboxSection;
use nodeflow_types::node::CodeLanguage;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::ChildStdin;

const RESULT_MARKER: &str = "__NODEFLOW_RESULT__";

/// Stderr kept for error messages; the rest is drained and dropped.
const STDERR_TAIL_BYTES: usize = 8 * 1024;

const PYTHON_DENYLIST: &[&str] = &[
    "import os",
    "from os",
    "import sys",
    "from sys",
    "import subprocess",
    "from subprocess",
    "import socket",
    "import shutil",
    "__import__",
    "eval(",
    "exec(",
    "open(",
    "compile(",
];

const JAVASCRIPT_DENYLIST: &[&str] = &[
    "require(",
    "import(",
    "process.",
    "child_process",
    "eval(",
    "Function(",
    "globalThis",
];

const PYTHON_PRELUDE: &str = "import json as __nf_json, sys as __nf_sys\n\
inputs = __nf_json.loads(__nf_sys.stdin.read() or '{}')\n\
result = None\n";

const PYTHON_EPILOGUE: &str = "\nprint('__NODEFLOW_RESULT__' + __nf_json.dumps(result, ensure_ascii=False, default=str))\n";

const JAVASCRIPT_PRELUDE: &str = "const inputs = JSON.parse(require('fs').readFileSync(0, 'utf8') || '{}');\n\
var result = null;\n";

const JAVASCRIPT_EPILOGUE: &str = "\nconsole.log('__NODEFLOW_RESULT__' + JSON.stringify(result === undefined ? null : result));\n";

#[derive(Debug, Clone)]
pub struct SubprocessSandbox {
    config: SandboxSection,
}

impl SubprocessSandbox {
    pub fn new(config: SandboxSection) -> Self {
        Self { config }
    }

    async fn run(&self, request: &SandboxRequest) -> Result<SandboxOutput, SandboxError> {
        check_denylist(request.language, &request.code)?;

        let (program, flag, script) = match request.language {
            CodeLanguage::Python => (
                &self.config.python_bin,
                "-c",
                format!("{PYTHON_PRELUDE}{}{PYTHON_EPILOGUE}", request.code),
            ),
            CodeLanguage::Javascript => (
                &self.config.node_bin,
                "-e",
                format!("{JAVASCRIPT_PRELUDE}{}{JAVASCRIPT_EPILOGUE}", request.code),
            ),
        };
        let inputs = serde_json::to_vec(&request.inputs)
            .map_err(|e| SandboxError::Runtime(format!("inputs are not serialisable: {e}")))?;

        let mut command = tokio::process::Command::new(program);
        command
            .arg(flag)
            .arg(&script)
            .env_clear()
            .current_dir(std::env::temp_dir())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Ok(path) = std::env::var("PATH") {
            command.env("PATH", path);
        }

        let mut child = command.spawn().map_err(|e| {
            SandboxError::Unavailable(format!("failed to start {program}: {e}"))
        })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = self.config.max_output_bytes;
        let timeout_secs = request.timeout_secs.unwrap_or(self.config.timeout_secs);

        let exchange = async {
            let ((), stdout, stderr) = tokio::try_join!(
                feed(stdin, &inputs),
                read_capped(stdout, limit),
                read_tail(stderr, STDERR_TAIL_BYTES),
            )?;
            let status = child
                .wait()
                .await
                .map_err(|e| SandboxError::Runtime(format!("failed to wait for {program}: {e}")))?;
            Ok::<_, SandboxError>((status, stdout, stderr))
        };
        let outcome = tokio::time::timeout(Duration::from_secs(timeout_secs), exchange)
            .await
            .unwrap_or(Err(SandboxError::Timeout(timeout_secs)));
        let (status, stdout, stderr) = match outcome {
            Ok(parts) => parts,
            Err(e) => {
                if let Err(kill) = child.kill().await {
                    tracing::debug!(error = %kill, "sandboxed process already exited");
                }
                return Err(e);
            }
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(SandboxError::Runtime(format!(
                "{} exited with {}: {}",
                request.language.as_str(),
                status,
                tail(stderr.trim(), 500)
            )));
        }

        let stdout = String::from_utf8_lossy(&stdout);
        let parsed = parse_output(&stdout, self.config.max_log_lines)?;
        tracing::debug!(
            language = request.language.as_str(),
            logs = parsed.logs.len(),
            "sandboxed code finished"
        );
        Ok(parsed)
    }
}

impl CodeSandbox for SubprocessSandbox {
    fn execute<'a>(
        &'a self,
        request: &'a SandboxRequest,
    ) -> BoxFuture<'a, Result<SandboxOutput, SandboxError>> {
        Box::pin(self.run(request))
    }
}

/// Write the inputs and close stdin.
async fn feed(stdin: Option<ChildStdin>, inputs: &[u8]) -> Result<(), SandboxError> {
    if let Some(mut stdin) = stdin {
        // A script that never reads stdin may close it early.
        stdin.write_all(inputs).await.ok();
    }
    Ok(())
}

/// Read a pipe to EOF, failing as soon as it yields more than `limit` bytes.
async fn read_capped<R>(pipe: Option<R>, limit: usize) -> Result<Vec<u8>, SandboxError>
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return Ok(Vec::new());
    };
    let mut buf = Vec::new();
    let mut reader = pipe.take(limit as u64 + 1);
    reader
        .read_to_end(&mut buf)
        .await
        .map_err(|e| SandboxError::Runtime(format!("failed to read output: {e}")))?;
    if buf.len() > limit {
        return Err(SandboxError::OutputTooLarge { limit });
    }
    Ok(buf)
}

/// Drain a pipe to EOF, keeping only its last `keep` bytes.
async fn read_tail<R>(pipe: Option<R>, keep: usize) -> Result<Vec<u8>, SandboxError>
where
    R: AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return Ok(Vec::new());
    };
    let mut kept = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = pipe
            .read(&mut chunk)
            .await
            .map_err(|e| SandboxError::Runtime(format!("failed to read stderr: {e}")))?;
        if n == 0 {
            break;
        }
        kept.extend_from_slice(&chunk[..n]);
        if kept.len() > keep {
            kept.drain(..kept.len() - keep);
        }
    }
    Ok(kept)
}

fn check_denylist(language: CodeLanguage, code: &str) -> Result<(), SandboxError> {
    let denylist = match language {
        CodeLanguage::Python => PYTHON_DENYLIST,
        CodeLanguage::Javascript => JAVASCRIPT_DENYLIST,
    };
    match denylist.iter().find(|pattern| code.contains(*pattern)) {
        Some(pattern) => Err(SandboxError::SecurityViolation(format!(
            "'{pattern}' is not allowed in {} code",
            language.as_str()
        ))),
        None => Ok(()),
    }
}

/// Split stdout into the marker result and up to `max_logs` log lines.
fn parse_output(stdout: &str, max_logs: usize) -> Result<SandboxOutput, SandboxError> {
    let mut result = None;
    let mut logs = Vec::new();
    for line in stdout.lines() {
        if let Some(json) = line.strip_prefix(RESULT_MARKER) {
            result = Some(json);
        } else if logs.len() < max_logs {
            logs.push(line.to_string());
        }
    }

    let result = match result {
        Some(json) => serde_json::from_str::<Value>(json)
            .map_err(|e| SandboxError::Runtime(format!("result is not valid JSON: {e}")))?,
        None => {
            return Err(SandboxError::Runtime(
                "code finished without producing a result".into(),
            ));
        }
    };
    Ok(SandboxOutput { result, logs })
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max_chars)).collect()
}
