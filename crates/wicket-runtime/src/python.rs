use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use wicket_core::WidgetInputs;

use crate::bundle::{BundleKind, StagedBundle};
use crate::error::RuntimeError;
use crate::runtime::{ExecutionLimits, RuntimeFuture, WidgetRuntime};

const HARNESS: &str = include_str!("python/harness.py");

const EXIT_OK: i32 = 0;
const EXIT_LOAD_ERROR: i32 = 3;
const EXIT_MISSING_ENTRY_POINT: i32 = 4;
const EXIT_EXECUTION_FAILURE: i32 = 5;

/// What the harness writes to the result sidecar.
#[derive(Debug, Default, Deserialize)]
struct HarnessReport {
    output: Option<String>,
    error: Option<String>,
}

/// Runs Python bundles in a child interpreter.
///
/// Each invocation is its own process: the bundle is imported under the
/// invocation's unique module name and removed from `sys.modules` before
/// the harness exits. The child is killed if the invocation is abandoned.
#[derive(Debug, Clone)]
pub struct PythonRuntime {
    interpreter: String,
    working_dir: Option<PathBuf>,
}

impl PythonRuntime {
    pub fn new() -> Self {
        Self {
            interpreter: "python3".into(),
            working_dir: None,
        }
    }

    /// Override the interpreter binary (default `python3`).
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Directory widget code runs in. Defaults to the host's current
    /// directory, so relative paths such as `database/widgets.db` resolve the
    /// same way for widgets as for the host.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    async fn run(
        &self,
        bundle: &mut StagedBundle,
        inputs: &WidgetInputs,
    ) -> Result<String, RuntimeError> {
        let result_path = bundle.sidecar("result.json");
        let module_name = bundle.invocation_id().to_string();
        let stdin_json = serde_json::to_vec(&inputs.to_text_map())?;

        let mut command = tokio::process::Command::new(&self.interpreter);
        command
            .arg("-c")
            .arg(HARNESS)
            .arg(bundle.path())
            .arg(&module_name)
            .arg(&result_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            RuntimeError::LoadError(format!("cannot start {}: {e}", self.interpreter))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // The harness may already have exited; its status tells us why.
            if let Err(e) = stdin.write_all(&stdin_json).await {
                tracing::debug!(module_name, "Could not write widget inputs: {e}");
            }
        }

        let output = child.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.is_empty() || !stderr.is_empty() {
            tracing::debug!(module_name, %stdout, %stderr, "Widget stdio");
        }

        let report = read_report(&result_path).await;
        let detail = |report: HarnessReport| {
            report
                .error
                .unwrap_or_else(|| format!("{module_name}: {}", stderr.trim()))
        };

        match output.status.code() {
            Some(EXIT_OK) => report.output.ok_or_else(|| {
                RuntimeError::ExecutionFailure(format!("{module_name}: harness reported no output"))
            }),
            Some(EXIT_LOAD_ERROR) => Err(RuntimeError::LoadError(detail(report))),
            Some(EXIT_MISSING_ENTRY_POINT) => Err(RuntimeError::MissingEntryPoint(detail(report))),
            Some(EXIT_EXECUTION_FAILURE) => Err(RuntimeError::ExecutionFailure(detail(report))),
            _ => Err(RuntimeError::ExecutionFailure(format!(
                "{module_name}: interpreter exited with {}: {}",
                output.status,
                stderr.trim()
            ))),
        }
    }
}

impl Default for PythonRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl WidgetRuntime for PythonRuntime {
    fn supports(&self, kind: BundleKind) -> bool {
        kind == BundleKind::Python
    }

    fn invoke<'a>(
        &'a self,
        bundle: &'a mut StagedBundle,
        inputs: &'a WidgetInputs,
        _limits: ExecutionLimits,
    ) -> RuntimeFuture<'a> {
        Box::pin(self.run(bundle, inputs))
    }

    fn name(&self) -> &str {
        "python"
    }
}

async fn read_report(path: &Path) -> HarnessReport {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), "Unreadable harness report: {e}");
            HarnessReport::default()
        }),
        Err(_) => HarnessReport::default(),
    }
}
