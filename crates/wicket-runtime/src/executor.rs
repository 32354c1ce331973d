use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use wicket_core::WidgetInputs;

use crate::bundle::{BundleKind, StagedBundle, bundle_digest};
use crate::error::RuntimeError;
use crate::python::PythonRuntime;
use crate::registry::InvocationRegistry;
use crate::runtime::{ExecutionLimits, WidgetRuntime};
use crate::wasm::WasmRuntime;

/// Settings for [`WidgetExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Where bundles are staged while they run.
    pub work_dir: PathBuf,
    /// Interpreter used for Python bundles.
    pub python_interpreter: String,
    /// Upper bound on one invocation. `None` waits for the widget to finish.
    pub timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("wicket"),
            python_interpreter: "python3".into(),
            timeout: None,
        }
    }
}

/// Runs widget bundles, one isolated invocation per call.
///
/// Safe to share across tasks: every call takes its own identity from the
/// registry and stages its own copy of the bundle, so concurrent calls
/// (including calls for the same widget) never see each other's module,
/// files, or results.
pub struct WidgetExecutor {
    runtimes: Vec<Arc<dyn WidgetRuntime>>,
    registry: Arc<InvocationRegistry>,
    work_dir: PathBuf,
    timeout: Option<Duration>,
}

impl WidgetExecutor {
    /// Build an executor with the WASM and Python runtimes.
    pub fn new(config: ExecutorConfig) -> Result<Self, RuntimeError> {
        let wasm = WasmRuntime::new()?;
        let python = PythonRuntime::new().with_interpreter(config.python_interpreter);
        // Python runs in the host's cwd, so staged paths must not be relative.
        let work_dir = std::path::absolute(&config.work_dir)?;

        Ok(Self {
            runtimes: vec![Arc::new(wasm), Arc::new(python)],
            registry: Arc::new(InvocationRegistry::new()),
            work_dir,
            timeout: config.timeout,
        })
    }

    /// Register an extra runtime. It takes precedence over the built-in ones
    /// for the kinds it supports.
    pub fn with_runtime(mut self, runtime: Arc<dyn WidgetRuntime>) -> Self {
        self.runtimes.insert(0, runtime);
        self
    }

    pub fn registry(&self) -> &Arc<InvocationRegistry> {
        &self.registry
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run `code` against `inputs` and return the widget's output text.
    ///
    /// The staged bundle and the registry entry are released before this
    /// returns, on success, failure, and timeout alike.
    pub async fn execute(&self, code: &str, inputs: &WidgetInputs) -> Result<String, RuntimeError> {
        let kind = BundleKind::detect(code);
        let runtime = self.runtime_for(kind)?;

        let lease = self.registry.acquire(kind, bundle_digest(code));
        let started = Instant::now();
        tracing::debug!(
            invocation = %lease.id(),
            %kind,
            runtime = runtime.name(),
            "Starting widget invocation"
        );

        let mut bundle = StagedBundle::write(&self.work_dir, lease.id(), kind, code).await?;
        let limits = ExecutionLimits {
            timeout: self.timeout,
        };

        let invocation = runtime.invoke(&mut bundle, inputs, limits);
        let result = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, invocation).await {
                Ok(result) => result,
                Err(_) => Err(RuntimeError::Timeout(timeout)),
            },
            None => invocation.await,
        };

        drop(bundle);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(output) => tracing::info!(
                invocation = %lease.id(),
                %kind,
                elapsed_ms,
                output_len = output.len(),
                "Widget invocation finished"
            ),
            Err(e) => tracing::warn!(
                invocation = %lease.id(),
                %kind,
                elapsed_ms,
                "Widget invocation failed: {e}"
            ),
        }
        drop(lease);

        result
    }

    fn runtime_for(&self, kind: BundleKind) -> Result<&Arc<dyn WidgetRuntime>, RuntimeError> {
        self.runtimes
            .iter()
            .find(|runtime| runtime.supports(kind))
            .ok_or_else(|| RuntimeError::LoadError(format!("no runtime accepts {kind} bundles")))
    }
}

impl std::fmt::Debug for WidgetExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.runtimes.iter().map(|r| r.name()).collect();
        f.debug_struct("WidgetExecutor")
            .field("runtimes", &names)
            .field("work_dir", &self.work_dir)
            .field("timeout", &self.timeout)
            .finish()
    }
}
