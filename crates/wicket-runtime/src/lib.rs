//! Widget executor for Wicket.
//!
//! [`WidgetExecutor`] runs one widget bundle against one input mapping:
//!
//! 1. detect the bundle kind ([`BundleKind`])
//! 2. take a unique invocation identity from the process-wide
//!    [`InvocationRegistry`]
//! 3. stage the bundle on disk under that identity ([`StagedBundle`])
//! 4. hand it to the matching [`WidgetRuntime`] and collect the result
//! 5. drop the staged files and the registry entry, whatever the outcome
//!
//! Two runtimes ship with the crate: [`WasmRuntime`] (Wasmtime, core
//! modules in text or base64 binary form) and [`PythonRuntime`] (a child
//! interpreter process).
//!
//! # Trust boundary
//!
//! Widget code runs with the privileges of the host process. The WASM
//! runtime preopens the host root and inherits the environment; the Python
//! runtime is an ordinary child process. Nothing here is a sandbox.
//!
//! ```rust,no_run
//! use wicket_core::WidgetInputs;
//! use wicket_runtime::{ExecutorConfig, WidgetExecutor};
//!
//! # async fn run() -> Result<(), wicket_runtime::RuntimeError> {
//! let executor = WidgetExecutor::new(ExecutorConfig::default())?;
//! let inputs = WidgetInputs::new().with_text("a", "2").with_text("b", "3");
//! let output = executor
//!     .execute("def run_widget(inputs):\n    return int(inputs['a']) + int(inputs['b'])\n", &inputs)
//!     .await?;
//! assert_eq!(output, "5");
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod error;
pub mod executor;
pub mod host;
pub mod python;
pub mod registry;
pub mod runtime;
pub mod runtime_context;
pub mod wasm;
pub mod widget_state;

pub use bundle::{BundleKind, StagedBundle};
pub use error::RuntimeError;
pub use executor::{ExecutorConfig, WidgetExecutor};
pub use python::PythonRuntime;
pub use registry::{InvocationId, InvocationInfo, InvocationLease, InvocationRegistry};
pub use runtime::{ExecutionLimits, RuntimeFuture, WidgetRuntime};
pub use wasm::WasmRuntime;

/// Name of the single function every widget bundle must expose.
pub const ENTRY_POINT: &str = "run_widget";
