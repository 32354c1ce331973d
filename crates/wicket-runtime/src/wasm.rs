use std::path::Path;
use std::sync::Arc;

use wasmtime::{Module, Store, Trap};
use wicket_core::WidgetInputs;

use crate::ENTRY_POINT;
use crate::bundle::{BundleKind, StagedBundle};
use crate::error::RuntimeError;
use crate::runtime::{ExecutionLimits, RuntimeFuture, WidgetRuntime};
use crate::runtime_context::{RuntimeContext, deadline_ticks};
use crate::widget_state::WidgetState;

/// Runs WebAssembly core modules.
///
/// A bundle must export `memory` and `run_widget: () -> ()`; it talks to the
/// host through the `widget` import module (see [`crate::host`]). Every call
/// compiles the staged file and instantiates it in its own `Store`.
pub struct WasmRuntime {
    ctx: Arc<RuntimeContext>,
}

impl WasmRuntime {
    pub fn new() -> Result<Self, RuntimeError> {
        let ctx = RuntimeContext::new()
            .map_err(|e| RuntimeError::LoadError(format!("cannot initialize Wasmtime: {e:#}")))?;
        Ok(Self { ctx: Arc::new(ctx) })
    }
}

impl WidgetRuntime for WasmRuntime {
    fn supports(&self, kind: BundleKind) -> bool {
        matches!(kind, BundleKind::WasmText | BundleKind::WasmBinary)
    }

    fn invoke<'a>(
        &'a self,
        bundle: &'a mut StagedBundle,
        inputs: &'a WidgetInputs,
        limits: ExecutionLimits,
    ) -> RuntimeFuture<'a> {
        Box::pin(async move {
            let ctx = Arc::clone(&self.ctx);
            let path = bundle.path().to_path_buf();
            let program = bundle.invocation_id().to_string();
            let inputs = inputs.clone();

            // Wasmtime execution is synchronous
            tokio::task::spawn_blocking(move || run_module(&ctx, &path, &program, inputs, limits))
                .await
                .map_err(|e| RuntimeError::ExecutionFailure(format!("task join error: {e}")))?
        })
    }

    fn name(&self) -> &str {
        "wasm"
    }
}

fn run_module(
    ctx: &RuntimeContext,
    path: &Path,
    program: &str,
    inputs: WidgetInputs,
    limits: ExecutionLimits,
) -> Result<String, RuntimeError> {
    let module = Module::from_file(&ctx.engine, path)
        .map_err(|e| RuntimeError::LoadError(format!("{program}: {e:#}")))?;

    let (state, stdio) = WidgetState::new(program, inputs);
    let mut store = Store::new(&ctx.engine, state);
    store.set_epoch_deadline(deadline_ticks(limits.timeout));

    let instance = ctx
        .linker
        .instantiate(&mut store, &module)
        .map_err(|e| RuntimeError::LoadError(format!("{program}: {e:#}")))?;

    let func = instance.get_func(&mut store, ENTRY_POINT).ok_or_else(|| {
        RuntimeError::MissingEntryPoint(format!("{program}: no '{ENTRY_POINT}' export found"))
    })?;
    let entry = func.typed::<(), ()>(&store).map_err(|e| {
        RuntimeError::MissingEntryPoint(format!(
            "{program}: '{ENTRY_POINT}' must take and return nothing: {e:#}"
        ))
    })?;

    let outcome = entry.call(&mut store, ());

    let stdout = stdio.stdout();
    let stderr = stdio.stderr();
    if !stdout.is_empty() || !stderr.is_empty() {
        tracing::debug!(program, %stdout, %stderr, "Widget stdio");
    }

    let state = store.data_mut();
    match outcome {
        Ok(()) => state.output.take().ok_or_else(|| {
            RuntimeError::ExecutionFailure(format!(
                "{program}: '{ENTRY_POINT}' returned without producing output"
            ))
        }),
        Err(e) => {
            if let Some(message) = state.failure.take() {
                return Err(RuntimeError::ExecutionFailure(message));
            }
            if let Some(exit) = e.downcast_ref::<wasmtime_wasi::I32Exit>() {
                return match (exit.0, state.output.take()) {
                    (0, Some(output)) => Ok(output),
                    (code, _) => Err(RuntimeError::ExecutionFailure(format!(
                        "{program}: exited with status {code}"
                    ))),
                };
            }
            if e.downcast_ref::<Trap>() == Some(&Trap::Interrupt) {
                return Err(match limits.timeout {
                    Some(timeout) => RuntimeError::Timeout(timeout),
                    None => RuntimeError::ExecutionFailure(format!("{program}: interrupted")),
                });
            }
            Err(RuntimeError::ExecutionFailure(format!("{program}: {e:#}")))
        }
    }
}

impl std::fmt::Debug for WasmRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmRuntime").finish_non_exhaustive()
    }
}
