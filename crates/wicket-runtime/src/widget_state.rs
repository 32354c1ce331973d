use wasmtime_wasi::preview1::WasiP1Ctx;
use wasmtime_wasi::p2::pipe::MemoryOutputPipe;
use wasmtime_wasi::{DirPerms, FilePerms, WasiCtxBuilder};
use wicket_core::WidgetInputs;

const STDOUT_CAPACITY: usize = 1024 * 1024;
const STDERR_CAPACITY: usize = 256 * 1024;

/// Per-invocation WASM state.
///
/// A fresh `WidgetState` backs each `Store`, so nothing carries over
/// between invocations.
///
/// Privileges match the host process:
/// - the host root and working directory are preopened read/write
/// - the host environment is inherited
/// - stdout/stderr are captured and logged after the call
pub struct WidgetState {
    pub(crate) wasi: WasiP1Ctx,
    pub(crate) inputs: WidgetInputs,
    pub(crate) output: Option<String>,
    pub(crate) failure: Option<String>,
}

/// Handles to the captured stdio of one invocation.
pub struct CapturedStdio {
    stdout: MemoryOutputPipe,
    stderr: MemoryOutputPipe,
}

impl CapturedStdio {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.stdout.contents()).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.stderr.contents()).into_owned()
    }
}

impl WidgetState {
    pub fn new(program: &str, inputs: WidgetInputs) -> (Self, CapturedStdio) {
        let stdout = MemoryOutputPipe::new(STDOUT_CAPACITY);
        let stderr = MemoryOutputPipe::new(STDERR_CAPACITY);

        let mut builder = WasiCtxBuilder::new();
        builder
            .arg(program)
            .inherit_env()
            .stdout(stdout.clone())
            .stderr(stderr.clone());

        for (host, guest) in [("/", "/"), (".", ".")] {
            if let Err(e) = builder.preopened_dir(host, guest, DirPerms::all(), FilePerms::all()) {
                tracing::warn!(host, "Could not preopen directory, skipping: {e}");
            }
        }

        let state = Self {
            wasi: builder.build_p1(),
            inputs,
            output: None,
            failure: None,
        };
        (state, CapturedStdio { stdout, stderr })
    }
}
