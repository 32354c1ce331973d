use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use wasmtime::{Config, Engine, Linker};

use crate::host;
use crate::widget_state::WidgetState;

/// Wall-clock length of one engine epoch.
pub const EPOCH_TICK: Duration = Duration::from_millis(10);

/// Deadline for invocations without a timeout. Far enough out to never be
/// reached, small enough that adding the current epoch cannot overflow.
const UNBOUNDED_TICKS: u64 = u64::MAX / 2;

/// Shared Wasmtime engine and linker.
///
/// Built once and shared by every WASM invocation. The engine is
/// thread-safe; the linker is pre-configured with WASI preview 1 and the
/// `widget` host module. Per-invocation state lives in the `Store`, never
/// here.
pub struct RuntimeContext {
    pub engine: Engine,
    pub linker: Linker<WidgetState>,
    _ticker: EpochTicker,
}

impl RuntimeContext {
    pub fn new() -> Result<Self> {
        let mut config = Config::new();
        // Wall-clock timeouts: each store gets an epoch deadline and a
        // background thread advances the epoch every EPOCH_TICK.
        config.epoch_interruption(true);

        let engine = Engine::new(&config)?;
        let mut linker: Linker<WidgetState> = Linker::new(&engine);

        wasmtime_wasi::preview1::add_to_linker_sync(&mut linker, |state: &mut WidgetState| {
            &mut state.wasi
        })?;
        host::add_to_linker(&mut linker)?;

        let ticker = EpochTicker::start(engine.clone())?;

        tracing::debug!("RuntimeContext initialized (core modules + WASI p1 + widget host)");

        Ok(Self {
            engine,
            linker,
            _ticker: ticker,
        })
    }
}

/// Number of epoch ticks a store may run before it is interrupted.
///
/// Rounded up and padded by one tick, so a widget is never stopped before
/// `timeout` has elapsed.
pub fn deadline_ticks(timeout: Option<Duration>) -> u64 {
    match timeout {
        Some(timeout) => {
            let tick = EPOCH_TICK.as_nanos();
            let ticks = timeout.as_nanos().div_ceil(tick);
            u64::try_from(ticks)
                .unwrap_or(UNBOUNDED_TICKS)
                .saturating_add(1)
                .min(UNBOUNDED_TICKS)
        }
        None => UNBOUNDED_TICKS,
    }
}

/// Advances the engine epoch until dropped.
struct EpochTicker {
    stop: Arc<AtomicBool>,
}

impl EpochTicker {
    fn start(engine: Engine) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        std::thread::Builder::new()
            .name("wicket-epoch".into())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    std::thread::sleep(EPOCH_TICK);
                    engine.increment_epoch();
                }
            })?;
        Ok(Self { stop })
    }
}

impl Drop for EpochTicker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}
