use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use wicket_core::WidgetInputs;

use crate::bundle::{BundleKind, StagedBundle};
use crate::error::RuntimeError;

pub type RuntimeFuture<'a> = Pin<Box<dyn Future<Output = Result<String, RuntimeError>> + Send + 'a>>;

/// Limits applied to a single invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionLimits {
    /// `None` runs the widget to completion, however long it takes.
    pub timeout: Option<Duration>,
}

/// Something that can load a staged bundle and call its entry point.
///
/// Implementations must keep all per-invocation state inside the call:
/// two invocations running at once may not observe each other's code or
/// inputs.
///
/// Uses Pin<Box<dyn Future>> for dyn-compatibility.
pub trait WidgetRuntime: Send + Sync {
    /// Whether this runtime loads bundles of `kind`.
    fn supports(&self, kind: BundleKind) -> bool;

    /// Load `bundle`, call `run_widget(inputs)` and return its result as text.
    fn invoke<'a>(
        &'a self,
        bundle: &'a mut StagedBundle,
        inputs: &'a WidgetInputs,
        limits: ExecutionLimits,
    ) -> RuntimeFuture<'a>;

    /// Runtime name for logging.
    fn name(&self) -> &str;
}
