use std::sync::Arc;

use crate::service::WidgetService;

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WidgetService>,
}

impl AppState {
    pub fn new(service: WidgetService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}
