//! Wicket server: the widget service and its HTTP API.

pub mod error;
pub mod routes;
pub mod service;
pub mod state;

pub use error::ServiceError;
pub use routes::router;
pub use service::WidgetService;
pub use state::AppState;
