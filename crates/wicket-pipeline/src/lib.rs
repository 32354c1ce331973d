//! Generation adapter for Wicket.
//!
//! Forwards a natural-language prompt plus the application database schema
//! to an LLM and validates the reply into a [`wicket_core::WidgetDraft`].

pub mod config;
pub mod error;
pub mod generate;
pub mod llm;
pub mod prompt;
pub mod schema;

pub use config::{LlmProvider, WicketConfig};
pub use error::PipelineError;
pub use generate::{GenerationAdapter, parse_generation};
pub use llm::{
    LlmClient, LlmFuture, LlmMessage, LlmRequest, LlmResponse, OpenAiCompatibleClient, StubLlmClient,
};
pub use schema::{SchemaSource, SqliteSchemaSource, StaticSchemaSource};
