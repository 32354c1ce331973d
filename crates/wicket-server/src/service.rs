use std::sync::Arc;
use std::time::Duration;

use wicket_core::{
    ArtifactStore, FsKvStore, InputMarshaler, MarshaledInputs, RequestPayload, Widget, WidgetId,
};
use wicket_pipeline::{GenerationAdapter, SchemaSource, SqliteSchemaSource, WicketConfig};
use wicket_runtime::{ExecutorConfig, WidgetExecutor};

use crate::error::ServiceError;

/// The widget lifecycle: generate, store, look up and run.
pub struct WidgetService {
    store: ArtifactStore,
    marshaler: InputMarshaler,
    executor: WidgetExecutor,
    generator: GenerationAdapter,
    schema: Arc<dyn SchemaSource>,
}

impl WidgetService {
    pub fn new(
        store: ArtifactStore,
        marshaler: InputMarshaler,
        executor: WidgetExecutor,
        generator: GenerationAdapter,
        schema: Arc<dyn SchemaSource>,
    ) -> Self {
        Self {
            store,
            marshaler,
            executor,
            generator,
            schema,
        }
    }

    /// Wire every component from a loaded configuration, creating the
    /// widget and upload directories.
    pub async fn from_config(config: &WicketConfig) -> Result<Self, ServiceError> {
        let kv = FsKvStore::new(config.storage.widgets_dir.clone());
        kv.init().await?;
        let store = ArtifactStore::open(Arc::new(kv)).await?;

        let marshaler = InputMarshaler::new(config.storage.uploads_dir.clone());
        marshaler.init().await?;

        let mut executor_config = ExecutorConfig {
            python_interpreter: config.execution.python.clone(),
            timeout: config.execution.timeout_secs.map(Duration::from_secs),
            ..ExecutorConfig::default()
        };
        if let Some(work_dir) = &config.execution.work_dir {
            executor_config.work_dir = work_dir.clone();
        }
        let executor = WidgetExecutor::new(executor_config)?;

        let generator = GenerationAdapter::new(
            config.build_llm_client(),
            config.data.database.display().to_string(),
            config.llm.max_tokens,
        );
        let schema = Arc::new(SqliteSchemaSource::new(config.data.database.clone()));

        Ok(Self::new(store, marshaler, executor, generator, schema))
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn executor(&self) -> &WidgetExecutor {
        &self.executor
    }

    /// Generate a widget from `prompt` and persist it.
    ///
    /// Nothing is stored unless the generation result is complete.
    pub async fn create(&self, prompt: &str) -> Result<Widget, ServiceError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ServiceError::Validation("prompt must not be empty".into()));
        }

        let schema = self.schema.schema().await?;
        let draft = self.generator.generate(prompt, &schema).await?;
        let widget = self.store.create(draft).await?;
        Ok(widget)
    }

    /// All widgets, newest first.
    pub async fn list(&self) -> Result<Vec<Widget>, ServiceError> {
        Ok(self.store.list().await?)
    }

    pub async fn get(&self, id: WidgetId) -> Result<Widget, ServiceError> {
        self.store.get(id).await?.ok_or(ServiceError::NotFound(id))
    }

    /// Run widget `id` against `payload` and return its output.
    ///
    /// An unknown id fails before anything is written. Uploads are removed
    /// on every path; the usage count only moves on success.
    pub async fn execute(&self, id: WidgetId, payload: RequestPayload) -> Result<String, ServiceError> {
        let widget = self.get(id).await?;
        let MarshaledInputs { inputs, uploads } = self.marshaler.marshal(payload).await?;

        tracing::info!(widget_id = %id, name = %widget.name, inputs = inputs.len(), "Running widget");
        let result = self.executor.execute(&widget.code, &inputs).await;
        uploads.cleanup().await;

        let output = result?;
        let usage_count = self.store.increment_usage(id).await?;
        tracing::info!(widget_id = %id, usage_count, "Widget run succeeded");
        Ok(output)
    }
}

impl std::fmt::Debug for WidgetService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetService")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
