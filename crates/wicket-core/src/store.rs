use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::kv::KvStore;
use crate::widget::{Widget, WidgetDraft, WidgetId};

/// Persistence for widget records.
///
/// Every widget is one record in the backing [`KvStore`], keyed by its id.
/// Records are immutable after creation except for `usage_count`, whose
/// read-modify-write is serialized per record.
pub struct ArtifactStore {
    kv: Arc<dyn KvStore>,
    last_id: AtomicU64,
    record_locks: Mutex<HashMap<WidgetId, Arc<Mutex<()>>>>,
}

impl ArtifactStore {
    /// Open a store over `kv`, seeding the id generator past every id
    /// already persisted.
    pub async fn open(kv: Arc<dyn KvStore>) -> Result<Self, StoreError> {
        let highest = kv
            .scan()
            .await?
            .iter()
            .filter_map(|entry| entry.key.parse::<u64>().ok())
            .max()
            .unwrap_or(0);

        tracing::debug!(backend = kv.backend_name(), highest_id = highest, "Artifact store opened");

        Ok(Self {
            kv,
            last_id: AtomicU64::new(highest),
            record_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Persist a new widget with a fresh id and a zero usage count.
    pub async fn create(&self, draft: WidgetDraft) -> Result<Widget, StoreError> {
        let now = Utc::now();
        let id = self.next_id(now.timestamp_millis().max(0) as u64)?;
        let widget = Widget::from_draft(id, now, draft);

        self.write(&widget).await?;

        tracing::info!(
            widget_id = %widget.id,
            name = %widget.name,
            category = %widget.category,
            "Widget saved"
        );
        Ok(widget)
    }

    /// Look up a widget. A missing id is `Ok(None)`.
    pub async fn get(&self, id: WidgetId) -> Result<Option<Widget>, StoreError> {
        let key = id.storage_key();
        let Some(bytes) = self.kv.get(&key).await? else {
            return Ok(None);
        };
        let widget = serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            key,
            reason: e.to_string(),
        })?;
        Ok(Some(widget))
    }

    /// All widgets, newest first. Records that cannot be read or parsed are
    /// logged and skipped.
    pub async fn list(&self) -> Result<Vec<Widget>, StoreError> {
        let mut widgets = Vec::new();
        for entry in self.kv.scan().await? {
            let bytes = match entry.value {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(key = %entry.key, "Skipping unreadable widget record: {e}");
                    continue;
                }
            };
            match serde_json::from_slice::<Widget>(&bytes) {
                Ok(widget) => widgets.push(widget),
                Err(e) => {
                    tracing::warn!(key = %entry.key, "Skipping corrupt widget record: {e}");
                }
            }
        }
        widgets.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(widgets)
    }

    /// Add one to a widget's usage count and return the new value.
    ///
    /// Unknown ids are a no-op returning `None`. Concurrent callers on the
    /// same id are serialized so no increment is lost.
    pub async fn increment_usage(&self, id: WidgetId) -> Result<Option<u64>, StoreError> {
        let lock = self.record_lock(id).await;
        let _guard = lock.lock().await;

        let Some(mut widget) = self.get(id).await? else {
            tracing::debug!(widget_id = %id, "Usage increment for unknown widget ignored");
            return Ok(None);
        };
        widget.usage_count = widget.usage_count.saturating_add(1);
        self.write(&widget).await?;

        tracing::debug!(widget_id = %id, usage_count = widget.usage_count, "Usage recorded");
        Ok(Some(widget.usage_count))
    }

    fn next_id(&self, now_millis: u64) -> Result<WidgetId, StoreError> {
        let next = |last: u64| last.checked_add(1).map(|id| id.max(now_millis));
        self.last_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, next)
            .ok()
            .and_then(next)
            .map(WidgetId)
            .ok_or_else(|| StoreError::Persistence("widget id space exhausted".into()))
    }

    async fn record_lock(&self, id: WidgetId) -> Arc<Mutex<()>> {
        let mut locks = self.record_locks.lock().await;
        locks.entry(id).or_default().clone()
    }

    async fn write(&self, widget: &Widget) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(widget)?;
        self.kv.put(&widget.id.storage_key(), json).await
    }
}
