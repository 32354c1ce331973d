use std::collections::BTreeMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::RwLock;

use crate::error::StoreError;

const RECORD_EXT: &str = "json";

pub type KvFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// One record returned by [`KvStore::scan`].
///
/// Each entry carries its own read result so one unreadable record does not
/// hide the others.
#[derive(Debug)]
pub struct KvEntry {
    pub key: String,
    pub value: Result<Vec<u8>, StoreError>,
}

/// Minimal record storage used by the artifact store.
///
/// Uses Pin<Box<dyn Future>> for dyn-compatibility.
pub trait KvStore: Send + Sync {
    /// Write a whole record, replacing any previous value.
    fn put<'a>(&'a self, key: &'a str, value: Vec<u8>) -> KvFuture<'a, ()>;

    /// Read a record. A missing key is `Ok(None)`, never an error.
    fn get<'a>(&'a self, key: &'a str) -> KvFuture<'a, Option<Vec<u8>>>;

    /// Read every record. Order is unspecified.
    fn scan<'a>(&'a self) -> KvFuture<'a, Vec<KvEntry>>;

    /// Backend name for logging.
    fn backend_name(&self) -> &str;
}

/// One JSON file per record.
///
/// Layout under `base_dir`:
/// ```text
/// {base_dir}/
///   {key}.json
/// ```
///
/// Writes land in a uniquely named temporary sibling first and are renamed
/// over the record, so a reader sees either the old or the new document.
pub struct FsKvStore {
    base_dir: PathBuf,
}

impl FsKvStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub async fn init(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.base_dir).await.map_err(|e| {
            StoreError::Persistence(format!(
                "cannot create record directory {}: {e}",
                self.base_dir.display()
            ))
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn record_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::Persistence(format!("invalid record key '{key}'")));
        }
        Ok(self.base_dir.join(format!("{key}.{RECORD_EXT}")))
    }
}

impl KvStore for FsKvStore {
    fn put<'a>(&'a self, key: &'a str, value: Vec<u8>) -> KvFuture<'a, ()> {
        Box::pin(async move {
            let path = self.record_path(key)?;
            let tmp = self
                .base_dir
                .join(format!(".{key}.{}.tmp", uuid::Uuid::new_v4().simple()));

            if let Err(e) = tokio::fs::write(&tmp, &value).await {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(StoreError::Persistence(format!(
                    "cannot write {}: {e}",
                    tmp.display()
                )));
            }
            if let Err(e) = tokio::fs::rename(&tmp, &path).await {
                let _ = tokio::fs::remove_file(&tmp).await;
                return Err(StoreError::Persistence(format!(
                    "cannot replace {}: {e}",
                    path.display()
                )));
            }
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> KvFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            let path = self.record_path(key)?;
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(StoreError::Persistence(format!(
                    "cannot read {}: {e}",
                    path.display()
                ))),
            }
        })
    }

    fn scan<'a>(&'a self) -> KvFuture<'a, Vec<KvEntry>> {
        Box::pin(async move {
            let mut entries = Vec::new();
            let mut dir = match tokio::fs::read_dir(&self.base_dir).await {
                Ok(dir) => dir,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(entries),
                Err(e) => {
                    return Err(StoreError::Persistence(format!(
                        "cannot list {}: {e}",
                        self.base_dir.display()
                    )));
                }
            };

            while let Some(entry) = dir.next_entry().await? {
                let path = entry.path();
                if !path.extension().is_some_and(|ext| ext == RECORD_EXT) {
                    continue;
                }
                let Some(key) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                    continue;
                };
                let value = tokio::fs::read(&path).await.map_err(StoreError::from);
                entries.push(KvEntry { key, value });
            }
            Ok(entries)
        })
    }

    fn backend_name(&self) -> &str {
        "fs"
    }
}

/// In-process store, mostly for tests.
#[derive(Default)]
pub struct MemoryKvStore {
    records: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn put<'a>(&'a self, key: &'a str, value: Vec<u8>) -> KvFuture<'a, ()> {
        Box::pin(async move {
            self.records.write().await.insert(key.to_string(), value);
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> KvFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move { Ok(self.records.read().await.get(key).cloned()) })
    }

    fn scan<'a>(&'a self) -> KvFuture<'a, Vec<KvEntry>> {
        Box::pin(async move {
            Ok(self
                .records
                .read()
                .await
                .iter()
                .map(|(key, value)| KvEntry {
                    key: key.clone(),
                    value: Ok(value.clone()),
                })
                .collect())
        })
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
