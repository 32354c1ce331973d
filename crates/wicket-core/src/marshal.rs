use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::MarshalError;
use crate::input::{InputValue, WidgetInputs};

/// A file part of an execution request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Raw execution request: scalar form fields plus uploads.
#[derive(Debug, Clone, Default)]
pub struct RequestPayload {
    pub fields: Vec<(String, String)>,
    pub files: Vec<UploadedFile>,
}

impl RequestPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn with_file(
        mut self,
        field: impl Into<String>,
        filename: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        self.files.push(UploadedFile {
            field: field.into(),
            filename: filename.into(),
            bytes: bytes.into(),
        });
        self
    }
}

/// Converts a [`RequestPayload`] into [`WidgetInputs`].
///
/// Uploads are written to `{uploads_dir}/{filename}`. Two uploads with the
/// same filename overwrite each other (last write wins), including uploads
/// from concurrent requests.
pub struct InputMarshaler {
    uploads_dir: PathBuf,
}

/// Output of [`InputMarshaler::marshal`].
#[derive(Debug)]
pub struct MarshaledInputs {
    pub inputs: WidgetInputs,
    pub uploads: UploadSet,
}

impl InputMarshaler {
    pub fn new(uploads_dir: PathBuf) -> Self {
        Self { uploads_dir }
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub async fn init(&self) -> Result<(), MarshalError> {
        tokio::fs::create_dir_all(&self.uploads_dir)
            .await
            .map_err(|source| MarshalError::Upload {
                filename: self.uploads_dir.display().to_string(),
                source,
            })
    }

    /// Build the input mapping for one invocation.
    ///
    /// Fields pass through as text. Each upload is written to disk and its
    /// field maps to the stored path; an upload wins over a text field of the
    /// same name. The returned [`UploadSet`] owns the written files and must
    /// outlive the execution that reads them.
    pub async fn marshal(&self, payload: RequestPayload) -> Result<MarshaledInputs, MarshalError> {
        let mut inputs = WidgetInputs::new();
        let mut uploads = UploadSet::default();

        for (name, value) in payload.fields {
            inputs.insert(name, InputValue::Text(value));
        }

        if !payload.files.is_empty() {
            self.init().await?;
        }

        for file in payload.files {
            let stored_name = sanitize_filename(&file.filename)?;
            let path = self.uploads_dir.join(stored_name);

            // Tracked before writing: on error `uploads` is dropped, which
            // removes everything written so far, partial files included.
            uploads.track(path.clone());
            tokio::fs::write(&path, &file.bytes)
                .await
                .map_err(|source| MarshalError::Upload {
                    filename: file.filename.clone(),
                    source,
                })?;

            tracing::info!(
                field = %file.field,
                path = %path.display(),
                bytes = file.bytes.len(),
                "Upload stored"
            );
            inputs.insert(file.field, InputValue::File(path));
        }

        Ok(MarshaledInputs { inputs, uploads })
    }
}

/// Keep only the final path component of a client-supplied filename.
fn sanitize_filename(raw: &str) -> Result<&str, MarshalError> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if name.is_empty() || name == "." || name == ".." {
        return Err(MarshalError::Validation(format!(
            "upload filename '{raw}' is not usable"
        )));
    }
    Ok(name)
}

/// Files written by the marshaler for one invocation.
///
/// [`UploadSet::cleanup`] removes them; dropping a set that was not cleaned
/// up removes them synchronously.
#[derive(Debug, Default)]
pub struct UploadSet {
    paths: Vec<PathBuf>,
}

impl UploadSet {
    fn track(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Remove every tracked file. Files that are already gone are ignored.
    pub async fn cleanup(mut self) {
        for path in std::mem::take(&mut self.paths) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "Upload removed"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), "Failed to remove upload: {e}"),
            }
        }
    }
}

impl Drop for UploadSet {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            let _ = std::fs::remove_file(&path);
        }
    }
}
