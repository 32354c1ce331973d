use std::fmt;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

use crate::error::RuntimeError;
use crate::registry::InvocationId;

/// `\0asm` in base64.
const WASM_BASE64_MAGIC: &str = "AGFzbQ";
const WASM_DATA_URI_PREFIX: &str = "data:application/wasm;base64,";

/// How a widget's `code` text is to be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleKind {
    /// WebAssembly text format, starting with `(module`.
    WasmText,
    /// A base64-encoded WebAssembly binary.
    WasmBinary,
    /// Python source defining `run_widget(inputs)`.
    Python,
}

impl BundleKind {
    pub fn detect(code: &str) -> Self {
        let body = strip_wat_comments(code);
        if body.starts_with("(module") {
            return BundleKind::WasmText;
        }
        let trimmed = code.trim_start();
        let trimmed = trimmed.strip_prefix(WASM_DATA_URI_PREFIX).unwrap_or(trimmed);
        if trimmed.starts_with(WASM_BASE64_MAGIC) {
            return BundleKind::WasmBinary;
        }
        BundleKind::Python
    }

    /// File extension used when staging the bundle.
    pub fn extension(self) -> &'static str {
        match self {
            BundleKind::WasmText => "wat",
            BundleKind::WasmBinary => "wasm",
            BundleKind::Python => "py",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BundleKind::WasmText => "wasm-text",
            BundleKind::WasmBinary => "wasm-binary",
            BundleKind::Python => "python",
        }
    }
}

impl fmt::Display for BundleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Skip leading whitespace and `;;` line comments.
fn strip_wat_comments(code: &str) -> &str {
    let mut rest = code.trim_start();
    while let Some(comment) = rest.strip_prefix(";;") {
        rest = match comment.find('\n') {
            Some(end) => comment[end + 1..].trim_start(),
            None => "",
        };
    }
    rest
}

/// SHA-256 hex digest of a bundle's source text.
pub fn bundle_digest(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

/// A bundle written to disk for a single invocation.
///
/// Layout under `work_dir`:
/// ```text
/// {work_dir}/
///   {invocation_id}.{wat|wasm|py}   - the bundle
///   {invocation_id}.{suffix}        - sidecars registered by the runtime
/// ```
///
/// Dropping the value deletes the bundle and every sidecar.
#[derive(Debug)]
pub struct StagedBundle {
    invocation_id: InvocationId,
    kind: BundleKind,
    path: PathBuf,
    sidecars: Vec<PathBuf>,
}

impl StagedBundle {
    /// Materialize `code` as `{work_dir}/{invocation_id}.{ext}`.
    ///
    /// A failed write leaves nothing behind.
    pub async fn write(
        work_dir: &Path,
        invocation_id: &InvocationId,
        kind: BundleKind,
        code: &str,
    ) -> Result<Self, RuntimeError> {
        let bytes = match kind {
            BundleKind::WasmBinary => decode_wasm_base64(code)?,
            BundleKind::WasmText | BundleKind::Python => code.as_bytes().to_vec(),
        };

        tokio::fs::create_dir_all(work_dir).await.map_err(|e| {
            RuntimeError::LoadError(format!(
                "cannot create work directory {}: {e}",
                work_dir.display()
            ))
        })?;

        let path = work_dir.join(format!("{invocation_id}.{}", kind.extension()));
        let staged = Self {
            invocation_id: invocation_id.clone(),
            kind,
            path,
            sidecars: Vec::new(),
        };

        // On error `staged` is dropped, which removes a partial file.
        tokio::fs::write(&staged.path, &bytes).await.map_err(|e| {
            RuntimeError::LoadError(format!("cannot stage {}: {e}", staged.path.display()))
        })?;

        tracing::debug!(
            invocation_id = %staged.invocation_id,
            path = %staged.path.display(),
            bytes = bytes.len(),
            "Bundle staged"
        );
        Ok(staged)
    }

    pub fn invocation_id(&self) -> &InvocationId {
        &self.invocation_id
    }

    pub fn kind(&self) -> BundleKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reserve `{work_dir}/{invocation_id}.{suffix}`, removed together with
    /// the bundle.
    pub fn sidecar(&mut self, suffix: &str) -> PathBuf {
        let path = self.path.with_file_name(format!("{}.{suffix}", self.invocation_id));
        if !self.sidecars.contains(&path) {
            self.sidecars.push(path.clone());
        }
        path
    }
}

impl Drop for StagedBundle {
    fn drop(&mut self) {
        for path in std::iter::once(&self.path).chain(self.sidecars.iter()) {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), "Failed to remove staged file: {e}"),
            }
        }
    }
}

fn decode_wasm_base64(code: &str) -> Result<Vec<u8>, RuntimeError> {
    let trimmed = code.trim();
    let payload = trimmed.strip_prefix(WASM_DATA_URI_PREFIX).unwrap_or(trimmed);
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| RuntimeError::LoadError(format!("invalid base64 WebAssembly bundle: {e}")))
}
