use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::error::PipelineError;
use crate::llm::{LlmClient, OpenAiCompatibleClient, StubLlmClient};

pub const CONFIG_FILE_NAME: &str = "wicket.toml";
pub const API_KEY_ENV: &str = "WICKET_LLM_API_KEY";

/// Canned generation result served by the `stub` provider, so a server can
/// run without a model.
const STUB_WIDGET: &str = r#"{
  "name": "Adder",
  "category": "numerical",
  "code": "def run_widget(inputs):\n    return str(float(inputs['a']) + float(inputs['b']))\n",
  "presentation": "<input name=\"a\" type=\"number\"><input name=\"b\" type=\"number\"><button type=\"submit\">Run</button>"
}"#;

#[derive(Debug, Deserialize)]
pub struct WicketConfig {
    pub llm: LlmConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_max_tokens() -> u32 {
    4096
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum LlmProvider {
    #[serde(rename = "openai-compatible")]
    OpenAiCompatible,
    #[serde(rename = "stub")]
    Stub,
}

/// Where widget records and uploads live.
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_widgets_dir")]
    pub widgets_dir: PathBuf,
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            widgets_dir: default_widgets_dir(),
            uploads_dir: default_uploads_dir(),
        }
    }
}

fn default_widgets_dir() -> PathBuf {
    "widgets".into()
}
fn default_uploads_dir() -> PathBuf {
    "uploads".into()
}

/// The application database shown to the generator.
#[derive(Debug, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

fn default_database() -> PathBuf {
    "database/widgets.db".into()
}

#[derive(Debug, Deserialize)]
pub struct ExecutionConfig {
    /// Staging directory for bundles. Defaults to the system temp dir.
    pub work_dir: Option<PathBuf>,
    #[serde(default = "default_python")]
    pub python: String,
    /// Unset means widgets may run indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            python: default_python(),
            timeout_secs: None,
        }
    }
}

fn default_python() -> String {
    "python3".into()
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".into()
}

impl WicketConfig {
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(PipelineError::IoError)?;
        toml::from_str(&content).map_err(|e| {
            PipelineError::ConfigError(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    /// Find and load the configuration.
    ///
    /// Looks at `explicit` if given, otherwise `./wicket.toml`, then
    /// `<config dir>/wicket/wicket.toml`.
    pub fn discover(explicit: Option<&Path>) -> Result<(PathBuf, Self), PipelineError> {
        match Self::locate(explicit) {
            Some(path) => {
                let config = Self::from_file(&path)?;
                Ok((path, config))
            }
            None => {
                let searched: Vec<String> = Self::search_paths()
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect();
                Err(PipelineError::ConfigError(format!(
                    "no {CONFIG_FILE_NAME} found (searched: {})",
                    searched.join(", ")
                )))
            }
        }
    }

    /// The file [`discover`](Self::discover) would load, if any. An explicit
    /// path is returned as is, even when it does not exist.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        Self::search_paths().into_iter().find(|p| p.is_file())
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("wicket").join(CONFIG_FILE_NAME));
        }
        paths
    }

    /// The API key, with `WICKET_LLM_API_KEY` taking precedence over the file.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.is_empty())
            .or_else(|| self.llm.api_key.clone())
    }

    pub fn build_llm_client(&self) -> Arc<dyn LlmClient> {
        match self.llm.provider {
            LlmProvider::OpenAiCompatible => Arc::new(OpenAiCompatibleClient::new(
                self.llm.base_url.clone(),
                self.llm.model.clone(),
                self.api_key(),
            )),
            LlmProvider::Stub => Arc::new(StubLlmClient::constant(STUB_WIDGET)),
        }
    }
}
