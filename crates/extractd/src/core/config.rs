//! Service configuration.
//!
//! Configuration is read from TOML, YAML or JSON files, with `extractd.toml`
//! discovered in the current directory or any parent. A handful of settings can
//! be overridden from the environment after the file is loaded.

use crate::error::{ExtractdError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the file searched for by [`ServiceConfig::discover`].
pub const CONFIG_FILE_NAME: &str = "extractd.toml";

const MIB: u64 = 1024 * 1024;

/// Top-level configuration consumed by the factory, extractor and server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub pdf: PdfConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub formats: FormatsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub worker: WorkerConfig,

    /// File this configuration was loaded from, passed on to worker processes.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Size limits for ingestion routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Largest payload parsed from memory; also the pooled buffer size.
    #[serde(default = "default_max_in_memory_bytes")]
    pub max_in_memory_bytes: usize,

    /// Hard upper bound for any ingested payload.
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,

    /// Declared sizes above this are always parsed in a worker process. Negative disables.
    #[serde(default = "default_fork_threshold_bytes")]
    pub fork_threshold_bytes: i64,

    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,

    /// Directory for spilled payloads. Defaults to the system temp dir.
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_in_memory_bytes: default_max_in_memory_bytes(),
            max_file_size_bytes: default_max_file_size_bytes(),
            fork_threshold_bytes: default_fork_threshold_bytes(),
            pool_capacity: default_pool_capacity(),
            temp_dir: None,
        }
    }
}

impl IngestConfig {
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Whether a declared content length must be parsed out of process.
    pub fn exceeds_fork_threshold(&self, content_length: Option<u64>) -> bool {
        if self.fork_threshold_bytes < 0 {
            return false;
        }
        content_length.is_some_and(|len| len > self.fork_threshold_bytes as u64)
    }
}

/// PDF engine selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfConfig {
    #[serde(default = "default_pdf_engine")]
    pub engine: String,

    /// Explicit shared library to bind the native engine against.
    #[serde(default)]
    pub library_path: Option<PathBuf>,

    /// Overrides whether the engine is guarded as single-use.
    #[serde(default)]
    pub exclusive: Option<bool>,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            engine: default_pdf_engine(),
            library_path: None,
            exclusive: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_tesseract_path")]
    pub tesseract_path: PathBuf,
    #[serde(default = "default_ocr_language")]
    pub language: String,
    #[serde(default = "default_ocr_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tesseract_path: default_tesseract_path(),
            language: default_ocr_language(),
            timeout_secs: default_ocr_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatsConfig {
    /// External converter printing plain text for legacy Word files.
    #[serde(default = "default_legacy_word_tool")]
    pub legacy_word_tool: PathBuf,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for FormatsConfig {
    fn default() -> Self {
        Self {
            legacy_word_tool: default_legacy_word_tool(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

impl FormatsConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    None,
    Filesystem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    #[serde(default = "default_cache_directory")]
    pub directory: PathBuf,
    /// Capacity of the post-processing hand-off channel.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::None,
            directory: default_cache_directory(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// How worker processes are launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Program to run. Defaults to the running executable.
    #[serde(default)]
    pub program: Option<PathBuf>,
    #[serde(default = "default_worker_args")]
    pub args: Vec<String>,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: default_worker_args(),
            deadline_secs: default_deadline_secs(),
            grace_secs: default_grace_secs(),
        }
    }
}

fn default_max_in_memory_bytes() -> usize {
    (16 * MIB) as usize
}

fn default_max_file_size_bytes() -> u64 {
    512 * MIB
}

fn default_fork_threshold_bytes() -> i64 {
    (64 * MIB) as i64
}

fn default_pool_capacity() -> usize {
    8
}

fn default_pdf_engine() -> String {
    if cfg!(feature = "pdfium") {
        "pdfium".to_string()
    } else {
        "lopdf".to_string()
    }
}

fn default_tesseract_path() -> PathBuf {
    PathBuf::from("tesseract")
}

fn default_ocr_language() -> String {
    "eng".to_string()
}

fn default_ocr_timeout_secs() -> u64 {
    120
}

fn default_legacy_word_tool() -> PathBuf {
    PathBuf::from("antiword")
}

fn default_tool_timeout_secs() -> u64 {
    300
}

fn default_cache_directory() -> PathBuf {
    PathBuf::from(".extractd-cache")
}

fn default_queue_capacity() -> usize {
    64
}

fn default_fetch_timeout_secs() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("extractd/{}", env!("CARGO_PKG_VERSION"))
}

fn default_worker_args() -> Vec<String> {
    vec!["worker".to_string()]
}

fn default_deadline_secs() -> u64 {
    3600
}

fn default_grace_secs() -> u64 {
    60
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| ExtractdError::validation(format!("Invalid TOML in {}: {}", path.as_ref().display(), e)))?;
        Ok(config.with_source(path.as_ref()))
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;
        let config: Self = serde_yaml_ng::from_str(&content)
            .map_err(|e| ExtractdError::validation(format!("Invalid YAML in {}: {}", path.as_ref().display(), e)))?;
        Ok(config.with_source(path.as_ref()))
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| ExtractdError::validation(format!("Invalid JSON in {}: {}", path.as_ref().display(), e)))?;
        Ok(config.with_source(path.as_ref()))
    }

    fn with_source(mut self, path: &Path) -> Self {
        self.source = Some(std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()));
        self
    }

    /// Load configuration, picking the parser from the file extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("yaml") | Some("yml") => Self::from_yaml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(ExtractdError::validation(format!(
                "Unsupported config file extension: {}",
                path.display()
            ))),
        }
    }

    /// Discover configuration file in parent directories.
    ///
    /// Searches for `extractd.toml` in the current directory and its parents.
    pub fn discover() -> Result<Option<Self>> {
        let mut current = std::env::current_dir().map_err(ExtractdError::Io)?;

        loop {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                return Ok(Some(Self::from_toml_file(candidate)?));
            }

            if let Some(parent) = current.parent() {
                current = parent.to_path_buf();
            } else {
                break;
            }
        }

        Ok(None)
    }

    /// Resolve configuration the way the binaries do: explicit file, else discovery,
    /// else defaults, then environment overrides and validation.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match Self::discover()? {
                Some(config) => {
                    tracing::info!("Loaded configuration from discovered {}", CONFIG_FILE_NAME);
                    config
                }
                None => {
                    tracing::debug!("No config file found, using default configuration");
                    Self::default()
                }
            },
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `EXTRACTD_*` environment overrides. Unparsable values are logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(value) = env_parsed::<usize>("EXTRACTD_MAX_IN_MEMORY_BYTES") {
            self.ingest.max_in_memory_bytes = value;
        }
        if let Some(value) = env_parsed::<u64>("EXTRACTD_MAX_FILE_SIZE_BYTES") {
            self.ingest.max_file_size_bytes = value;
        }
        if let Some(value) = env_parsed::<i64>("EXTRACTD_FORK_THRESHOLD_BYTES") {
            self.ingest.fork_threshold_bytes = value;
        }
        if let Ok(engine) = std::env::var("EXTRACTD_PDF_ENGINE")
            && !engine.trim().is_empty()
        {
            self.pdf.engine = engine.trim().to_string();
        }
        if let Some(value) = env_parsed::<bool>("EXTRACTD_OCR_ENABLED") {
            self.ocr.enabled = value;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ingest.max_in_memory_bytes == 0 {
            return Err(ExtractdError::validation("ingest.max_in_memory_bytes must be greater than 0"));
        }
        if self.ingest.pool_capacity == 0 {
            return Err(ExtractdError::validation("ingest.pool_capacity must be greater than 0"));
        }
        if self.ingest.max_file_size_bytes < self.ingest.max_in_memory_bytes as u64 {
            return Err(ExtractdError::validation(format!(
                "ingest.max_file_size_bytes ({}) must not be smaller than ingest.max_in_memory_bytes ({})",
                self.ingest.max_file_size_bytes, self.ingest.max_in_memory_bytes
            )));
        }
        if self.cache.queue_capacity == 0 {
            return Err(ExtractdError::validation("cache.queue_capacity must be greater than 0"));
        }
        Ok(())
    }
}

fn read_config(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| ExtractdError::validation(format!("Failed to read config file {}: {}", path.display(), e)))
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse::<T>() {
        Ok(parsed) => {
            tracing::info!("{} overridden from environment: {}", name, value.trim());
            Some(parsed)
        }
        Err(_) => {
            tracing::warn!("Failed to parse {}='{}', ignoring", name, value);
            None
        }
    }
}
