use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;
use crate::utils::retry::RetryConfig;

pub const CONFIG_FILE_NAME: &str = "rebatch.toml";
pub const DEFAULT_COHERE_URL: &str = "https://api.cohere.com";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "command-r7b-12-2024";

pub const DEFAULT_TEMPLATE: &str = "# Analysis of UNGA Speech: {source} on {target}, {year}

## Text to Analyze
{text}

Provide your reasoning first. Your response MUST end with a clearly marked \
\"Output:\" section containing exactly one sentence that describes how {target} \
is characterized by {source}.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub processing: ProcessingConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub dataset: DatasetConfig,

    #[serde(default)]
    pub prompt: PromptConfig,
}

/// Config plus the file it came from.
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    pub config: Config,
    pub path: Option<PathBuf>,
}

impl Config {
    pub fn global_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("rebatch").join("config.toml"))
    }

    pub fn project_path() -> PathBuf {
        PathBuf::from(CONFIG_FILE_NAME)
    }

    /// Resolve the config file: an explicit path (which must exist), then
    /// `./rebatch.toml`, then the global config, then defaults.
    pub fn load(explicit: Option<&Path>) -> Result<ResolvedConfig, ConfigError> {
        if let Some(path) = explicit {
            let config = Self::load_from(path)?;
            return Ok(ResolvedConfig {
                config,
                path: Some(path.to_path_buf()),
            });
        }

        let candidates = std::iter::once(Self::project_path()).chain(Self::global_path());
        for path in candidates {
            if path.exists() {
                let config = Self::load_from(&path)?;
                return Ok(ResolvedConfig {
                    config,
                    path: Some(path),
                });
            }
        }

        Ok(ResolvedConfig::default())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "processing.batch_size must be positive".to_string(),
            ));
        }
        if self.processing.checkpoint_every == 0 {
            return Err(ConfigError::ValidationError(
                "processing.checkpoint_every must be positive".to_string(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "retry.multiplier must be at least 1.0".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }
        if self.prompt.template.is_some() && self.prompt.template_file.is_some() {
            return Err(ConfigError::ValidationError(
                "set only one of prompt.template and prompt.template_file".to_string(),
            ));
        }
        Ok(())
    }
}

/// Supported chat API providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Cohere v2 chat API
    #[default]
    Cohere,
    /// OpenAI-compatible chat completions API
    OpenAi,
}

impl LlmProvider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::Cohere => DEFAULT_COHERE_URL,
            LlmProvider::OpenAi => DEFAULT_OPENAI_URL,
        }
    }

    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            LlmProvider::Cohere => "COHERE_API_KEY",
            LlmProvider::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cohere" => Ok(LlmProvider::Cohere),
            "openai" => Ok(LlmProvider::OpenAi),
            _ => Err(format!("unknown LLM provider: {}", s)),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::Cohere => write!(f, "cohere"),
            LlmProvider::OpenAi => write!(f, "openai"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Environment variable holding the API key; defaults per provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_timeout() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: default_model(),
            base_url: None,
            api_key_env: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout(),
            system_prompt: None,
        }
    }
}

impl LlmConfig {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }

    pub fn api_key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_key_env())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Rows per batch (progress reporting unit).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Rows processed between checkpoint writes.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
}

fn default_batch_size() -> usize {
    50
}

fn default_checkpoint_every() -> usize {
    50
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            checkpoint_every: default_checkpoint_every(),
        }
    }
}

/// Input dataset formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFormat {
    Csv,
    Jsonl,
}

impl DatasetFormat {
    /// Infer the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "csv" => Some(DatasetFormat::Csv),
            "jsonl" | "ndjson" => Some(DatasetFormat::Jsonl),
            _ => None,
        }
    }
}

impl FromStr for DatasetFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(DatasetFormat::Csv),
            "jsonl" | "ndjson" => Ok(DatasetFormat::Jsonl),
            _ => Err(format!("unknown dataset format: {}", s)),
        }
    }
}

impl fmt::Display for DatasetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetFormat::Csv => write!(f, "csv"),
            DatasetFormat::Jsonl => write!(f, "jsonl"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Overrides extension-based format detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<DatasetFormat>,

    /// Columns kept on each row, in order. Empty keeps all columns.
    #[serde(default)]
    pub columns: Vec<String>,

    /// `column=value` filters.
    #[serde(default)]
    pub filters: Vec<String>,
}

/// How answers are pulled out of a raw response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    /// Last "Output:" style section, first line.
    #[default]
    Marker,
    /// First JSON object carrying the required keys.
    Json,
    /// Whole trimmed response.
    None,
}

impl FromStr for ExtractorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "marker" => Ok(ExtractorKind::Marker),
            "json" => Ok(ExtractorKind::Json),
            "none" | "raw" => Ok(ExtractorKind::None),
            _ => Err(format!("unknown extractor: {}", s)),
        }
    }
}

impl fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractorKind::Marker => write!(f, "marker"),
            ExtractorKind::Json => write!(f, "json"),
            ExtractorKind::None => write!(f, "none"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Inline template with `{column}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_file: Option<PathBuf>,

    #[serde(default)]
    pub extractor: ExtractorKind,

    /// Keys a JSON answer must carry.
    #[serde(default)]
    pub required_keys: Vec<String>,

    /// Shortest accepted marker answer, in characters.
    #[serde(default = "default_min_output_len")]
    pub min_output_len: usize,
}

fn default_min_output_len() -> usize {
    10
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template: None,
            template_file: None,
            extractor: ExtractorKind::default(),
            required_keys: Vec::new(),
            min_output_len: default_min_output_len(),
        }
    }
}
