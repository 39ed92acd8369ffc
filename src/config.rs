//! Configuration management for LexAI
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{LexaiError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Reserved variant name that selects side-by-side comparison
pub const COMPARE_VARIANT: &str = "compare";

/// Main configuration structure for LexAI
///
/// Holds the HTTP server settings, the conversation log directory,
/// sampling parameters shared by every engine, chat presentation text,
/// compare-mode settings, and the table of model variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Conversation log storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Sampling parameters sent with every generation request
    #[serde(default)]
    pub generation: GenerationConfig,

    /// System prompt, disclaimer and default variant
    #[serde(default)]
    pub chat: ChatConfig,

    /// Side-by-side comparison settings
    #[serde(default)]
    pub compare: CompareConfig,

    /// Model variants keyed by name (e.g. `baseline`, `finetuned`)
    #[serde(default = "default_variants")]
    pub variants: BTreeMap<String, VariantConfig>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Conversation log storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON file per conversation
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("chat_logs")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
        }
    }
}

/// Sampling parameters
///
/// Serialized verbatim as `generation_config` in chat responses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum number of tokens to generate
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,

    /// Sampling temperature; 0 means greedy decoding
    #[serde(default)]
    pub temperature: f32,

    /// Nucleus sampling threshold
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

fn default_max_new_tokens() -> u32 {
    8192
}

fn default_top_p() -> f32 {
    0.1
}

impl GenerationConfig {
    /// Whether the engine should sample rather than decode greedily
    pub fn do_sample(&self) -> bool {
        self.temperature > 0.0
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: default_max_new_tokens(),
            temperature: 0.0,
            top_p: default_top_p(),
        }
    }
}

/// Chat presentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// System prompt prepended to every conversation
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Disclaimer returned with every reply
    #[serde(default = "default_disclaimer")]
    pub disclaimer: String,

    /// Variant used when a request omits `model_variant`
    #[serde(default = "default_variant")]
    pub default_variant: String,

    /// Construct and ping every engine before accepting requests
    #[serde(default = "default_warm_up")]
    pub warm_up: bool,
}

fn default_system_prompt() -> String {
    concat!(
        "당신은 'Lexi'라는 이름의 한국 법률 전문가입니다. ",
        "핵심 요약만 전달하고 불필요한 사족은 덧붙이지 않습니다. ",
        "설명할 때 법 조항에 대한 내용을 담지 마세요. ",
        "근거가 부족하면 추측하지 말고 명확히 한계를 밝혀 주세요. ",
        "만약 모르는 내용이라면 모르다고 답변하세요. ",
        "모든 답변은 한글로 대답하세요."
    )
    .to_string()
}

fn default_disclaimer() -> String {
    concat!(
        "Lexi is an AI legal assistant based on the Qwen3-1.7B model. ",
        "It does not replace professional legal counsel. Verify critical ",
        "information with a qualified attorney."
    )
    .to_string()
}

fn default_variant() -> String {
    "finetuned".to_string()
}

fn default_warm_up() -> bool {
    true
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            disclaimer: default_disclaimer(),
            default_variant: default_variant(),
            warm_up: default_warm_up(),
        }
    }
}

/// Compare-mode configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareConfig {
    /// The two variants streamed side by side, in display order
    #[serde(default = "default_compare_variants")]
    pub variants: Vec<String>,

    /// Deadline for the whole comparison (seconds)
    #[serde(default = "default_compare_timeout")]
    pub timeout_seconds: u64,

    /// Capacity of the channel joining the two workers
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_compare_variants() -> Vec<String> {
    vec!["baseline".to_string(), "finetuned".to_string()]
}

fn default_compare_timeout() -> u64 {
    600
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            variants: default_compare_variants(),
            timeout_seconds: default_compare_timeout(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Inference engine family backing a variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    /// vLLM OpenAI-compatible server (batched serving)
    Vllm,
    /// Hugging Face text-generation-inference
    #[serde(alias = "hf-mps", alias = "tgi")]
    Hf,
    /// `mlx_lm.server` on Apple silicon
    Mlx,
    /// Ollama daemon
    Ollama,
}

impl Framework {
    /// Base URL used when a variant does not set `host`
    pub fn default_host(&self) -> &'static str {
        match self {
            Self::Vllm => "http://localhost:8000",
            Self::Hf => "http://localhost:8080",
            Self::Mlx => "http://localhost:8080",
            Self::Ollama => "http://localhost:11434",
        }
    }

    /// Whether generation on this engine is serialized process-wide by default
    pub fn serializes_by_default(&self) -> bool {
        matches!(self, Self::Hf | Self::Mlx)
    }
}

impl std::fmt::Display for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vllm => write!(f, "vllm"),
            Self::Hf => write!(f, "hf"),
            Self::Mlx => write!(f, "mlx"),
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

/// A named model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantConfig {
    /// Engine family
    pub framework: Framework,

    /// Name shown to users; defaults to the variant key
    #[serde(default)]
    pub display_name: Option<String>,

    /// Engine base URL; defaults per framework
    #[serde(default)]
    pub host: Option<String>,

    /// Model identifier understood by the engine
    pub model: String,

    /// LoRA adapter: served adapter name (vLLM) or adapter path (MLX)
    #[serde(default)]
    pub adapter: Option<String>,

    /// Per-request HTTP timeout (seconds), covering the whole stream
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Override the process-wide generation lock for this variant
    #[serde(default)]
    pub serialize_generation: Option<bool>,
}

fn default_request_timeout() -> u64 {
    600
}

impl VariantConfig {
    /// Create a variant with framework defaults
    ///
    /// # Examples
    ///
    /// ```
    /// use lexai::config::{Framework, VariantConfig};
    ///
    /// let variant = VariantConfig::new(Framework::Ollama, "qwen3:1.7b");
    /// assert_eq!(variant.host(), "http://localhost:11434");
    /// assert!(!variant.serializes());
    /// ```
    pub fn new(framework: Framework, model: impl Into<String>) -> Self {
        Self {
            framework,
            display_name: None,
            host: None,
            model: model.into(),
            adapter: None,
            request_timeout_seconds: default_request_timeout(),
            serialize_generation: None,
        }
    }

    /// Builder-style display name
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Builder-style host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Engine base URL without a trailing slash
    pub fn host(&self) -> String {
        self.host
            .as_deref()
            .unwrap_or_else(|| self.framework.default_host())
            .trim_end_matches('/')
            .to_string()
    }

    /// Display name, falling back to the variant key
    pub fn display_name_or(&self, variant: &str) -> String {
        self.display_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| variant.to_string())
    }

    /// Whether calls into this engine take the process-wide generation lock
    pub fn serializes(&self) -> bool {
        self.serialize_generation
            .unwrap_or_else(|| self.framework.serializes_by_default())
    }
}

fn default_variants() -> BTreeMap<String, VariantConfig> {
    let mut variants = BTreeMap::new();
    variants.insert(
        "finetuned".to_string(),
        VariantConfig::new(Framework::Ollama, "lexai-qwen3:1.7b")
            .with_display_name("LexAI (미세조정)"),
    );
    variants.insert(
        "baseline".to_string(),
        VariantConfig::new(Framework::Ollama, "qwen3:1.7b")
            .with_display_name("Qwen3-1.7B (Baseline)"),
    );
    variants
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default_config()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn default_config() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            generation: GenerationConfig::default(),
            chat: ChatConfig::default(),
            compare: CompareConfig::default(),
            variants: default_variants(),
        }
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| LexaiError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| LexaiError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(host) = std::env::var("LEXAI_HOST") {
            self.server.host = host;
        }

        if let Ok(port) = std::env::var("LEXAI_PORT") {
            match port.parse() {
                Ok(value) => self.server.port = value,
                Err(_) => tracing::warn!("Invalid LEXAI_PORT: {}", port),
            }
        }

        if let Ok(log_dir) = std::env::var("LEXAI_LOG_DIR") {
            self.storage.log_dir = PathBuf::from(log_dir);
        }

        if let Ok(variant) = std::env::var("LEXAI_DEFAULT_VARIANT") {
            self.chat.default_variant = variant;
        }

        if let Ok(max_new_tokens) = std::env::var("LEXAI_MAX_NEW_TOKENS") {
            match max_new_tokens.parse() {
                Ok(value) => self.generation.max_new_tokens = value,
                Err(_) => tracing::warn!("Invalid LEXAI_MAX_NEW_TOKENS: {}", max_new_tokens),
            }
        }

        if let Ok(temperature) = std::env::var("LEXAI_TEMPERATURE") {
            match temperature.parse() {
                Ok(value) => self.generation.temperature = value,
                Err(_) => tracing::warn!("Invalid LEXAI_TEMPERATURE: {}", temperature),
            }
        }

        if let Ok(top_p) = std::env::var("LEXAI_TOP_P") {
            match top_p.parse() {
                Ok(value) => self.generation.top_p = value,
                Err(_) => tracing::warn!("Invalid LEXAI_TOP_P: {}", top_p),
            }
        }

        if let Ok(timeout) = std::env::var("LEXAI_COMPARE_TIMEOUT_SECONDS") {
            match timeout.parse() {
                Ok(value) => self.compare.timeout_seconds = value,
                Err(_) => tracing::warn!("Invalid LEXAI_COMPARE_TIMEOUT_SECONDS: {}", timeout),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let crate::cli::Commands::Serve {
            host,
            port,
            log_dir,
            no_warm_up,
        } = &cli.command
        {
            if let Some(host) = host {
                self.server.host = host.clone();
            }
            if let Some(port) = port {
                self.server.port = *port;
            }
            if let Some(log_dir) = log_dir {
                self.storage.log_dir = log_dir.clone();
            }
            if *no_warm_up {
                self.chat.warm_up = false;
            }
        }
    }

    /// Look up a configured variant
    pub fn variant(&self, name: &str) -> Option<&VariantConfig> {
        self.variants.get(name)
    }

    /// Display name for a variant, falling back to its key
    pub fn display_name(&self, variant: &str) -> String {
        self.variant(variant)
            .map(|v| v.display_name_or(variant))
            .unwrap_or_else(|| variant.to_string())
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(LexaiError::Config("server.port must be greater than 0".to_string()).into());
        }

        if self.variants.is_empty() {
            return Err(
                LexaiError::Config("at least one model variant must be configured".to_string())
                    .into(),
            );
        }

        if self.variants.contains_key(COMPARE_VARIANT) {
            return Err(LexaiError::Config(format!(
                "'{}' is reserved and cannot name a variant",
                COMPARE_VARIANT
            ))
            .into());
        }

        for (name, variant) in &self.variants {
            if variant.model.trim().is_empty() {
                return Err(
                    LexaiError::Config(format!("variants.{}.model cannot be empty", name)).into(),
                );
            }
            if variant.request_timeout_seconds == 0 {
                return Err(LexaiError::Config(format!(
                    "variants.{}.request_timeout_seconds must be greater than 0",
                    name
                ))
                .into());
            }
            if let Err(e) = url::Url::parse(&variant.host()) {
                return Err(LexaiError::Config(format!(
                    "variants.{}.host is not a valid URL: {}",
                    name, e
                ))
                .into());
            }
        }

        if !self.variants.contains_key(&self.chat.default_variant) {
            return Err(LexaiError::Config(format!(
                "chat.default_variant '{}' is not a configured variant",
                self.chat.default_variant
            ))
            .into());
        }

        if self.compare.variants.len() != 2 {
            return Err(LexaiError::Config(
                "compare.variants must list exactly two variants".to_string(),
            )
            .into());
        }

        if self.compare.variants[0] == self.compare.variants[1] {
            return Err(
                LexaiError::Config("compare.variants must be distinct".to_string()).into(),
            );
        }

        for name in &self.compare.variants {
            if !self.variants.contains_key(name) {
                return Err(LexaiError::Config(format!(
                    "compare variant '{}' is not a configured variant",
                    name
                ))
                .into());
            }
        }

        if self.compare.timeout_seconds == 0 {
            return Err(LexaiError::Config(
                "compare.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.compare.channel_capacity == 0 {
            return Err(LexaiError::Config(
                "compare.channel_capacity must be greater than 0".to_string(),
            )
            .into());
        }

        if self.generation.max_new_tokens == 0 {
            return Err(LexaiError::Config(
                "generation.max_new_tokens must be greater than 0".to_string(),
            )
            .into());
        }

        if !self.generation.temperature.is_finite() || self.generation.temperature < 0.0 {
            return Err(LexaiError::Config(
                "generation.temperature must be a non-negative number".to_string(),
            )
            .into());
        }

        if self.generation.top_p.is_nan()
            || self.generation.top_p <= 0.0
            || self.generation.top_p > 1.0
        {
            return Err(LexaiError::Config(
                "generation.top_p must be between 0.0 and 1.0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
