//! Configuration for the model registry.
//!
//! # Loading Configuration
//!
//! ```rust,ignore
//! use inference_registry::RegistryConfig;
//!
//! // Load from file
//! let config = RegistryConfig::from_file("registry.toml")?;
//!
//! // Or use defaults for development
//! let config = RegistryConfig::default();
//!
//! // With environment overrides
//! let config = RegistryConfig::default().with_env_overrides();
//! ```
//!
//! # TOML Structure
//!
//! ```toml
//! memory_budget_bytes = 17179869184
//! auto_load = true
//! load_timeout_secs = 300
//! default_model = "mistral-7b-instruct"
//! preload_models = ["mistral-7b-instruct"]
//! max_prompt_length = 4096
//!
//! [models.mistral-7b-instruct]
//! path = "mistralai/Mistral-7B-Instruct-v0.2"
//! format = "safetensors"
//! device = "auto"
//! quantization = "int4"
//! context_length = 4096
//! memory_estimate_bytes = 8589934592
//!
//! [models.mistral-7b-instruct.defaults]
//! max_tokens = 512
//! temperature = 0.7
//! top_p = 0.9
//! ```
//!
//! # Design Principles
//!
//! - **NO FALLBACKS**: invalid config returns an error, never silently
//!   defaults; a model name with no entry is `ConfigNotFound` at load time
//! - **FAIL FAST**: file not found or parse error returns immediately
//! - **RELOAD SAFETY**: replacing the model map at runtime never disturbs
//!   already-loaded handles (see `ModelRegistry::replace_configs`)

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};
use crate::types::GenerationParams;

/// One gibibyte in bytes.
const GIB: u64 = 1024 * 1024 * 1024;

// ============================================================================
// MODEL DESCRIPTION ENUMS
// ============================================================================

/// On-disk format of a model's weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    /// SafeTensors weight files (recommended).
    #[default]
    Safetensors,
    /// GGUF single-file quantized format.
    Gguf,
    /// Legacy PyTorch pickle checkpoints.
    Pytorch,
}

impl ModelFormat {
    /// Returns all supported formats.
    pub fn all() -> &'static [ModelFormat] {
        &[Self::Safetensors, Self::Gguf, Self::Pytorch]
    }

    /// Returns the format name as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safetensors => "safetensors",
            Self::Gguf => "gguf",
            Self::Pytorch => "pytorch",
        }
    }
}

/// Device placement preference handed to the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePreference {
    /// Let the loader pick (GPU when available).
    #[default]
    Auto,
    /// Require a CUDA device.
    Cuda,
    /// Force CPU placement.
    Cpu,
}

impl DevicePreference {
    /// Returns the preference name as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Cuda => "cuda",
            Self::Cpu => "cpu",
        }
    }
}

/// Quantization mode applied at load time.
///
/// Lower precision reduces the resident footprint at some accuracy cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantizationMode {
    /// No quantization; native weight precision.
    #[default]
    None,
    /// 8-bit integer quantization.
    Int8,
    /// 4-bit integer quantization.
    Int4,
}

impl QuantizationMode {
    /// Approximate footprint multiplier relative to FP16 weights.
    #[must_use]
    pub fn memory_multiplier(&self) -> f32 {
        match self {
            Self::None => 1.0,
            Self::Int8 => 0.5,
            Self::Int4 => 0.25,
        }
    }

    /// Returns the mode name as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Int8 => "int8",
            Self::Int4 => "int4",
        }
    }
}

// ============================================================================
// MODEL CONFIG
// ============================================================================

/// Static, declarative description of one model.
///
/// Immutable once read from configuration; a `ModelConfig` may exist without
/// the model ever being loaded. The registry copies it into the handle at
/// load time, so later config reloads only affect future loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Source location: HuggingFace repo id or filesystem path.
    pub path: String,

    /// Weight file format.
    #[serde(default)]
    pub format: ModelFormat,

    /// Device placement preference.
    #[serde(default)]
    pub device: DevicePreference,

    /// Quantization applied at load time.
    #[serde(default)]
    pub quantization: QuantizationMode,

    /// Maximum context length in tokens.
    #[serde(default = "default_context_length")]
    pub context_length: u32,

    /// Approximate resident footprint once loaded, used for budget
    /// accounting when the loader does not report its own estimate.
    #[serde(default = "default_memory_estimate_bytes")]
    pub memory_estimate_bytes: u64,

    /// Default generation parameters; request overrides merge over these.
    #[serde(default)]
    pub defaults: GenerationParams,
}

fn default_context_length() -> u32 {
    4096
}

fn default_memory_estimate_bytes() -> u64 {
    8 * GIB
}

impl ModelConfig {
    /// Minimal config for a model at `path`, everything else defaulted.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            format: ModelFormat::default(),
            device: DevicePreference::default(),
            quantization: QuantizationMode::default(),
            context_length: default_context_length(),
            memory_estimate_bytes: default_memory_estimate_bytes(),
            defaults: GenerationParams::default(),
        }
    }

    /// Builder-style override of the memory estimate.
    #[must_use]
    pub fn with_memory_estimate(mut self, bytes: u64) -> Self {
        self.memory_estimate_bytes = bytes;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns [`RegistryError::ConfigError`] if:
    /// - `path` is empty
    /// - `context_length` is 0
    /// - `memory_estimate_bytes` is 0
    /// - the default generation parameters are invalid
    pub fn validate(&self) -> RegistryResult<()> {
        if self.path.is_empty() {
            return Err(RegistryError::ConfigError {
                message: "path cannot be empty".to_string(),
            });
        }
        if self.context_length == 0 {
            return Err(RegistryError::ConfigError {
                message: "context_length must be > 0".to_string(),
            });
        }
        if self.memory_estimate_bytes == 0 {
            return Err(RegistryError::ConfigError {
                message: "memory_estimate_bytes must be > 0".to_string(),
            });
        }
        self.defaults.validate()
    }
}

// ============================================================================
// REGISTRY CONFIG
// ============================================================================

/// Root configuration for the model registry.
///
/// Supplies the name -> [`ModelConfig`] map, the memory budget, and the
/// residency policy knobs. Read once at startup; [`RegistryConfig::models`]
/// may be swapped at runtime via `ModelRegistry::replace_configs` without
/// disturbing loaded handles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Memory budget across all loaded models. Eviction keeps the total at
    /// or under this after every load, unless nothing is evictable.
    #[serde(default = "default_memory_budget_bytes")]
    pub memory_budget_bytes: u64,

    /// Whether `acquire` may trigger a load for an absent model.
    /// When false, inference against an absent model is `ModelNotLoaded`.
    #[serde(default = "default_auto_load")]
    pub auto_load: bool,

    /// Maximum time for a single loader load call before it is failed with
    /// a timeout cause.
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,

    /// Model the current-model pointer is set to after `preload`.
    #[serde(default)]
    pub default_model: Option<String>,

    /// Models loaded eagerly by `ModelRegistry::preload`.
    #[serde(default)]
    pub preload_models: Vec<String>,

    /// Maximum prompt length in characters accepted by the gateway.
    #[serde(default = "default_max_prompt_length")]
    pub max_prompt_length: usize,

    /// Known models, keyed by name.
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,
}

fn default_memory_budget_bytes() -> u64 {
    16 * GIB
}

fn default_auto_load() -> bool {
    true
}

fn default_load_timeout_secs() -> u64 {
    300
}

fn default_max_prompt_length() -> usize {
    4096
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            memory_budget_bytes: default_memory_budget_bytes(),
            auto_load: default_auto_load(),
            load_timeout_secs: default_load_timeout_secs(),
            default_model: None,
            preload_models: Vec::new(),
            max_prompt_length: default_max_prompt_length(),
            models: HashMap::new(),
        }
    }
}

impl RegistryConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns [`RegistryError::ConfigError`] if the file cannot be read or
    /// the TOML fails to parse.
    pub fn from_file(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let path = path.as_ref();

        let contents = std::fs::read_to_string(path).map_err(|e| RegistryError::ConfigError {
            message: format!("failed to read config file '{}': {}", path.display(), e),
        })?;

        Self::from_toml_str(&contents)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns [`RegistryError::ConfigError`] if parsing fails.
    pub fn from_toml_str(contents: &str) -> RegistryResult<Self> {
        toml::from_str(contents).map_err(|e| RegistryError::ConfigError {
            message: format!("failed to parse TOML: {e}"),
        })
    }

    /// Serialize configuration to a TOML string.
    ///
    /// # Errors
    /// Returns [`RegistryError::ConfigError`] if serialization fails.
    pub fn to_toml_string(&self) -> RegistryResult<String> {
        toml::to_string_pretty(self).map_err(|e| RegistryError::ConfigError {
            message: format!("failed to serialize to TOML: {e}"),
        })
    }

    /// Validate all configuration values.
    ///
    /// # Errors
    /// Returns [`RegistryError::ConfigError`] if:
    /// - `memory_budget_bytes`, `load_timeout_secs`, or `max_prompt_length`
    ///   is 0
    /// - `default_model` or a `preload_models` entry names a model with no
    ///   entry in `models`
    /// - any [`ModelConfig`] fails its own validation
    pub fn validate(&self) -> RegistryResult<()> {
        if self.memory_budget_bytes == 0 {
            return Err(RegistryError::ConfigError {
                message: "memory_budget_bytes must be > 0".to_string(),
            });
        }
        if self.load_timeout_secs == 0 {
            return Err(RegistryError::ConfigError {
                message: "load_timeout_secs must be > 0".to_string(),
            });
        }
        if self.max_prompt_length == 0 {
            return Err(RegistryError::ConfigError {
                message: "max_prompt_length must be > 0".to_string(),
            });
        }

        if let Some(name) = &self.default_model {
            if !self.models.contains_key(name) {
                return Err(RegistryError::ConfigError {
                    message: format!("default_model '{name}' has no entry in [models]"),
                });
            }
        }
        for name in &self.preload_models {
            if !self.models.contains_key(name) {
                return Err(RegistryError::ConfigError {
                    message: format!("preload model '{name}' has no entry in [models]"),
                });
            }
        }

        for (name, model) in &self.models {
            model.validate().map_err(|e| RegistryError::ConfigError {
                message: format!("[models.{name}] {e}"),
            })?;
        }

        Ok(())
    }

    /// Apply environment variable overrides. Prefix: `REGISTRY_`.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `REGISTRY_MEMORY_BUDGET_BYTES` | `memory_budget_bytes` |
    /// | `REGISTRY_AUTO_LOAD` | `auto_load` |
    /// | `REGISTRY_LOAD_TIMEOUT_SECS` | `load_timeout_secs` |
    /// | `REGISTRY_DEFAULT_MODEL` | `default_model` |
    /// | `REGISTRY_MAX_PROMPT_LENGTH` | `max_prompt_length` |
    ///
    /// Unparseable values are ignored and the existing value kept.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = env::var("REGISTRY_MEMORY_BUDGET_BYTES") {
            if let Ok(n) = val.parse::<u64>() {
                self.memory_budget_bytes = n;
            }
        }
        if let Ok(val) = env::var("REGISTRY_AUTO_LOAD") {
            if let Ok(b) = val.parse::<bool>() {
                self.auto_load = b;
            }
        }
        if let Ok(val) = env::var("REGISTRY_LOAD_TIMEOUT_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                self.load_timeout_secs = n;
            }
        }
        if let Ok(val) = env::var("REGISTRY_DEFAULT_MODEL") {
            if !val.is_empty() {
                self.default_model = Some(val);
            }
        }
        if let Ok(val) = env::var("REGISTRY_MAX_PROMPT_LENGTH") {
            if let Ok(n) = val.parse::<usize>() {
                self.max_prompt_length = n;
            }
        }
        self
    }

    /// The load timeout as a [`Duration`].
    #[must_use]
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }
}

// ============================================================================
// TESTS
// ============================================================================
