//! Request-scoped types: generation parameters, results, and registry
//! snapshots.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::{RegistryError, RegistryResult};

// ============================================================================
// GENERATION PARAMETERS
// ============================================================================

/// Fully-resolved sampling parameters passed to the loader.
///
/// A [`ModelConfig`] carries a complete set of defaults; a request supplies
/// [`GenerationOverrides`] which are merged over those defaults
/// field-by-field. The loader only ever sees a resolved `GenerationParams`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Maximum number of tokens to generate.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature. 0 means greedy decoding.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling probability mass, in (0.0, 1.0].
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Top-k cutoff. `None` disables top-k filtering.
    #[serde(default)]
    pub top_k: Option<u32>,

    /// Stop sequences that terminate generation.
    #[serde(default)]
    pub stop: Vec<String>,
}

fn default_max_tokens() -> u32 {
    512
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: None,
            stop: Vec::new(),
        }
    }
}

impl GenerationParams {
    /// Validate parameter ranges.
    ///
    /// # Errors
    /// Returns [`RegistryError::ConfigError`] if:
    /// - `max_tokens` is 0
    /// - `temperature` is negative or NaN
    /// - `top_p` is outside (0.0, 1.0] or NaN
    pub fn validate(&self) -> RegistryResult<()> {
        if self.max_tokens == 0 {
            return Err(RegistryError::ConfigError {
                message: "max_tokens must be > 0".to_string(),
            });
        }
        if self.temperature < 0.0 || self.temperature.is_nan() {
            return Err(RegistryError::ConfigError {
                message: format!("temperature must be >= 0 and not NaN, got {}", self.temperature),
            });
        }
        if self.top_p <= 0.0 || self.top_p > 1.0 || self.top_p.is_nan() {
            return Err(RegistryError::ConfigError {
                message: format!("top_p must be in (0.0, 1.0], got {}", self.top_p),
            });
        }
        Ok(())
    }
}

/// Per-request parameter overrides.
///
/// Every field is optional; unset fields fall back to the model's configured
/// defaults during [`GenerationOverrides::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOverrides {
    /// Override for [`GenerationParams::max_tokens`].
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Override for [`GenerationParams::temperature`].
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Override for [`GenerationParams::top_p`].
    #[serde(default)]
    pub top_p: Option<f32>,

    /// Override for [`GenerationParams::top_k`].
    #[serde(default)]
    pub top_k: Option<u32>,

    /// Override for [`GenerationParams::stop`].
    #[serde(default)]
    pub stop: Option<Vec<String>>,
}

impl GenerationOverrides {
    /// Merge these overrides over `defaults`, field by field.
    #[must_use]
    pub fn resolve(&self, defaults: &GenerationParams) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            top_k: self.top_k.or(defaults.top_k),
            stop: self.stop.clone().unwrap_or_else(|| defaults.stop.clone()),
        }
    }
}

// ============================================================================
// GENERATION RESULT
// ============================================================================

/// Outcome of a successful gateway generation.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// The generated text.
    pub text: String,
    /// The model that served the request (after current-model resolution).
    pub model: String,
    /// Approximate token count reported by the loader.
    pub tokens_used: u32,
    /// Wall-clock time for the whole request, including any load the
    /// acquire triggered.
    pub processing_time: Duration,
}

// ============================================================================
// REGISTRY SNAPSHOTS
// ============================================================================

/// Residency state of a model as seen in a [`ModelSnapshot`].
///
/// `Unloading` is transient: an unload removes the entry under the lock
/// before tearing the handle down, so snapshots normally observe only
/// `Loading` and `Loaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    /// A load is in flight; duplicate callers are joined to it.
    Loading,
    /// Resident and ready for inference.
    Loaded,
    /// Being torn down.
    Unloading,
}

impl ModelState {
    /// Human-readable state name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Unloading => "unloading",
        }
    }
}

/// Point-in-time view of one registry entry, as returned by
/// [`crate::ModelRegistry::list`]. A snapshot, not a live view.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSnapshot {
    /// The model name.
    pub name: String,
    /// Residency state at snapshot time.
    pub state: ModelState,
    /// The configuration the model was (or is being) loaded with.
    pub config: ModelConfig,
    /// When the load committed. `None` while loading.
    pub loaded_at: Option<DateTime<Utc>>,
    /// Last time the handle was acquired for inference. `None` while loading.
    pub last_used_at: Option<DateTime<Utc>>,
    /// Approximate resident footprint. `None` while loading.
    pub memory_estimate_bytes: Option<u64>,
}
