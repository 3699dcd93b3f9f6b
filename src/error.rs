//! Error types for registry and gateway operations.
//!
//! # Error Categories
//!
//! | Category | Variants | Recovery Strategy |
//! |----------|----------|-------------------|
//! | Configuration | ConfigNotFound, ConfigError | Fix configuration |
//! | Residency | LoadFailed, ModelNotLoaded, TeardownFailed | Retry is the caller's choice |
//! | Request | NoModelSpecified, EmptyPrompt, PromptTooLong | Fix the request |
//! | Inference | GenerationFailed | Retry or switch model |
//! | Budget | MemoryBudgetExceeded | Warning only, never fatal |
//!
//! # Design Principles
//!
//! - **NO FALLBACKS**: a missing configuration is `ConfigNotFound`, never a
//!   silently substituted default
//! - **NO AUTOMATIC RETRIES**: a failed load of a large model is expensive;
//!   the registry reports it once and leaves retrying to the caller
//! - **CONTEXTUAL**: every variant carries the model name and cause needed
//!   to debug it
//!
//! All variants are `Clone` so a single load outcome can be fanned out to
//! every caller joined to the same in-flight load.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Why a loader invocation failed.
///
/// Attached to [`RegistryError::LoadFailed`] so callers can distinguish a
/// timeout (the registry gave up waiting) from a loader-reported failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadFailureCause {
    /// The loader did not complete within the configured load timeout.
    Timeout {
        /// The timeout that was exceeded, in milliseconds.
        timeout_ms: u64,
    },
    /// The loader returned an error of its own.
    Loader {
        /// The loader's error message.
        reason: String,
    },
    /// The load task stopped without publishing a result (panic or runtime
    /// shutdown). Waiters are still released with this cause.
    Aborted,
}

impl std::fmt::Display for LoadFailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { timeout_ms } => write!(f, "timed out after {timeout_ms}ms"),
            Self::Loader { reason } => write!(f, "{reason}"),
            Self::Aborted => write!(f, "load task aborted before completion"),
        }
    }
}

/// Error type for all registry and gateway failures.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    // === Configuration Errors ===
    /// No configuration is registered for the requested model and none was
    /// supplied with the call.
    #[error("no configuration registered for model '{model}'")]
    ConfigNotFound {
        /// The model name that was looked up.
        model: String,
    },

    /// Configuration file invalid or a field failed validation.
    #[error("configuration error: {message}")]
    ConfigError {
        /// Description of the invalid field or parse failure.
        message: String,
    },

    // === Residency Errors ===
    /// The loader failed (or timed out) while loading a model. The registry
    /// holds no residue for the model afterwards.
    #[error("load failed for model '{model}': {cause}")]
    LoadFailed {
        /// The model that failed to load.
        model: String,
        /// Timeout vs. loader-reported failure.
        cause: LoadFailureCause,
    },

    /// `acquire` was called for an absent model with auto-load disabled.
    #[error("model '{model}' is not loaded")]
    ModelNotLoaded {
        /// The model name that was requested.
        model: String,
    },

    /// The loader's teardown call failed during unload. The entry has
    /// already been removed from the registry; the leaked native resource
    /// is reported, not retried.
    #[error("teardown failed for model '{model}': {reason} (entry removed)")]
    TeardownFailed {
        /// The model whose teardown failed.
        model: String,
        /// The loader's error message.
        reason: String,
    },

    // === Budget (warning, non-fatal) ===
    /// Total resident footprint exceeds the budget and nothing is evictable.
    /// Reported through logging; never returned from `load`, which prefers
    /// availability over strict budget enforcement.
    #[error(
        "memory budget exceeded: {total_bytes} bytes resident, budget {budget_bytes} bytes, \
         no evictable model"
    )]
    MemoryBudgetExceeded {
        /// Sum of estimates across loaded handles.
        total_bytes: u64,
        /// The configured budget.
        budget_bytes: u64,
    },

    // === Request Errors ===
    /// `generate` was called without a model name and no current model is set.
    #[error("no model specified and no current model is set")]
    NoModelSpecified,

    /// Empty prompt.
    #[error("prompt must not be empty")]
    EmptyPrompt,

    /// Prompt exceeds the configured maximum length.
    #[error("prompt too long: {actual} characters exceeds max {max}")]
    PromptTooLong {
        /// Length of the rejected prompt.
        actual: usize,
        /// Configured maximum.
        max: usize,
    },

    // === Inference Errors ===
    /// The loader's generate call failed for a resident model.
    #[error("generation failed for model '{model}': {reason}")]
    GenerationFailed {
        /// The model the prompt was routed to.
        model: String,
        /// The loader's error message.
        reason: String,
    },
}

impl RegistryError {
    /// True for conditions the caller can correct by changing the request
    /// or configuration, as opposed to loader-side failures.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. }
                | Self::ConfigError { .. }
                | Self::ModelNotLoaded { .. }
                | Self::NoModelSpecified
                | Self::EmptyPrompt
                | Self::PromptTooLong { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_failed_display_includes_cause() {
        let err = RegistryError::LoadFailed {
            model: "mistral-7b-instruct".to_string(),
            cause: LoadFailureCause::Timeout { timeout_ms: 300_000 },
        };
        let msg = err.to_string();
        assert!(msg.contains("mistral-7b-instruct"));
        assert!(msg.contains("300000ms"));
    }

    #[test]
    fn caller_errors_classified() {
        assert!(RegistryError::NoModelSpecified.is_caller_error());
        assert!(RegistryError::ConfigNotFound {
            model: "x".to_string()
        }
        .is_caller_error());
        assert!(!RegistryError::LoadFailed {
            model: "x".to_string(),
            cause: LoadFailureCause::Aborted,
        }
        .is_caller_error());
        assert!(!RegistryError::TeardownFailed {
            model: "x".to_string(),
            reason: "cuda free failed".to_string(),
        }
        .is_caller_error());
    }

    #[test]
    fn errors_are_cloneable_for_waiter_fanout() {
        let err = RegistryError::LoadFailed {
            model: "m".to_string(),
            cause: LoadFailureCause::Loader {
                reason: "weight file corrupted".to_string(),
            },
        };
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
