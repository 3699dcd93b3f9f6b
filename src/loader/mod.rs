//! The loader seam: the narrow contract between the registry and the
//! external inference framework.
//!
//! The registry never sees framework types. A [`ModelLoader`] produces an
//! opaque [`ModelPayload`] (whatever native memory and device state the
//! framework allocated), tears it down again, and runs generation against
//! it. Everything else — tokenization, sampling numerics, quantization,
//! device placement — lives behind this trait.
//!
//! # Thread Safety
//!
//! All trait bounds require `Send + Sync` so a loader can be shared across
//! async tasks. Loader calls are long-running (seconds to minutes for a
//! large model) and are always awaited outside the registry lock.

mod stub;

pub use stub::{StubEvent, StubLoader, StubModel};

use std::any::Any;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ModelConfig;
use crate::types::GenerationParams;

/// Error reported by a [`ModelLoader`] implementation.
///
/// The registry flattens this into [`crate::RegistryError::LoadFailed`],
/// [`crate::RegistryError::TeardownFailed`], or
/// [`crate::RegistryError::GenerationFailed`] with the message as cause.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct LoaderError {
    /// Human-readable failure description.
    pub message: String,
}

impl LoaderError {
    /// Build an error from any displayable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Opaque loaded-model state owned by a [`crate::ModelHandle`].
///
/// Type-erases the framework's pipeline/tokenizer/model so the registry
/// doesn't need to know concrete types. Only the loader that produced a
/// payload is expected to downcast it.
pub struct ModelPayload {
    inner: Box<dyn Any + Send + Sync>,
}

impl ModelPayload {
    /// Wrap a concrete loaded-model value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Box::new(value),
        }
    }

    /// Downcast back to the concrete type the loader stored.
    ///
    /// Returns `None` if the payload holds a different type.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl std::fmt::Debug for ModelPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelPayload").finish_non_exhaustive()
    }
}

/// A successfully loaded model as returned by [`ModelLoader::load_model`].
#[derive(Debug)]
pub struct LoadedModel {
    /// The opaque framework state.
    pub payload: ModelPayload,
    /// Measured resident footprint, if the loader knows it. `None` falls
    /// back to the [`ModelConfig::memory_estimate_bytes`] estimate.
    pub memory_estimate_bytes: Option<u64>,
}

/// Raw generation output as returned by [`ModelLoader::generate`].
#[derive(Debug, Clone)]
pub struct RawGeneration {
    /// The generated text.
    pub text: String,
    /// Approximate token count for the completion.
    pub tokens_used: u32,
}

/// Capability contract implemented by the external inference framework.
///
/// The registry depends only on this trait: load a model from its config,
/// release it, and generate text against a resident payload. Timeouts on
/// `load_model` are enforced by the registry, not the loader.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load the named model according to `config`.
    ///
    /// # Errors
    /// Any failure (missing weights, allocation failure, device error) is
    /// reported as a [`LoaderError`]; the registry maps it to
    /// `LoadFailed` and leaves no residue for the name.
    async fn load_model(&self, name: &str, config: &ModelConfig)
        -> Result<LoadedModel, LoaderError>;

    /// Release the resources behind a previously loaded payload.
    ///
    /// # Errors
    /// A teardown failure is reported once; the registry has already
    /// removed the entry and will not retry.
    async fn unload_model(&self, name: &str, payload: &ModelPayload) -> Result<(), LoaderError>;

    /// Generate text against a resident payload.
    ///
    /// # Errors
    /// Returns a [`LoaderError`] on inference failure; the registry
    /// surfaces it as `GenerationFailed`, never as an empty string.
    async fn generate(
        &self,
        payload: &ModelPayload,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<RawGeneration, LoaderError>;
}
