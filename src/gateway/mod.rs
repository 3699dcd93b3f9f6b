//! Inference gateway: prompt validation, model resolution, and generation
//! dispatch.
//!
//! The gateway is the single entry point for text generation. It validates
//! the prompt, resolves which model serves the request (explicit name or
//! the registry's current model), acquires a handle, and forwards to the
//! loader with the request overrides merged over the model's configured
//! generation defaults. The handle is borrowed for the duration of one call
//! and never retained between requests.

use std::time::Instant;

use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::registry::ModelRegistry;
use crate::types::{GenerationOverrides, GenerationResult};

/// Stateless facade over a [`ModelRegistry`] for generation requests.
#[derive(Clone, Debug)]
pub struct InferenceGateway {
    registry: ModelRegistry,
}

impl InferenceGateway {
    pub fn new(registry: ModelRegistry) -> Self {
        Self { registry }
    }

    /// The registry this gateway dispatches to.
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Generate a completion for `prompt`.
    ///
    /// `model` picks the serving model explicitly; without it the registry's
    /// current model is used, and [`RegistryError::NoModelSpecified`] is
    /// returned when neither exists. The prompt must be non-empty and within
    /// the configured length limit. Validation runs before any model work,
    /// so a rejected request never triggers a load.
    ///
    /// `overrides` are merged over the model's configured generation
    /// defaults; unset fields fall back to the defaults. The reported
    /// processing time covers the whole request, including any load the
    /// acquire triggered.
    pub async fn generate(
        &self,
        model: Option<&str>,
        prompt: &str,
        overrides: &GenerationOverrides,
    ) -> RegistryResult<GenerationResult> {
        if prompt.is_empty() {
            return Err(RegistryError::EmptyPrompt);
        }
        let max = self.registry.max_prompt_length();
        if prompt.chars().count() > max {
            return Err(RegistryError::PromptTooLong {
                actual: prompt.chars().count(),
                max,
            });
        }

        let name = match model {
            Some(name) => name.to_string(),
            None => self
                .registry
                .current()
                .ok_or(RegistryError::NoModelSpecified)?,
        };

        let started = Instant::now();
        let handle = self.registry.acquire(&name).await?;
        let params = overrides.resolve(&handle.config().defaults);

        let raw = self
            .registry
            .loader()
            .generate(handle.payload(), prompt, &params)
            .await
            .map_err(|err| RegistryError::GenerationFailed {
                model: name.clone(),
                reason: err.to_string(),
            })?;

        let processing_time = started.elapsed();
        debug!(
            "generated {} tokens with '{}' in {:?}",
            raw.tokens_used, name, processing_time
        );
        Ok(GenerationResult {
            text: raw.text,
            model: name,
            tokens_used: raw.tokens_used,
            processing_time,
        })
    }
}

#[cfg(test)]
mod tests;
