//! Lifecycle operations: unload, acquire, current-model tracking, preload,
//! configuration replacement, and shutdown.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::handle::ModelHandle;

use super::core::{LoadOutcome, ModelRegistry, ResidencySlot};
use super::load::{await_outcome, teardown};

enum UnloadStep {
    Wait(watch::Receiver<Option<LoadOutcome>>),
    Remove(Arc<ModelHandle>),
}

impl ModelRegistry {
    /// Unload a model, releasing its resources.
    ///
    /// Returns `Ok(true)` when the model is no longer resident, including
    /// the no-op case where it never was; unload is idempotent. An unload
    /// racing an in-flight load of the same name queues behind it and then
    /// tears down whatever the load produced. On teardown failure the model
    /// is still gone from the registry; the error reports the leak.
    pub async fn unload(&self, name: &str) -> RegistryResult<bool> {
        loop {
            let step = {
                let mut state = self.inner.state.lock();
                match state.slots.get(name) {
                    None => {
                        debug!("unload of '{}' is a no-op (not resident)", name);
                        return Ok(true);
                    }
                    Some(ResidencySlot::Loading { rx, .. }) => UnloadStep::Wait(rx.clone()),
                    Some(ResidencySlot::Loaded(_)) => {
                        let Some(ResidencySlot::Loaded(handle)) = state.slots.remove(name) else {
                            unreachable!("slot matched Loaded under the same lock");
                        };
                        if state.current.as_deref() == Some(name) {
                            state.current = None;
                        }
                        UnloadStep::Remove(handle)
                    }
                }
            };

            match step {
                UnloadStep::Wait(rx) => {
                    // Queue behind the in-flight load, then re-inspect. A
                    // failed load leaves nothing resident, so the next pass
                    // returns Ok(false).
                    let _ = await_outcome(name, rx).await;
                }
                UnloadStep::Remove(handle) => {
                    info!("unloading model '{}'", name);
                    teardown(&self.inner, &handle).await?;
                    return Ok(true);
                }
            }
        }
    }

    /// Get a handle for inference, recording the use for LRU purposes.
    ///
    /// Joins an in-flight load of the same name. When the model is absent
    /// and auto-load is enabled, loads it from its registered configuration;
    /// otherwise fails with [`RegistryError::ModelNotLoaded`].
    pub async fn acquire(&self, name: &str) -> RegistryResult<Arc<ModelHandle>> {
        let join = {
            let state = self.inner.state.lock();
            match state.slots.get(name) {
                Some(ResidencySlot::Loaded(handle)) => {
                    handle.touch();
                    return Ok(Arc::clone(handle));
                }
                Some(ResidencySlot::Loading { rx, .. }) => Some(rx.clone()),
                None => None,
            }
        };

        let handle = match join {
            Some(rx) => await_outcome(name, rx).await?,
            None if self.inner.auto_load => self.load(name).await?,
            None => {
                return Err(RegistryError::ModelNotLoaded {
                    model: name.to_string(),
                })
            }
        };
        handle.touch();
        Ok(handle)
    }

    /// Mark a loaded model as the current default for inference.
    ///
    /// Fails with [`RegistryError::ModelNotLoaded`] if the model is not
    /// resident; a loading model does not qualify until its load settles.
    pub fn set_current(&self, name: &str) -> RegistryResult<()> {
        let mut state = self.inner.state.lock();
        if !matches!(state.slots.get(name), Some(ResidencySlot::Loaded(_))) {
            return Err(RegistryError::ModelNotLoaded {
                model: name.to_string(),
            });
        }
        info!("current model set to '{}'", name);
        state.current = Some(name.to_string());
        Ok(())
    }

    /// The current default model, if one is set and still resident.
    pub fn current(&self) -> Option<String> {
        self.inner.state.lock().current.clone()
    }

    /// Load the configured preload set plus the default model, then mark
    /// the default as current. Intended for process startup; fails on the
    /// first load error.
    pub async fn preload(&self) -> RegistryResult<()> {
        let mut names = self.inner.preload_models.clone();
        if let Some(default) = &self.inner.default_model {
            if !names.contains(default) {
                names.push(default.clone());
            }
        }
        for name in &names {
            self.load(name).await?;
        }
        if let Some(default) = &self.inner.default_model {
            self.set_current(default)?;
        }
        Ok(())
    }

    /// Replace the registered model configurations wholesale.
    ///
    /// Affects future loads only: resident handles keep the configuration
    /// they were loaded with until reloaded.
    pub fn replace_configs(&self, models: HashMap<String, ModelConfig>) {
        let mut state = self.inner.state.lock();
        debug!(
            "replacing {} model configs with {}",
            state.configs.len(),
            models.len()
        );
        state.configs = models;
    }

    /// Unload every model. Teardown failures are logged and do not stop
    /// the remaining unloads.
    pub async fn shutdown(&self) {
        let names: Vec<String> = {
            let state = self.inner.state.lock();
            state.slots.keys().cloned().collect()
        };
        info!("registry shutdown: unloading {} models", names.len());
        for name in names {
            if let Err(err) = self.unload(&name).await {
                warn!("shutdown unload of '{}' failed: {}", name, err);
            }
        }
    }
}
