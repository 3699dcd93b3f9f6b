//! Load path: single-flight loading, load timeout, and LRU eviction.
//!
//! The first caller for a name installs a `Loading` slot and spawns a driver
//! task; every later caller clones the slot's watch receiver and awaits the
//! shared outcome. Running the loader in a spawned task means a caller that
//! gives up (future dropped) never cancels a load other callers are joined
//! to. Eviction runs inside the driver before waiters are released, so the
//! registry is never observed over budget after a successful load.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::error::{LoadFailureCause, RegistryError, RegistryResult};
use crate::handle::ModelHandle;

use super::core::{LoadOutcome, ModelRegistry, RegistryInner, RegistryState, ResidencySlot};

/// What the lock inspection decided; acted on after the lock is released.
enum LoadStep {
    Ready(Arc<ModelHandle>),
    Join(watch::Receiver<Option<LoadOutcome>>),
    Teardown(Arc<ModelHandle>),
}

impl ModelRegistry {
    /// Load a model by name using its registered configuration.
    ///
    /// Idempotent: if the model is already loaded, returns the existing
    /// handle without touching the loader. If a load for the same name is
    /// in flight, joins it and returns its outcome.
    pub async fn load(&self, name: &str) -> RegistryResult<Arc<ModelHandle>> {
        self.load_with(name, None, false).await
    }

    /// Load with an explicit configuration and/or forced reload.
    ///
    /// `config` overrides the registered configuration for this load only;
    /// without it the name must be registered or the load fails with
    /// [`RegistryError::ConfigNotFound`]. With `force`, an existing handle
    /// is torn down first and the model is loaded fresh; a teardown failure
    /// on that path is logged and the reload proceeds.
    pub async fn load_with(
        &self,
        name: &str,
        config: Option<ModelConfig>,
        force: bool,
    ) -> RegistryResult<Arc<ModelHandle>> {
        let mut force = force;
        loop {
            let step = {
                let mut state = self.inner.state.lock();
                match state.slots.get(name) {
                    Some(ResidencySlot::Loaded(handle)) if !force => {
                        LoadStep::Ready(Arc::clone(handle))
                    }
                    Some(ResidencySlot::Loaded(_)) => {
                        let Some(ResidencySlot::Loaded(handle)) = state.slots.remove(name) else {
                            unreachable!("slot matched Loaded under the same lock");
                        };
                        if state.current.as_deref() == Some(name) {
                            state.current = None;
                        }
                        LoadStep::Teardown(handle)
                    }
                    Some(ResidencySlot::Loading { rx, .. }) => LoadStep::Join(rx.clone()),
                    None => {
                        let config = match config
                            .clone()
                            .or_else(|| state.configs.get(name).cloned())
                        {
                            Some(config) => config,
                            None => {
                                return Err(RegistryError::ConfigNotFound {
                                    model: name.to_string(),
                                })
                            }
                        };
                        // This caller starts the load itself, so the handle
                        // it joins is already fresh; there is nothing left
                        // for `force` to replace.
                        force = false;
                        let (tx, rx) = watch::channel(None);
                        state.slots.insert(
                            name.to_string(),
                            ResidencySlot::Loading {
                                config: config.clone(),
                                rx: rx.clone(),
                            },
                        );
                        self.spawn_load_task(name.to_string(), config, tx);
                        LoadStep::Join(rx)
                    }
                }
            };

            match step {
                LoadStep::Ready(handle) => return Ok(handle),
                LoadStep::Join(rx) => {
                    let outcome = await_outcome(name, rx).await;
                    if force {
                        // A load was already in flight; let it settle, then
                        // loop around to tear the fresh handle down and
                        // reload as requested.
                        outcome?;
                        continue;
                    }
                    return outcome;
                }
                LoadStep::Teardown(handle) => {
                    info!("force reload of '{}': tearing down resident handle", name);
                    if let Err(err) = teardown(&self.inner, &handle).await {
                        warn!("teardown during force reload of '{}' failed: {}", name, err);
                    }
                    force = false;
                }
            }
        }
    }

    /// Spawn the driver task that owns one load from start to settled.
    fn spawn_load_task(
        &self,
        name: String,
        config: ModelConfig,
        tx: watch::Sender<Option<LoadOutcome>>,
    ) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut cleanup = LoadingCleanup {
                inner: Arc::clone(&inner),
                name: name.clone(),
                armed: true,
            };

            let started = Instant::now();
            debug!("loading model '{}' from '{}'", name, config.path);
            let loaded =
                tokio::time::timeout(inner.load_timeout, inner.loader.load_model(&name, &config))
                    .await;

            let outcome: LoadOutcome = match loaded {
                Err(_) => Err(RegistryError::LoadFailed {
                    model: name.clone(),
                    cause: LoadFailureCause::Timeout {
                        timeout_ms: u64::try_from(inner.load_timeout.as_millis())
                            .unwrap_or(u64::MAX),
                    },
                }),
                Ok(Err(err)) => Err(RegistryError::LoadFailed {
                    model: name.clone(),
                    cause: LoadFailureCause::Loader {
                        reason: err.to_string(),
                    },
                }),
                Ok(Ok(model)) => {
                    let memory = model
                        .memory_estimate_bytes
                        .unwrap_or(config.memory_estimate_bytes);
                    Ok(Arc::new(ModelHandle::new(
                        name.clone(),
                        config,
                        model.payload,
                        memory,
                    )))
                }
            };

            let victims = {
                let mut state = inner.state.lock();
                match &outcome {
                    Ok(handle) => {
                        state
                            .slots
                            .insert(name.clone(), ResidencySlot::Loaded(Arc::clone(handle)));
                        select_victims(&mut state, &name, inner.memory_budget_bytes)
                    }
                    Err(_) => {
                        state.slots.remove(&name);
                        Vec::new()
                    }
                }
            };
            cleanup.armed = false;

            match &outcome {
                Ok(handle) => info!(
                    "model '{}' loaded in {:?} ({} bytes resident)",
                    name,
                    started.elapsed(),
                    handle.memory_estimate_bytes()
                ),
                Err(err) => warn!("model '{}' failed to load: {}", name, err),
            }

            for victim in victims {
                info!(
                    "evicting model '{}' ({} bytes, last used {})",
                    victim.name(),
                    victim.memory_estimate_bytes(),
                    victim.last_used_at()
                );
                if let Err(err) = teardown(&inner, &victim).await {
                    warn!("teardown of evicted model '{}' failed: {}", victim.name(), err);
                }
            }

            let _ = tx.send(Some(outcome));
        });
    }
}

/// Await a shared load outcome from a joined watch receiver.
///
/// A closed channel means the driver task died without publishing, which
/// surfaces as an aborted load rather than a hang.
pub(crate) async fn await_outcome(
    name: &str,
    mut rx: watch::Receiver<Option<LoadOutcome>>,
) -> RegistryResult<Arc<ModelHandle>> {
    loop {
        {
            let settled = rx.borrow_and_update();
            if let Some(outcome) = settled.as_ref() {
                return outcome.clone();
            }
        }
        if rx.changed().await.is_err() {
            return Err(RegistryError::LoadFailed {
                model: name.to_string(),
                cause: LoadFailureCause::Aborted,
            });
        }
    }
}

/// Tear a handle down via the loader. The handle must already be out of
/// the slot map; after this returns the native resources are released.
pub(crate) async fn teardown(
    inner: &RegistryInner,
    handle: &Arc<ModelHandle>,
) -> RegistryResult<()> {
    debug!("unloading model '{}'", handle.name());
    inner
        .loader
        .unload_model(handle.name(), handle.payload())
        .await
        .map_err(|err| RegistryError::TeardownFailed {
            model: handle.name().to_string(),
            reason: err.to_string(),
        })
}

/// Pick eviction victims until resident bytes fit the budget.
///
/// Victims are removed from the slot map here, under the lock; the caller
/// tears them down afterwards. The just-loaded model and the current model
/// are never victims. When the remaining residents still exceed the budget
/// and nothing is evictable, the overshoot is logged and accepted.
fn select_victims(
    state: &mut RegistryState,
    just_loaded: &str,
    budget_bytes: u64,
) -> Vec<Arc<ModelHandle>> {
    let mut victims = Vec::new();
    loop {
        let total: u64 = state
            .slots
            .values()
            .filter_map(|slot| match slot {
                ResidencySlot::Loaded(handle) => Some(handle.memory_estimate_bytes()),
                ResidencySlot::Loading { .. } => None,
            })
            .sum();
        if total <= budget_bytes {
            break;
        }

        let current = state.current.clone();
        let candidate = state
            .slots
            .iter()
            .filter_map(|(name, slot)| match slot {
                ResidencySlot::Loaded(handle)
                    if name != just_loaded && current.as_deref() != Some(name.as_str()) =>
                {
                    Some((name.clone(), handle.last_used_at_ms()))
                }
                _ => None,
            })
            .min_by_key(|(_, last_used)| *last_used);

        match candidate {
            Some((name, _)) => {
                if let Some(ResidencySlot::Loaded(handle)) = state.slots.remove(&name) {
                    victims.push(handle);
                }
            }
            None => {
                let over = RegistryError::MemoryBudgetExceeded {
                    total_bytes: total,
                    budget_bytes,
                };
                warn!("{}", over);
                break;
            }
        }
    }
    victims
}

/// Removes a dangling `Loading` slot if the driver task dies before it
/// settles the load, so waiters fail fast instead of finding a stuck slot.
struct LoadingCleanup {
    inner: Arc<RegistryInner>,
    name: String,
    armed: bool,
}

impl Drop for LoadingCleanup {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.inner.state.lock();
        if matches!(state.slots.get(&self.name), Some(ResidencySlot::Loading { .. })) {
            state.slots.remove(&self.name);
        }
        warn!("load task for '{}' aborted before completion", self.name);
    }
}
