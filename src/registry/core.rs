//! Core registry type and shared internal state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::config::{ModelConfig, RegistryConfig};
use crate::error::RegistryError;
use crate::handle::ModelHandle;
use crate::loader::ModelLoader;

/// Result published to every caller joined to one in-flight load.
pub(crate) type LoadOutcome = Result<Arc<ModelHandle>, RegistryError>;

/// Residency of one model name.
///
/// The state tag and the handle travel together, so "loading with a handle"
/// or "loaded without one" are unrepresentable. `Unloading` has no slot: an
/// unload removes the entry under the lock before tearing the handle down.
pub(crate) enum ResidencySlot {
    /// A load is in flight. Duplicate callers clone `rx` and await the
    /// shared outcome instead of starting a second load.
    Loading {
        config: ModelConfig,
        rx: watch::Receiver<Option<LoadOutcome>>,
    },
    /// Resident and ready for inference.
    Loaded(Arc<ModelHandle>),
}

/// Mutable registry state. Guarded by one mutex; the lock is held only to
/// inspect or commit slots, never across a loader call.
pub(crate) struct RegistryState {
    pub(crate) slots: HashMap<String, ResidencySlot>,
    pub(crate) configs: HashMap<String, ModelConfig>,
    pub(crate) current: Option<String>,
}

pub(crate) struct RegistryInner {
    pub(crate) loader: Arc<dyn ModelLoader>,
    pub(crate) state: Mutex<RegistryState>,
    pub(crate) memory_budget_bytes: u64,
    pub(crate) auto_load: bool,
    pub(crate) load_timeout: Duration,
    pub(crate) default_model: Option<String>,
    pub(crate) preload_models: Vec<String>,
    pub(crate) max_prompt_length: usize,
}

/// The sole owner of model residency state.
///
/// Owns the name -> handle mapping, enforces single-flight loads, tracks
/// the current model, and applies LRU eviction against the memory budget.
/// Cheap to clone; all clones share the same state.
///
/// # Invariants
///
/// - At most one handle per name; concurrent loads for the same name share
///   one loader invocation
/// - The current model always names a loaded handle, or is `None`
/// - After a load settles, total resident bytes are at or under the budget
///   unless nothing was evictable (reported as a warning, not an error)
///
/// Construct one registry at process start and pass it by value (clone) to
/// the gateway and any other consumer; there is no global instance.
#[derive(Clone)]
pub struct ModelRegistry {
    pub(crate) inner: Arc<RegistryInner>,
}

impl ModelRegistry {
    /// Build a registry from validated configuration and a loader.
    pub fn new(config: RegistryConfig, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                loader,
                memory_budget_bytes: config.memory_budget_bytes,
                auto_load: config.auto_load,
                load_timeout: config.load_timeout(),
                default_model: config.default_model,
                preload_models: config.preload_models,
                max_prompt_length: config.max_prompt_length,
                state: Mutex::new(RegistryState {
                    slots: HashMap::new(),
                    configs: config.models,
                    current: None,
                }),
            }),
        }
    }

    /// The loader this registry drives.
    pub(crate) fn loader(&self) -> Arc<dyn ModelLoader> {
        Arc::clone(&self.inner.loader)
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ModelRegistry")
            .field("slots", &state.slots.len())
            .field("configs", &state.configs.len())
            .field("current", &state.current)
            .field("memory_budget_bytes", &self.inner.memory_budget_bytes)
            .finish()
    }
}
