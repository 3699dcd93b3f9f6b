//! Read-only registry queries.

use crate::types::{ModelSnapshot, ModelState};

use super::core::{ModelRegistry, ResidencySlot};

impl ModelRegistry {
    /// Snapshot every model the registry currently tracks, sorted by name.
    pub fn list(&self) -> Vec<ModelSnapshot> {
        let state = self.inner.state.lock();
        let mut snapshots: Vec<ModelSnapshot> = state
            .slots
            .iter()
            .map(|(name, slot)| match slot {
                ResidencySlot::Loading { config, .. } => ModelSnapshot {
                    name: name.clone(),
                    state: ModelState::Loading,
                    config: config.clone(),
                    loaded_at: None,
                    last_used_at: None,
                    memory_estimate_bytes: None,
                },
                ResidencySlot::Loaded(handle) => ModelSnapshot {
                    name: name.clone(),
                    state: ModelState::Loaded,
                    config: handle.config().clone(),
                    loaded_at: Some(handle.loaded_at()),
                    last_used_at: Some(handle.last_used_at()),
                    memory_estimate_bytes: Some(handle.memory_estimate_bytes()),
                },
            })
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Whether a model is resident (loaded, not merely loading).
    pub fn is_loaded(&self, name: &str) -> bool {
        let state = self.inner.state.lock();
        matches!(state.slots.get(name), Some(ResidencySlot::Loaded(_)))
    }

    /// Total estimated bytes of all resident models.
    pub fn loaded_bytes(&self) -> u64 {
        let state = self.inner.state.lock();
        state
            .slots
            .values()
            .filter_map(|slot| match slot {
                ResidencySlot::Loaded(handle) => Some(handle.memory_estimate_bytes()),
                ResidencySlot::Loading { .. } => None,
            })
            .sum()
    }

    /// The configured memory budget in bytes.
    pub fn memory_budget_bytes(&self) -> u64 {
        self.inner.memory_budget_bytes
    }

    /// The configured maximum prompt length in characters.
    pub fn max_prompt_length(&self) -> usize {
        self.inner.max_prompt_length
    }
}
