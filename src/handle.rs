//! Handle to one loaded model instance.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeZone, Utc};

use crate::config::ModelConfig;
use crate::loader::ModelPayload;

/// One loaded model, owned by the registry.
///
/// The registry is the sole owner; the gateway borrows a handle (via `Arc`)
/// only for the duration of a single inference call and never retains it.
///
/// # Invariants
///
/// - A handle exists only after a successful loader call committed through
///   the registry; at most one handle per model name at any time
/// - Its lifetime is monotonic: created loaded, destroyed by unload,
///   eviction, or shutdown, never resurrected
/// - `last_used_at` moves forward on every acquire
#[derive(Debug)]
pub struct ModelHandle {
    name: String,
    config: ModelConfig,
    payload: ModelPayload,
    memory_estimate_bytes: u64,
    loaded_at: DateTime<Utc>,
    /// Millis since epoch; atomic so concurrent acquires don't need a lock.
    last_used_at_ms: AtomicI64,
}

impl ModelHandle {
    /// Create a handle for a model that just finished loading.
    pub(crate) fn new(
        name: String,
        config: ModelConfig,
        payload: ModelPayload,
        memory_estimate_bytes: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            name,
            config,
            payload,
            memory_estimate_bytes,
            loaded_at: now,
            last_used_at_ms: AtomicI64::new(now.timestamp_millis()),
        }
    }

    /// The model name this handle is registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configuration the model was loaded with.
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// The loader's opaque state for this model.
    #[must_use]
    pub fn payload(&self) -> &ModelPayload {
        &self.payload
    }

    /// Approximate resident footprint in bytes.
    #[must_use]
    pub fn memory_estimate_bytes(&self) -> u64 {
        self.memory_estimate_bytes
    }

    /// When the load committed.
    #[must_use]
    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Last acquire time. Drives LRU eviction.
    #[must_use]
    pub fn last_used_at(&self) -> DateTime<Utc> {
        let ms = self.last_used_at_ms.load(Ordering::Acquire);
        Utc.timestamp_millis_opt(ms)
            .single()
            .unwrap_or(self.loaded_at)
    }

    /// Raw millis value, used for cheap LRU comparison.
    pub(crate) fn last_used_at_ms(&self) -> i64 {
        self.last_used_at_ms.load(Ordering::Acquire)
    }

    /// Record a use. Called by the registry on every acquire.
    pub(crate) fn touch(&self) {
        self.last_used_at_ms
            .store(Utc::now().timestamp_millis(), Ordering::Release);
    }

    /// Explicitly backdate the last-use time. Test-only hook for exercising
    /// LRU ordering without sleeping.
    #[cfg(test)]
    pub(crate) fn set_last_used_ms(&self, ms: i64) {
        self.last_used_at_ms.store(ms, Ordering::Release);
    }
}
