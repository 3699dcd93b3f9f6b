//! Model registry: residency tracking, single-flight loading, and LRU
//! eviction against a memory budget.
//!
//! # Design
//!
//! - **One slot per name.** Residency is a `HashMap<String, ResidencySlot>`
//!   behind a single `parking_lot::Mutex`. The lock is held only to inspect
//!   or commit state, never across a loader call.
//! - **Single-flight loads.** The first caller for a name installs a
//!   `Loading` slot and spawns a driver task; duplicates join via a shared
//!   watch channel. One loader invocation serves everyone, and the outcome
//!   (handle or error) fans out to all joined callers.
//! - **Detached drivers.** The loader runs in a spawned task, so a caller
//!   that disconnects never cancels a load other callers are joined to.
//! - **Eviction on load.** After a successful load commits, least-recently
//!   used residents are torn down until the budget fits, excluding the
//!   just-loaded and current models. With nothing evictable the overshoot
//!   is a logged warning; the load still succeeds.
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use inference_registry::{ModelRegistry, RegistryConfig, StubLoader};
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RegistryConfig::from_file("registry.toml")?;
//! let registry = ModelRegistry::new(config, Arc::new(StubLoader::new()));
//! registry.preload().await?;
//! let handle = registry.acquire("mistral-7b-instruct").await?;
//! println!("{} resident at {}", handle.name(), handle.loaded_at());
//! # Ok(())
//! # }
//! ```

mod core;
mod load;
mod operations;
mod queries;

pub use self::core::ModelRegistry;

#[cfg(test)]
mod tests_concurrency;
#[cfg(test)]
mod tests_eviction;
