//! In-memory model lifecycle registry with single-flight loading and LRU
//! eviction.
//!
//! This crate manages the lifecycle of large inference models inside one
//! process: loading them through a pluggable [`ModelLoader`], tracking
//! residency and a current default model, evicting least-recently-used
//! models when a memory budget is exceeded, and serving generation requests
//! through an [`InferenceGateway`].
//!
//! # Architecture
//!
//! ```text
//! InferenceGateway ── validate prompt, resolve model, merge params
//!        │
//!        ▼
//! ModelRegistry ──── residency slots, single-flight loads, LRU eviction
//!        │
//!        ▼
//! dyn ModelLoader ── backend seam: load / unload / generate
//! ```
//!
//! The registry is the sole owner of model handles. Concurrent loads of the
//! same model share one loader invocation; loads run in detached tasks so a
//! disconnecting caller never cancels work other callers are joined to.
//! Eviction runs at the end of every successful load, never evicting the
//! current or just-loaded model.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use inference_registry::{
//!     GenerationOverrides, InferenceGateway, ModelRegistry, RegistryConfig, StubLoader,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RegistryConfig::from_file("registry.toml")?.with_env_overrides();
//! let registry = ModelRegistry::new(config, Arc::new(StubLoader::new()));
//! registry.preload().await?;
//!
//! let gateway = InferenceGateway::new(registry.clone());
//! let result = gateway
//!     .generate(None, "Write a haiku about memory budgets", &GenerationOverrides::default())
//!     .await?;
//! println!("[{}] {}", result.model, result.text);
//!
//! registry.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! Production deployments implement [`ModelLoader`] for their inference
//! backend; [`StubLoader`] is a scripted double for tests and wiring checks.

pub mod config;
pub mod error;
pub mod gateway;
pub mod handle;
pub mod loader;
pub mod registry;
pub mod types;

pub use config::{DevicePreference, ModelConfig, ModelFormat, QuantizationMode, RegistryConfig};
pub use error::{LoadFailureCause, RegistryError, RegistryResult};
pub use gateway::InferenceGateway;
pub use handle::ModelHandle;
pub use loader::{LoadedModel, LoaderError, ModelLoader, ModelPayload, RawGeneration, StubLoader};
pub use registry::ModelRegistry;
pub use types::{
    GenerationOverrides, GenerationParams, GenerationResult, ModelSnapshot, ModelState,
};
