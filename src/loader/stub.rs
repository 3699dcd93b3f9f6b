//! Deterministic in-memory loader for tests and examples.
//!
//! `StubLoader` performs no real inference: it sleeps for a configurable
//! time on load, fabricates an echo completion on generate, and records
//! every invocation so tests can assert on call counts and ordering.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::ModelConfig;
use crate::types::GenerationParams;

use super::{LoadedModel, LoaderError, ModelLoader, ModelPayload, RawGeneration};

/// Payload stored by [`StubLoader`]: just the model name.
#[derive(Debug, Clone)]
pub struct StubModel {
    /// Name the payload was loaded under.
    pub name: String,
}

/// One recorded loader invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubEvent {
    /// `load_model` was called for this name.
    Load(String),
    /// `unload_model` was called for this name.
    Unload(String),
    /// `generate` was called against this name's payload.
    Generate(String),
}

/// A scripted [`ModelLoader`] double.
///
/// Behavior knobs are set up front with the builder methods; counters and
/// the event log accumulate as the registry drives it.
#[derive(Default)]
pub struct StubLoader {
    load_delay: Duration,
    per_model_delay: HashMap<String, Duration>,
    failing_loads: HashSet<String>,
    failing_teardowns: HashSet<String>,
    failing_generations: HashSet<String>,
    load_calls: AtomicUsize,
    unload_calls: AtomicUsize,
    generate_calls: AtomicUsize,
    events: Mutex<Vec<StubEvent>>,
    last_params: Mutex<Option<GenerationParams>>,
}

impl StubLoader {
    /// A stub that loads instantly and never fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every `load_model` call.
    #[must_use]
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Per-model load delay, overriding the global one.
    #[must_use]
    pub fn with_model_delay(mut self, name: impl Into<String>, delay: Duration) -> Self {
        self.per_model_delay.insert(name.into(), delay);
        self
    }

    /// Make `load_model` fail for this name.
    #[must_use]
    pub fn with_failing_load(mut self, name: impl Into<String>) -> Self {
        self.failing_loads.insert(name.into());
        self
    }

    /// Make `unload_model` fail for this name.
    #[must_use]
    pub fn with_failing_teardown(mut self, name: impl Into<String>) -> Self {
        self.failing_teardowns.insert(name.into());
        self
    }

    /// Make `generate` fail for this name.
    #[must_use]
    pub fn with_failing_generation(mut self, name: impl Into<String>) -> Self {
        self.failing_generations.insert(name.into());
        self
    }

    /// Number of `load_model` invocations so far.
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    /// Number of `unload_model` invocations so far.
    pub fn unload_calls(&self) -> usize {
        self.unload_calls.load(Ordering::SeqCst)
    }

    /// Number of `generate` invocations so far.
    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of the invocation log, in call order.
    pub fn events(&self) -> Vec<StubEvent> {
        self.events.lock().clone()
    }

    /// The parameters passed to the most recent `generate` call.
    pub fn last_params(&self) -> Option<GenerationParams> {
        self.last_params.lock().clone()
    }

    fn record(&self, event: StubEvent) {
        self.events.lock().push(event);
    }
}

#[async_trait]
impl ModelLoader for StubLoader {
    async fn load_model(
        &self,
        name: &str,
        _config: &ModelConfig,
    ) -> Result<LoadedModel, LoaderError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        self.record(StubEvent::Load(name.to_string()));

        let delay = self
            .per_model_delay
            .get(name)
            .copied()
            .unwrap_or(self.load_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failing_loads.contains(name) {
            return Err(LoaderError::new(format!(
                "scripted load failure for '{name}'"
            )));
        }

        Ok(LoadedModel {
            payload: ModelPayload::new(StubModel {
                name: name.to_string(),
            }),
            memory_estimate_bytes: None,
        })
    }

    async fn unload_model(&self, name: &str, _payload: &ModelPayload) -> Result<(), LoaderError> {
        self.unload_calls.fetch_add(1, Ordering::SeqCst);
        self.record(StubEvent::Unload(name.to_string()));

        if self.failing_teardowns.contains(name) {
            return Err(LoaderError::new(format!(
                "scripted teardown failure for '{name}'"
            )));
        }
        Ok(())
    }

    async fn generate(
        &self,
        payload: &ModelPayload,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<RawGeneration, LoaderError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock() = Some(params.clone());

        let model = payload
            .downcast_ref::<StubModel>()
            .ok_or_else(|| LoaderError::new("payload was not produced by StubLoader"))?;
        self.record(StubEvent::Generate(model.name.clone()));

        if self.failing_generations.contains(&model.name) {
            return Err(LoaderError::new(format!(
                "scripted generation failure for '{}'",
                model.name
            )));
        }

        let text = format!("{}: {}", model.name, prompt);
        let tokens_used = prompt.split_whitespace().count().min(params.max_tokens as usize) as u32;
        Ok(RawGeneration { text, tokens_used })
    }
}
