//! Eviction tests: LRU victim selection against the memory budget.

use std::sync::Arc;

use crate::config::{ModelConfig, RegistryConfig};
use crate::loader::{ModelLoader, StubEvent, StubLoader};

use super::ModelRegistry;

fn registry(budget: u64, models: &[(&str, u64)]) -> (ModelRegistry, Arc<StubLoader>) {
    let mut config = RegistryConfig::default();
    config.memory_budget_bytes = budget;
    for (name, bytes) in models {
        config.models.insert(
            (*name).to_string(),
            ModelConfig::new(format!("org/{name}")).with_memory_estimate(*bytes),
        );
    }
    let loader = Arc::new(StubLoader::new());
    let registry = ModelRegistry::new(config, Arc::clone(&loader) as Arc<dyn ModelLoader>);
    (registry, loader)
}

#[tokio::test]
async fn least_recently_used_model_is_evicted_first() {
    let (registry, loader) = registry(100, &[("m1", 40), ("m2", 40), ("m3", 40)]);

    let m1 = registry.load("m1").await.unwrap();
    let m2 = registry.load("m2").await.unwrap();
    m1.set_last_used_ms(2_000);
    m2.set_last_used_ms(1_000);

    registry.load("m3").await.unwrap();

    assert!(!registry.is_loaded("m2"));
    assert!(registry.is_loaded("m1"));
    assert!(registry.is_loaded("m3"));
    assert_eq!(loader.unload_calls(), 1);
    assert!(loader.events().contains(&StubEvent::Unload("m2".into())));
}

#[tokio::test]
async fn eviction_repeats_until_the_budget_fits() {
    let (registry, loader) = registry(100, &[("m1", 40), ("m2", 40), ("big", 90)]);

    let m1 = registry.load("m1").await.unwrap();
    let m2 = registry.load("m2").await.unwrap();
    m1.set_last_used_ms(1_000);
    m2.set_last_used_ms(2_000);

    registry.load("big").await.unwrap();

    // Both residents had to go to make room for the 90-byte model.
    assert!(!registry.is_loaded("m1"));
    assert!(!registry.is_loaded("m2"));
    assert!(registry.is_loaded("big"));
    assert_eq!(loader.unload_calls(), 2);
    assert_eq!(
        loader.events()[2..],
        [
            StubEvent::Load("big".into()),
            StubEvent::Unload("m1".into()),
            StubEvent::Unload("m2".into()),
        ]
    );
}

#[tokio::test]
async fn current_model_is_never_evicted() {
    let (registry, _loader) = registry(100, &[("current", 40), ("other", 40), ("m3", 40)]);

    let current = registry.load("current").await.unwrap();
    let other = registry.load("other").await.unwrap();
    registry.set_current("current").unwrap();
    // Make the current model the LRU candidate on paper.
    current.set_last_used_ms(1_000);
    other.set_last_used_ms(2_000);

    registry.load("m3").await.unwrap();

    assert!(registry.is_loaded("current"));
    assert!(!registry.is_loaded("other"));
}

#[tokio::test]
async fn just_loaded_model_is_never_its_own_victim() {
    // A single model larger than the whole budget: nothing is evictable,
    // the overshoot is logged, and the load still succeeds.
    let (registry, loader) = registry(10, &[("huge", 40)]);

    let handle = registry.load("huge").await.unwrap();

    assert_eq!(handle.name(), "huge");
    assert!(registry.is_loaded("huge"));
    assert_eq!(loader.unload_calls(), 0);
    assert!(registry.loaded_bytes() > registry.memory_budget_bytes());
}

#[tokio::test]
async fn footprint_is_within_budget_when_load_returns() {
    let (registry, _loader) = registry(100, &[("m1", 60), ("m2", 60)]);

    let m1 = registry.load("m1").await.unwrap();
    m1.set_last_used_ms(1_000);
    registry.load("m2").await.unwrap();

    // Eviction completed before the load call returned.
    assert!(registry.loaded_bytes() <= registry.memory_budget_bytes());
    assert_eq!(registry.loaded_bytes(), 60);
}

#[tokio::test]
async fn acquire_refreshes_lru_position() {
    let (registry, _loader) = registry(100, &[("m1", 40), ("m2", 40), ("m3", 40)]);

    let m1 = registry.load("m1").await.unwrap();
    let m2 = registry.load("m2").await.unwrap();
    m1.set_last_used_ms(1_000);
    m2.set_last_used_ms(2_000);

    // Without this acquire, m1 would be the victim.
    registry.acquire("m1").await.unwrap();
    registry.load("m3").await.unwrap();

    assert!(registry.is_loaded("m1"));
    assert!(!registry.is_loaded("m2"));
}
