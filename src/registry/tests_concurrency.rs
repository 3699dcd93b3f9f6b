//! Concurrency tests: single-flight loading, shared outcomes, timeouts,
//! and unload/load interleavings.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{ModelConfig, RegistryConfig};
use crate::error::{LoadFailureCause, RegistryError};
use crate::loader::{ModelLoader, StubEvent, StubLoader};

use super::ModelRegistry;

fn registry_with(loader: StubLoader, models: &[&str]) -> (ModelRegistry, Arc<StubLoader>) {
    let mut config = RegistryConfig::default();
    for name in models {
        config.models.insert(
            (*name).to_string(),
            ModelConfig::new(format!("org/{name}")).with_memory_estimate(1024),
        );
    }
    let loader = Arc::new(loader);
    let registry = ModelRegistry::new(config, Arc::clone(&loader) as Arc<dyn ModelLoader>);
    (registry, loader)
}

#[tokio::test(start_paused = true)]
async fn concurrent_loads_share_a_single_loader_call() {
    let (registry, loader) = registry_with(
        StubLoader::new().with_load_delay(Duration::from_millis(50)),
        &["mistral"],
    );

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move { registry.load("mistral").await }));
    }

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap().unwrap());
    }

    assert_eq!(loader.load_calls(), 1);
    for handle in &handles[1..] {
        assert!(Arc::ptr_eq(&handles[0], handle));
    }
}

#[tokio::test(start_paused = true)]
async fn failed_load_fans_out_to_every_waiter() {
    let (registry, loader) = registry_with(
        StubLoader::new()
            .with_load_delay(Duration::from_millis(50))
            .with_failing_load("broken"),
        &["broken"],
    );

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move { registry.load("broken").await }));
    }

    for task in tasks {
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            RegistryError::LoadFailed {
                cause: LoadFailureCause::Loader { .. },
                ..
            }
        ));
    }
    assert_eq!(loader.load_calls(), 1);
    assert!(!registry.is_loaded("broken"));
}

#[tokio::test(start_paused = true)]
async fn loads_of_different_models_run_independently() {
    let (registry, loader) = registry_with(
        StubLoader::new()
            .with_model_delay("slow", Duration::from_millis(200))
            .with_model_delay("fast", Duration::from_millis(10)),
        &["slow", "fast"],
    );

    let slow = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.load("slow").await })
    };
    let fast = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.load("fast").await })
    };

    fast.await.unwrap().unwrap();
    slow.await.unwrap().unwrap();
    assert_eq!(loader.load_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn caller_disconnect_does_not_cancel_a_joined_load() {
    let (registry, loader) = registry_with(
        StubLoader::new().with_load_delay(Duration::from_millis(100)),
        &["mistral"],
    );

    let doomed = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.load("mistral").await })
    };
    // Let the load start, then drop the only caller.
    tokio::time::sleep(Duration::from_millis(10)).await;
    doomed.abort();
    assert!(doomed.await.is_err());

    // The detached driver finishes the load anyway.
    let handle = registry.load("mistral").await.unwrap();
    assert_eq!(handle.name(), "mistral");
    assert_eq!(loader.load_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_load_fails_with_timeout_and_frees_the_slot() {
    let mut config = RegistryConfig::default();
    config.load_timeout_secs = 1;
    config.models.insert(
        "glacial".to_string(),
        ModelConfig::new("org/glacial").with_memory_estimate(1024),
    );
    let loader = Arc::new(StubLoader::new().with_model_delay("glacial", Duration::from_secs(5)));
    let registry = ModelRegistry::new(config, Arc::clone(&loader) as Arc<dyn ModelLoader>);

    let err = registry.load("glacial").await.unwrap_err();
    assert!(matches!(
        err,
        RegistryError::LoadFailed {
            cause: LoadFailureCause::Timeout { timeout_ms: 1_000 },
            ..
        }
    ));
    assert!(!registry.is_loaded("glacial"));

    // The slot is free; a retry reaches the loader again.
    registry.load("glacial").await.unwrap_err();
    assert_eq!(loader.load_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn unload_queues_behind_an_inflight_load() {
    let (registry, loader) = registry_with(
        StubLoader::new().with_load_delay(Duration::from_millis(100)),
        &["mistral"],
    );

    let load = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.load("mistral").await })
    };
    // Give the load task time to install its slot before unloading.
    tokio::time::sleep(Duration::from_millis(10)).await;

    let torn_down = registry.unload("mistral").await.unwrap();

    assert!(torn_down);
    assert!(load.await.unwrap().is_ok());
    assert!(!registry.is_loaded("mistral"));
    assert_eq!(
        loader.events(),
        vec![
            StubEvent::Load("mistral".into()),
            StubEvent::Unload("mistral".into()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn unload_after_a_failed_inflight_load_is_a_no_op() {
    let (registry, loader) = registry_with(
        StubLoader::new()
            .with_load_delay(Duration::from_millis(100))
            .with_failing_load("broken"),
        &["broken"],
    );

    let load = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.load("broken").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    // The failed load left nothing resident; the unload is a no-op success.
    assert!(registry.unload("broken").await.unwrap());
    assert!(load.await.unwrap().is_err());
    assert_eq!(loader.unload_calls(), 0);
}

// Unload racing load at varying points. Whatever the interleaving, the
// registry must end in a consistent state: either the unload won (model
// absent, one teardown) or it ran before the load existed (model resident).
#[tokio::test(start_paused = true)]
async fn unload_load_races_settle_consistently() {
    for yields in 0..6 {
        let (registry, loader) = registry_with(
            StubLoader::new().with_load_delay(Duration::from_millis(20)),
            &["mistral"],
        );

        let load = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.load("mistral").await })
        };
        for _ in 0..yields {
            tokio::task::yield_now().await;
        }

        assert!(registry.unload("mistral").await.unwrap(), "yields={yields}");
        let loaded = load.await.unwrap();

        assert!(loaded.is_ok(), "yields={yields}");
        assert_eq!(loader.load_calls(), 1, "yields={yields}");
        if loader.unload_calls() == 1 {
            // The unload saw the slot and queued behind the load.
            assert!(!registry.is_loaded("mistral"), "yields={yields}");
        } else {
            // The unload ran before the load installed its slot; the load
            // completes and the model stays resident.
            assert_eq!(loader.unload_calls(), 0, "yields={yields}");
            assert!(registry.is_loaded("mistral"), "yields={yields}");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn acquire_joins_an_inflight_load() {
    let (registry, loader) = registry_with(
        StubLoader::new().with_load_delay(Duration::from_millis(50)),
        &["mistral"],
    );

    let load = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.load("mistral").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let acquired = registry.acquire("mistral").await.unwrap();
    let loaded = load.await.unwrap().unwrap();

    assert!(Arc::ptr_eq(&acquired, &loaded));
    assert_eq!(loader.load_calls(), 1);
}
