//! Gateway tests: validation ordering, model resolution, parameter merging.

use std::sync::Arc;

use crate::config::{ModelConfig, RegistryConfig};
use crate::error::RegistryError;
use crate::loader::{ModelLoader, StubLoader};
use crate::registry::ModelRegistry;
use crate::types::GenerationOverrides;

use super::InferenceGateway;

fn gateway_with(loader: StubLoader) -> (InferenceGateway, Arc<StubLoader>) {
    let mut config = RegistryConfig::default();
    config.max_prompt_length = 64;
    let mut defaults = ModelConfig::new("org/mistral").with_memory_estimate(1024);
    defaults.defaults.max_tokens = 100;
    defaults.defaults.temperature = 0.5;
    config.models.insert("mistral".to_string(), defaults);
    config
        .models
        .insert("llama".to_string(), ModelConfig::new("org/llama"));

    let loader = Arc::new(loader);
    let registry = ModelRegistry::new(config, Arc::clone(&loader) as Arc<dyn ModelLoader>);
    (InferenceGateway::new(registry), loader)
}

fn gateway() -> (InferenceGateway, Arc<StubLoader>) {
    gateway_with(StubLoader::new())
}

#[tokio::test]
async fn generate_with_explicit_model() {
    let (gateway, loader) = gateway();

    let result = gateway
        .generate(Some("mistral"), "hello there", &GenerationOverrides::default())
        .await
        .unwrap();

    assert_eq!(result.model, "mistral");
    assert_eq!(result.text, "mistral: hello there");
    assert_eq!(result.tokens_used, 2);
    assert_eq!(loader.generate_calls(), 1);
}

#[tokio::test]
async fn generate_falls_back_to_current_model() {
    let (gateway, _loader) = gateway();

    gateway.registry().load("llama").await.unwrap();
    gateway.registry().set_current("llama").unwrap();

    let result = gateway
        .generate(None, "hi", &GenerationOverrides::default())
        .await
        .unwrap();
    assert_eq!(result.model, "llama");
}

#[tokio::test]
async fn generate_without_model_or_current_fails() {
    let (gateway, loader) = gateway();

    let err = gateway
        .generate(None, "hi", &GenerationOverrides::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RegistryError::NoModelSpecified));
    assert_eq!(loader.load_calls(), 0);
}

#[tokio::test]
async fn empty_prompt_is_rejected_before_any_model_work() {
    let (gateway, loader) = gateway();

    let err = gateway
        .generate(Some("mistral"), "", &GenerationOverrides::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RegistryError::EmptyPrompt));
    assert_eq!(loader.load_calls(), 0);
    assert_eq!(loader.generate_calls(), 0);
}

#[tokio::test]
async fn oversized_prompt_is_rejected_before_any_model_work() {
    let (gateway, loader) = gateway();

    let prompt = "x".repeat(65);
    let err = gateway
        .generate(Some("mistral"), &prompt, &GenerationOverrides::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RegistryError::PromptTooLong { actual: 65, max: 64 }
    ));
    assert_eq!(loader.load_calls(), 0);
}

#[tokio::test]
async fn prompt_length_counts_characters_not_bytes() {
    let (gateway, _loader) = gateway();

    // 64 multi-byte characters: over the limit in bytes, exactly at it in
    // characters.
    let prompt = "é".repeat(64);
    gateway
        .generate(Some("mistral"), &prompt, &GenerationOverrides::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn generate_auto_loads_an_absent_model() {
    let (gateway, loader) = gateway();

    let result = gateway
        .generate(Some("mistral"), "hi", &GenerationOverrides::default())
        .await
        .unwrap();

    assert_eq!(result.model, "mistral");
    assert_eq!(loader.load_calls(), 1);
    assert!(gateway.registry().is_loaded("mistral"));
}

#[tokio::test]
async fn overrides_merge_over_model_defaults() {
    let (gateway, loader) = gateway();

    let overrides = GenerationOverrides {
        temperature: Some(0.1),
        stop: Some(vec!["###".to_string()]),
        ..GenerationOverrides::default()
    };
    gateway
        .generate(Some("mistral"), "hi", &overrides)
        .await
        .unwrap();

    let params = loader.last_params().unwrap();
    // Overridden fields win; the rest come from the model's config.
    assert_eq!(params.temperature, 0.1);
    assert_eq!(params.stop, vec!["###".to_string()]);
    assert_eq!(params.max_tokens, 100);
    assert_eq!(params.top_p, 0.9);
}

#[tokio::test]
async fn loader_generation_failure_is_wrapped() {
    let (gateway, _loader) = gateway_with(StubLoader::new().with_failing_generation("mistral"));

    let err = gateway
        .generate(Some("mistral"), "hi", &GenerationOverrides::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RegistryError::GenerationFailed { model, .. } if model == "mistral"
    ));
}

#[tokio::test]
async fn unknown_model_surfaces_config_not_found() {
    let (gateway, _loader) = gateway();

    let err = gateway
        .generate(Some("ghost"), "hi", &GenerationOverrides::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::ConfigNotFound { model } if model == "ghost"));
}
