//! Integration tests for the opentolk-kernel crate: routing a realistic
//! plugin set end to end with a stub language model.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;

use opentolk_agent::{ChatModel, ChatRequest, LlmResponse, TextStream};
use opentolk_kernel::{IntentClassifier, Router};
use opentolk_plugins::{PluginRegistry, TriggerKind, parse_manifest};

/// Answers every classification with a fixed id and counts calls.
struct StubModel {
    answer: &'static str,
    calls: AtomicUsize,
}

#[async_trait]
impl ChatModel for StubModel {
    async fn chat(&self, _request: &ChatRequest) -> opentolk_agent::Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(LlmResponse::Text(self.answer.to_string()))
    }

    async fn stream(&self, _request: &ChatRequest) -> opentolk_agent::Result<TextStream> {
        Ok(TextStream::from_text(self.answer))
    }
}

fn registry() -> PluginRegistry {
    let registry = PluginRegistry::new();
    let manifests = [
        json!({
            "id": "com.opentolk.translate",
            "name": "Translate",
            "trigger": {"type": "keyword", "keywords": ["translate", "translate to spanish"]},
            "execution": {"type": "script", "command": "translate.sh"}
        }),
        json!({
            "id": "com.opentolk.timer",
            "name": "Timer",
            "trigger": {"type": "regex", "pattern": r"^(set )?timer (for )?\d+ ?(s|m|min|minutes)\b", "strip": false},
            "execution": {"type": "shortcut", "name": "Start Timer"}
        }),
        json!({
            "id": "com.opentolk.flights",
            "name": "Flights",
            "trigger": {"type": "intent", "intents": ["search for flights"], "examples": ["cheapest way to Paris"]},
            "execution": {"type": "http", "url": "https://example.com/flights"}
        }),
        json!({
            "id": "com.opentolk.assistant",
            "name": "Assistant",
            "trigger": {"type": "catch_all"},
            "execution": {"type": "ai", "system_prompt": "You are helpful."}
        }),
    ];
    for value in manifests {
        registry.register(parse_manifest(&value.to_string()).unwrap()).unwrap();
    }
    registry
}

fn router(registry: &PluginRegistry, answer: &'static str) -> (Router, Arc<StubModel>) {
    let model = Arc::new(StubModel {
        answer,
        calls: AtomicUsize::new(0),
    });
    let classifier = IntentClassifier::new(model.clone(), "");
    (Router::from_registry(registry, Some(classifier)).unwrap(), model)
}

// ═══════════════════════════════════════════════════════════════════════
//  Phase ordering
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn keyword_match_skips_the_model() {
    let (router, model) = router(&registry(), "com.opentolk.flights");
    let found = router.route("Translate to Spanish good night").await.unwrap();

    assert_eq!(found.plugin_id(), "com.opentolk.translate");
    assert_eq!(found.trigger_text, "translate to spanish");
    assert_eq!(found.input, "good night");
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn regex_match_keeps_input() {
    let (router, _) = router(&registry(), "none");
    let found = router.route("timer 10 min").await.unwrap();
    assert_eq!(found.trigger, TriggerKind::Regex);
    assert_eq!(found.input, "timer 10 min");
}

#[tokio::test]
async fn intent_phase_routes_unmatched_text() {
    let (router, model) = router(&registry(), "com.opentolk.flights");
    let found = router.route("cheapest way to Lisbon next week").await.unwrap();

    assert_eq!(found.plugin_id(), "com.opentolk.flights");
    assert_eq!(found.trigger, TriggerKind::Intent);
    assert!(found.trigger_text.is_empty());
    assert_eq!(found.input, "cheapest way to Lisbon next week");
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn classifier_none_falls_through_to_catch_all() {
    let (router, _) = router(&registry(), "none");
    let found = router.route("what's a good name for a cat").await.unwrap();
    assert_eq!(found.plugin_id(), "com.opentolk.assistant");
    assert_eq!(found.trigger, TriggerKind::CatchAll);
}

#[tokio::test]
async fn classifier_cannot_pick_non_intent_plugins() {
    let (router, _) = router(&registry(), "com.opentolk.translate");
    let found = router.route("hola amigo").await.unwrap();
    assert_eq!(found.plugin_id(), "com.opentolk.assistant");
}

#[tokio::test]
async fn disabled_catch_all_means_no_route() {
    let registry = registry();
    registry.disable("com.opentolk.assistant");
    let (router, _) = router(&registry, "none");
    assert!(router.route("unmatched").await.is_none());
    assert!(router.catch_all().is_none());
}
