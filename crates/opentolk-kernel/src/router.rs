//! Three-phase plugin router.
//!
//! | Phase | Technique | Priority |
//! |-------|-----------|----------|
//! | 1 | Keyword / regex triggers via [`TriggerMatcher`] | 10 / 5 |
//! | 2 | Language-model intent classification | 3 |
//! | 3 | The enabled catch-all plugin | 0 |
//!
//! Phases run in order and the first one that produces a match wins.
//! Phase 1 is synchronous and always completes before any model call.

use std::sync::Arc;

use tracing::{debug, info};

use opentolk_plugins::{Manifest, PluginRegistry, Trigger};

use crate::classifier::IntentClassifier;
use crate::error::{KernelError, Result};
use crate::matcher::{Match, TriggerMatcher};

/// Routes input text to one enabled plugin.
///
/// Built from a snapshot of enabled manifests; rebuild it after the
/// registry changes.
#[derive(Debug)]
pub struct Router {
    matcher: TriggerMatcher,
    intents: Vec<Arc<Manifest>>,
    catch_all: Option<Arc<Manifest>>,
    classifier: Option<IntentClassifier>,
}

impl Router {
    /// Build a router over `manifests`, in registration order.
    ///
    /// Fails when a pattern does not compile or when more than one manifest
    /// has a catch-all trigger.
    pub fn build(manifests: &[Arc<Manifest>], classifier: Option<IntentClassifier>) -> Result<Self> {
        let matcher = TriggerMatcher::build(manifests)?;

        let intents: Vec<Arc<Manifest>> = manifests
            .iter()
            .filter(|m| matches!(m.trigger, Trigger::Intent { .. }))
            .cloned()
            .collect();

        let mut catch_all: Option<Arc<Manifest>> = None;
        for manifest in manifests.iter().filter(|m| m.is_catch_all()) {
            if let Some(first) = &catch_all {
                return Err(KernelError::CatchAllConflict {
                    first: first.id.clone(),
                    second: manifest.id.clone(),
                });
            }
            catch_all = Some(Arc::clone(manifest));
        }

        debug!(
            deterministic = matcher.len(),
            intents = intents.len(),
            catch_all = catch_all.as_ref().map(|m| m.id.as_str()),
            classifier = classifier.is_some(),
            "router built"
        );

        Ok(Self {
            matcher,
            intents,
            catch_all,
            classifier,
        })
    }

    /// Build a router over the registry's enabled plugins.
    pub fn from_registry(registry: &PluginRegistry, classifier: Option<IntentClassifier>) -> Result<Self> {
        Self::build(&registry.enabled(), classifier)
    }

    /// Phase 1 only.
    pub fn match_deterministic(&self, text: &str) -> Option<Match> {
        self.matcher.find(text)
    }

    /// Route `text` through all three phases.  Blank text never matches.
    pub async fn route(&self, text: &str) -> Option<Match> {
        if text.trim().is_empty() {
            return None;
        }

        if let Some(found) = self.matcher.find(text) {
            info!(
                plugin_id = %found.manifest.id,
                trigger = %found.trigger,
                trigger_text = %found.trigger_text,
                "routed by trigger"
            );
            return Some(found);
        }

        if let Some(classifier) = &self.classifier
            && !self.intents.is_empty()
            && let Some(manifest) = classifier.classify(text, &self.intents).await
        {
            info!(plugin_id = %manifest.id, "routed by intent");
            return Some(Match::direct(manifest, text));
        }

        if let Some(manifest) = &self.catch_all {
            info!(plugin_id = %manifest.id, "routed to catch-all");
            return Some(Match::direct(Arc::clone(manifest), text));
        }

        debug!("no plugin matched");
        None
    }

    pub fn catch_all(&self) -> Option<&Arc<Manifest>> {
        self.catch_all.as_ref()
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
