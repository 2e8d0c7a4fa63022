//! Intent classification.
//!
//! When no keyword or regex trigger fires, the manifests with intent
//! triggers are described to a language model, which answers with the id
//! of the best fit or `none`.  Any failure along the way is logged and
//! treated as "no match".

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, warn};

use opentolk_agent::{ChatModel, ChatRequest, LlmResponse, Message};
use opentolk_plugins::{Manifest, Trigger};

// ═══════════════════════════════════════════════════════════════════════
//  Classification prompt
// ═══════════════════════════════════════════════════════════════════════

const CLASSIFY_PROMPT: &str = "\
You route user requests to plugins. You are given a list of plugins, each \
with an id, the intents it handles and sometimes example requests. Decide \
which single plugin should handle the user's request.

Respond with ONLY the plugin id, exactly as written. If no plugin is a \
clear fit, respond with the single word none. No explanation.";

/// Sentinel answer meaning "no plugin fits".
const NONE_ANSWER: &str = "none";

// ═══════════════════════════════════════════════════════════════════════
//  Classifier
// ═══════════════════════════════════════════════════════════════════════

/// Language-model intent classifier.
#[derive(Clone)]
pub struct IntentClassifier {
    llm: Arc<dyn ChatModel>,
    model: String,
}

impl IntentClassifier {
    /// `model` may be empty to use the client's default.
    pub fn new(llm: Arc<dyn ChatModel>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    /// Pick the intent-triggered manifest best suited to `text`.
    ///
    /// Manifests without an intent trigger are ignored.
    pub async fn classify(&self, text: &str, candidates: &[Arc<Manifest>]) -> Option<Arc<Manifest>> {
        let candidates: Vec<&Arc<Manifest>> = candidates
            .iter()
            .filter(|m| matches!(m.trigger, Trigger::Intent { .. }))
            .collect();
        if candidates.is_empty() {
            return None;
        }

        let mut request = ChatRequest::new(
            self.model.clone(),
            vec![
                Message::system(CLASSIFY_PROMPT),
                Message::user(build_user_prompt(text, &candidates)),
            ],
        );
        request.temperature = Some(0.0);
        request.max_tokens = Some(64);

        let answer = match self.llm.chat(&request).await {
            Ok(LlmResponse::Text(answer)) => answer,
            Ok(LlmResponse::ToolCalls(_)) => {
                warn!("intent classifier answered with tool calls, ignoring");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "intent classification failed, treating as no match");
                return None;
            }
        };

        let chosen = parse_answer(&answer, &candidates);
        debug!(answer = %answer.trim(), chosen = ?chosen.map(|m| &m.id), "intent classified");
        chosen.cloned()
    }
}

impl std::fmt::Debug for IntentClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentClassifier")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

fn build_user_prompt(text: &str, candidates: &[&Arc<Manifest>]) -> String {
    let mut prompt = String::from("Plugins:\n");
    for manifest in candidates {
        let Trigger::Intent { intents, examples } = &manifest.trigger else {
            continue;
        };
        let _ = writeln!(prompt, "- id: {}", manifest.id);
        let _ = writeln!(prompt, "  intents: {}", intents.join("; "));
        if !examples.is_empty() {
            let _ = writeln!(prompt, "  examples: {}", examples.join("; "));
        }
    }
    let _ = write!(prompt, "\nUser request: {text}");
    prompt
}

/// Map the model's answer onto a candidate: the whole answer as an id, then
/// the first line that is exactly one id.
fn parse_answer<'a>(answer: &str, candidates: &[&'a Arc<Manifest>]) -> Option<&'a Arc<Manifest>> {
    let cleaned = clean(answer);
    if cleaned.is_empty() || cleaned == NONE_ANSWER {
        return None;
    }

    std::iter::once(cleaned)
        .chain(answer.lines().map(clean))
        .find_map(|line| {
            candidates
                .iter()
                .find(|m| m.id.to_lowercase() == line)
                .copied()
        })
}

fn clean(text: &str) -> String {
    text.trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '.' | ',' | ':' | '*'))
        .trim()
        .to_lowercase()
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
