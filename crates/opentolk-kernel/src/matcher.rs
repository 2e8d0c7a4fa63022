//! Deterministic trigger matching.
//!
//! Keyword and regex triggers are compiled once when the matcher is built.
//! Matching is synchronous and never touches the network.  When several
//! manifests match, the highest trigger priority wins; at equal priority the
//! longer matched trigger text wins; a full tie goes to the manifest
//! registered first.

use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use opentolk_plugins::{KeywordPosition, Manifest, Trigger, TriggerKind};

use crate::error::{KernelError, Result};

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

/// The outcome of routing one input to one manifest.
#[derive(Debug, Clone, Serialize)]
pub struct Match {
    #[serde(rename = "plugin", serialize_with = "serialize_manifest_id")]
    pub manifest: Arc<Manifest>,
    pub trigger: TriggerKind,
    /// The keyword or regex span that fired; empty for intent and catch-all.
    pub trigger_text: String,
    /// Text handed to the plugin, after any stripping.
    pub input: String,
    /// The untouched original text.
    pub raw_input: String,
}

impl Match {
    /// A match that bypasses routing: the whole text is the input.
    pub fn direct(manifest: Arc<Manifest>, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            trigger: manifest.trigger.kind(),
            manifest,
            trigger_text: String::new(),
            input: text.clone(),
            raw_input: text,
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.manifest.id
    }

    pub fn priority(&self) -> u8 {
        self.trigger.priority()
    }
}

fn serialize_manifest_id<S: serde::Serializer>(
    manifest: &Arc<Manifest>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&manifest.id)
}

// ---------------------------------------------------------------------------
// Compiled triggers
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct CompiledKeyword {
    keyword: String,
    /// Anchored according to the trigger position.
    locate: Regex,
    /// Unanchored; used to strip the first occurrence.
    occurrence: Regex,
}

#[derive(Debug)]
enum CompiledTrigger {
    Keyword {
        /// Longest first.
        keywords: Vec<CompiledKeyword>,
        position: KeywordPosition,
        strip: bool,
    },
    Regex {
        regex: Regex,
        strip: bool,
    },
}

#[derive(Debug)]
struct Entry {
    manifest: Arc<Manifest>,
    trigger: CompiledTrigger,
}

fn case_insensitive(plugin_id: &str, pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| KernelError::InvalidPattern {
            plugin_id: plugin_id.to_string(),
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

fn compile(manifest: &Manifest) -> Result<Option<CompiledTrigger>> {
    match &manifest.trigger {
        Trigger::Keyword {
            keywords,
            position,
            strip,
        } => {
            let mut compiled = Vec::with_capacity(keywords.len());
            for keyword in keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
                let escaped = regex::escape(keyword);
                let anchored = match position {
                    KeywordPosition::Start => format!("^{escaped}"),
                    KeywordPosition::End => format!("{escaped}$"),
                    KeywordPosition::Anywhere => escaped.clone(),
                };
                compiled.push(CompiledKeyword {
                    keyword: keyword.to_string(),
                    locate: case_insensitive(&manifest.id, &anchored)?,
                    occurrence: case_insensitive(&manifest.id, &escaped)?,
                });
            }
            compiled.sort_by_key(|k| std::cmp::Reverse(k.keyword.chars().count()));
            Ok(Some(CompiledTrigger::Keyword {
                keywords: compiled,
                position: *position,
                strip: *strip,
            }))
        }
        Trigger::Regex { pattern, strip } => Ok(Some(CompiledTrigger::Regex {
            regex: case_insensitive(&manifest.id, pattern)?,
            strip: *strip,
        })),
        Trigger::Intent { .. } | Trigger::CatchAll => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Matcher
// ---------------------------------------------------------------------------

/// Keyword/regex matcher over a fixed set of manifests.
#[derive(Debug, Default)]
pub struct TriggerMatcher {
    entries: Vec<Entry>,
}

/// A candidate found by one manifest, before selection.
struct Candidate<'a> {
    entry: &'a Entry,
    trigger_text: String,
    input: String,
}

impl TriggerMatcher {
    /// Compile the keyword and regex triggers of `manifests`, in order.
    /// Other trigger kinds are ignored.
    pub fn build(manifests: &[Arc<Manifest>]) -> Result<Self> {
        let mut entries = Vec::new();
        for manifest in manifests {
            if let Some(trigger) = compile(manifest)? {
                entries.push(Entry {
                    manifest: Arc::clone(manifest),
                    trigger,
                });
            }
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Best keyword/regex match for `raw`, if any.
    pub fn find(&self, raw: &str) -> Option<Match> {
        let text = raw.trim();
        if text.is_empty() {
            return None;
        }

        let mut best: Option<(u8, usize, Candidate<'_>)> = None;
        for entry in &self.entries {
            let Some(candidate) = match_entry(entry, text) else {
                continue;
            };
            let priority = entry.manifest.trigger.kind().priority();
            let length = candidate.trigger_text.chars().count();
            let better = match &best {
                None => true,
                Some((p, l, _)) => (priority, length) > (*p, *l),
            };
            if better {
                best = Some((priority, length, candidate));
            }
        }

        best.map(|(_, _, c)| Match {
            manifest: Arc::clone(&c.entry.manifest),
            trigger: c.entry.manifest.trigger.kind(),
            trigger_text: c.trigger_text,
            input: c.input,
            raw_input: raw.to_string(),
        })
    }
}

fn match_entry<'a>(entry: &'a Entry, text: &str) -> Option<Candidate<'a>> {
    match &entry.trigger {
        CompiledTrigger::Keyword {
            keywords,
            position,
            strip,
        } => keywords.iter().find_map(|kw| {
            let found = kw.locate.find(text)?;
            if !at_word_boundary(text, found.start(), found.end(), *position) {
                return None;
            }
            let input = if *strip {
                kw.occurrence.replacen(text, 1, "").trim().to_string()
            } else {
                text.to_string()
            };
            Some(Candidate {
                entry,
                trigger_text: kw.keyword.clone(),
                input,
            })
        }),
        CompiledTrigger::Regex { regex, strip } => {
            let found = regex.find(text)?;
            let input = if *strip {
                format!("{}{}", &text[..found.start()], &text[found.end()..])
                    .trim()
                    .to_string()
            } else {
                text.to_string()
            };
            Some(Candidate {
                entry,
                trigger_text: found.as_str().to_string(),
                input,
            })
        }
    }
}

/// A start keyword must not run into a following letter; an end keyword
/// must not follow a letter.
fn at_word_boundary(text: &str, start: usize, end: usize, position: KeywordPosition) -> bool {
    match position {
        KeywordPosition::Start => text[end..].chars().next().is_none_or(|c| !c.is_alphabetic()),
        KeywordPosition::End => text[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphabetic()),
        KeywordPosition::Anywhere => true,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
