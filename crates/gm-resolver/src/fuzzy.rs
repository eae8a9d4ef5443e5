//! Deterministic fuzzy resolution of free-text resource references.
//!
//! Scoring per candidate form `f` against the normalized query `q`:
//!
//! | relation            | score                                   |
//! |---------------------|-----------------------------------------|
//! | `q == f`            | 1.0                                     |
//! | `f` starts with `q` | 0.85 + 0.10 × len(q)/len(f)             |
//! | `f` contains `q`    | 0.75 + 0.10 × len(q)/len(f)             |
//! | otherwise           | 0.80 × normalized Levenshtein(q, f)     |
//!
//! A candidate's score is the best over its forms: the normalized id, the
//! normalized display name, the local part of e-mail style ids, and each of
//! those with stop words removed.

use std::cmp::Ordering;

use gm_protocol::{MatchResult, ResourceIdentifier, ScoredCandidate};

/// Minimum score for a candidate to be accepted at all.
pub const ACCEPT_THRESHOLD: f64 = 0.70;

/// Lead the best candidate needs over the runner-up to be definite.
pub const DEFINITE_MARGIN: f64 = 0.15;

/// Words that carry no identifying information in operator references.
const STOP_WORDS: &[&str] = &[
    "job",
    "jobs",
    "execution",
    "executions",
    "account",
    "accounts",
    "service",
    "dataset",
    "datasets",
    "vm",
    "vms",
    "instance",
    "instances",
    "the",
    "for",
    "my",
    "of",
];

/// Lowercase, collapse whitespace and underscores to single dashes, drop stop words.
pub fn normalize_reference(text: &str) -> String {
    let lower = text.to_lowercase();
    split_tokens(&lower)
        .filter(|t| !STOP_WORDS.contains(t))
        .collect::<Vec<_>>()
        .join("-")
}

/// Same as `normalize_reference` but keeps every word.
fn normalize_form(text: &str) -> String {
    let lower = text.to_lowercase();
    split_tokens(&lower).collect::<Vec<_>>().join("-")
}

fn split_tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|t| !t.is_empty())
}

/// Similarity of one normalized form against the normalized query.
fn form_score(query: &str, form: &str) -> f64 {
    if form.is_empty() {
        return 0.0;
    }
    if query == form {
        return 1.0;
    }
    let coverage = query.len() as f64 / form.len() as f64;
    if form.starts_with(query) {
        return 0.85 + 0.10 * coverage;
    }
    if form.contains(query) {
        return 0.75 + 0.10 * coverage;
    }
    0.80 * strsim::normalized_levenshtein(query, form)
}

fn candidate_forms(candidate: &ResourceIdentifier) -> Vec<String> {
    let mut raw = vec![candidate.id.as_str(), candidate.display_name.as_str()];
    if let Some((local, _)) = candidate.id.split_once('@') {
        raw.push(local);
    }

    let mut forms = Vec::with_capacity(raw.len() * 2);
    for text in raw {
        let full = normalize_form(text);
        let stripped = normalize_reference(text);
        if !stripped.is_empty() && stripped != full {
            forms.push(stripped);
        }
        forms.push(full);
    }
    forms
}

/// Deterministic resolver with tunable acceptance threshold and margin.
#[derive(Debug, Clone, Copy)]
pub struct FuzzyResolver {
    pub threshold: f64,
    pub margin: f64,
}

impl Default for FuzzyResolver {
    fn default() -> Self {
        Self {
            threshold: ACCEPT_THRESHOLD,
            margin: DEFINITE_MARGIN,
        }
    }
}

impl FuzzyResolver {
    pub fn new(threshold: f64, margin: f64) -> Self {
        Self { threshold, margin }
    }

    /// Score a single candidate against raw free text.
    pub fn score(&self, text: &str, candidate: &ResourceIdentifier) -> f64 {
        let query = normalize_reference(text);
        if query.is_empty() {
            return 0.0;
        }
        score_normalized(&query, candidate)
    }

    /// Resolve `text` against `candidates`. Never mutates the candidate set.
    pub fn resolve(&self, text: &str, candidates: &[ResourceIdentifier]) -> MatchResult {
        let query = normalize_reference(text);
        if query.is_empty() || candidates.is_empty() {
            tracing::debug!(reference = %text, "nothing to resolve against");
            return MatchResult::NoMatch;
        }

        let mut scored: Vec<ScoredCandidate> = candidates
            .iter()
            .map(|c| ScoredCandidate {
                resource: c.clone(),
                score: score_normalized(&query, c),
            })
            .collect();
        // Descending score, ties by identifier.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.resource.id.cmp(&b.resource.id))
        });

        let top = scored[0].score;
        let runner_up = scored.get(1).map_or(0.0, |c| c.score);

        if top < self.threshold {
            tracing::debug!(reference = %text, query = %query, top, "no candidate reached threshold");
            return MatchResult::NoMatch;
        }

        if top - runner_up > self.margin {
            let best = scored.swap_remove(0);
            tracing::debug!(
                reference = %text,
                resolved = %best.resource.id,
                score = best.score,
                "definite match"
            );
            return MatchResult::Definite(best.resource);
        }

        let floor = self.threshold.min(top - self.margin);
        scored.retain(|c| c.score >= floor);
        tracing::debug!(
            reference = %text,
            candidates = scored.len(),
            top,
            runner_up,
            "ambiguous match"
        );
        MatchResult::Ambiguous(scored)
    }
}

fn score_normalized(query: &str, candidate: &ResourceIdentifier) -> f64 {
    candidate_forms(candidate)
        .iter()
        .map(|f| form_score(query, f))
        .fold(0.0, f64::max)
}
