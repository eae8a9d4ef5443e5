use serde::{Deserialize, Serialize};

use crate::resource::ResourceIdentifier;

/// A candidate together with its similarity score (0.0–1.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub resource: ResourceIdentifier,
    pub score: f64,
}

/// Outcome of resolving a free-text reference against known identifiers.
///
/// Every variant is a valid result; callers present choices on `Ambiguous`
/// and offer a full listing on `NoMatch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "candidates", rename_all = "snake_case")]
pub enum MatchResult {
    Definite(ResourceIdentifier),
    /// Highest score first, ties by identifier.
    Ambiguous(Vec<ScoredCandidate>),
    NoMatch,
}

impl MatchResult {
    pub fn definite(&self) -> Option<&ResourceIdentifier> {
        match self {
            Self::Definite(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_definite(&self) -> bool {
        matches!(self, Self::Definite(_))
    }

    /// Identifiers in presentation order.
    pub fn candidate_ids(&self) -> Vec<&str> {
        match self {
            Self::Definite(id) => vec![id.id.as_str()],
            Self::Ambiguous(list) => list.iter().map(|c| c.resource.id.as_str()).collect(),
            Self::NoMatch => Vec::new(),
        }
    }
}
