//! Error types for node resolution

use super::NodeKey;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ResolveError>;

/// Outcome of a failed lookup; "no match" and "several matches" are never merged
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Node '{query}' not found")]
    NotFound { query: String },

    #[error("Node '{query}' is ambiguous: {} candidates ({})", candidates.len(), list_keys(candidates))]
    Ambiguous {
        query: String,
        candidates: Vec<NodeKey>,
    },
}

fn list_keys(keys: &[NodeKey]) -> String {
    keys.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(", ")
}

impl ResolveError {
    pub fn not_found(query: impl ToString) -> Self {
        Self::NotFound {
            query: query.to_string(),
        }
    }

    /// Candidate set of an ambiguous lookup (empty for `NotFound`)
    pub fn candidates(&self) -> &[NodeKey] {
        match self {
            ResolveError::NotFound { .. } => &[],
            ResolveError::Ambiguous { candidates, .. } => candidates,
        }
    }
}
