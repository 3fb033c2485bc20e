//! Catalog search request/response types

use serde::{Deserialize, Serialize};

/// Default number of results returned when the caller does not say.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// A catalog search. `terms` are ANDed; the free-form `query` is an OR
/// alternative over the indexed text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SearchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default)]
    pub terms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl SearchRequest {
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Default::default()
        }
    }

    pub fn terms(terms: Vec<String>) -> Self {
        Self {
            terms,
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Blank query and no meaningful terms: listing, not searching.
    pub fn is_empty(&self) -> bool {
        let query_blank = self
            .query
            .as_deref()
            .map_or(true, |query| query.trim().is_empty());
        let terms_blank = self.terms.iter().all(|term| term.trim().is_empty());
        query_blank && terms_blank
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_SEARCH_LIMIT)
    }
}

/// One search hit. Listing calls return items wrapped with an empty
/// score and id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SearchResult<T> {
    pub item: T,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub id: String,
}

impl<T> SearchResult<T> {
    /// Wrap an item without any scoring, as plain listings do.
    pub fn unscored(item: T) -> Self {
        Self {
            item,
            score: 0.0,
            id: String::new(),
        }
    }

    pub fn scored(item: T, score: f32, id: impl Into<String>) -> Self {
        Self {
            item,
            score,
            id: id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_empty() {
        assert!(SearchRequest::default().is_empty());
        assert!(SearchRequest::query("   ").is_empty());
        assert!(SearchRequest::terms(vec![" ".to_string(), String::new()]).is_empty());
        assert!(!SearchRequest::query("admin").is_empty());
        assert!(!SearchRequest::terms(vec!["iam".to_string()]).is_empty());
    }

    #[test]
    fn test_effective_limit_defaults_to_ten() {
        assert_eq!(SearchRequest::default().effective_limit(), 10);
        assert_eq!(
            SearchRequest::query("x").with_limit(3).effective_limit(),
            3
        );
    }
}
