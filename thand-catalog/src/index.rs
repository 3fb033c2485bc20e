//! In-memory inverted index over catalog entries

use std::collections::{HashMap, HashSet};

use thand_core::SearchRequest;

/// Inverted index for one catalog generation. Terms are ANDed; the
/// free-form query is an OR alternative; scores are the fraction of
/// requested tokens a document matched.
#[derive(Debug, Default)]
pub struct TextIndex {
    /// Generation this index was built from
    epoch: u64,
    /// token -> ordinals of documents containing it
    postings: HashMap<String, Vec<usize>>,
    documents: usize,
}

/// Lowercase alphanumeric tokenizer shared by build and query paths.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

impl TextIndex {
    /// Build an index over the documents of one generation; each document
    /// is the searchable text of one catalog entry.
    pub fn build(epoch: u64, documents: &[Vec<String>]) -> Self {
        let mut postings: HashMap<String, Vec<usize>> = HashMap::new();
        for (ordinal, texts) in documents.iter().enumerate() {
            let mut seen = HashSet::new();
            for text in texts {
                for token in tokenize(text) {
                    if seen.insert(token.clone()) {
                        postings.entry(token).or_default().push(ordinal);
                    }
                }
            }
        }
        Self {
            epoch,
            postings,
            documents: documents.len(),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn docs_for(&self, token: &str) -> HashSet<usize> {
        self.postings
            .get(token)
            .map(|ordinals| ordinals.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Resolve a search into `(ordinal, score)` pairs, best first.
    pub fn search(&self, request: &SearchRequest) -> Vec<(usize, f32)> {
        let term_tokens: Vec<String> = request
            .terms
            .iter()
            .flat_map(|term| tokenize(term))
            .collect();
        let query_tokens: Vec<String> = request
            .query
            .as_deref()
            .into_iter()
            .flat_map(tokenize)
            .collect();

        // Conjunction over every term token.
        let term_hits: Option<HashSet<usize>> = if term_tokens.is_empty() {
            None
        } else {
            let mut hits: Option<HashSet<usize>> = None;
            for token in &term_tokens {
                let docs = self.docs_for(token);
                hits = Some(match hits {
                    None => docs,
                    Some(current) => current.intersection(&docs).copied().collect(),
                });
            }
            hits
        };

        // Disjunction over query tokens.
        let query_hits: Option<HashSet<usize>> = if query_tokens.is_empty() {
            None
        } else {
            let mut hits = HashSet::new();
            for token in &query_tokens {
                hits.extend(self.docs_for(token));
            }
            Some(hits)
        };

        let candidates: HashSet<usize> = match (term_hits, query_hits) {
            (Some(terms), Some(query)) => terms.union(&query).copied().collect(),
            (Some(terms), None) => terms,
            (None, Some(query)) => query,
            (None, None) => return Vec::new(),
        };

        // Score by the fraction of requested tokens present.
        let requested: Vec<&String> = term_tokens.iter().chain(query_tokens.iter()).collect();
        let mut scored: Vec<(usize, f32)> = candidates
            .into_iter()
            .map(|ordinal| {
                let matched = requested
                    .iter()
                    .filter(|token| {
                        self.postings
                            .get(token.as_str())
                            .map(|ordinals| ordinals.binary_search(&ordinal).is_ok())
                            .unwrap_or(false)
                    })
                    .count();
                (ordinal, matched as f32 / requested.len().max(1) as f32)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(request.effective_limit());
        scored
    }

    pub fn len(&self) -> usize {
        self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.documents == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> TextIndex {
        TextIndex::build(
            1,
            &[
                vec!["iam:list".to_string(), "List IAM entities".to_string()],
                vec!["iam:get".to_string(), "Read one IAM entity".to_string()],
                vec!["s3:get".to_string(), "Read object storage".to_string()],
            ],
        )
    }

    #[test]
    fn test_terms_are_conjunctive() {
        let hits = index().search(&SearchRequest::terms(vec![
            "iam".to_string(),
            "list".to_string(),
        ]));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 0);
    }

    #[test]
    fn test_query_is_disjunctive() {
        let hits = index().search(&SearchRequest::query("iam storage"));
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_query_or_terms_union() {
        let request = SearchRequest {
            query: Some("storage".to_string()),
            terms: vec!["iam".to_string(), "list".to_string()],
            limit: None,
        };
        let hits = index().search(&request);
        // Conjunctive terms hit doc 0, the query alternative hits doc 2.
        let ordinals: Vec<usize> = hits.iter().map(|(ordinal, _)| *ordinal).collect();
        assert!(ordinals.contains(&0));
        assert!(ordinals.contains(&2));
        assert!(!ordinals.contains(&1));
    }

    #[test]
    fn test_limit_and_order() {
        let hits = index().search(&SearchRequest::query("iam").with_limit(1));
        assert_eq!(hits.len(), 1);
        // Best score first; ties break on ordinal.
        assert_eq!(hits[0].0, 0);
    }

    #[test]
    fn test_empty_request_matches_nothing() {
        assert!(index().search(&SearchRequest::default()).is_empty());
    }
}
