//! Generation-based catalog store

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use thand_core::{CatalogError, SearchRequest, SearchResult, ThandResult};
use tracing::debug;

use crate::{entry::CatalogEntry, index::TextIndex};

/// One immutable published generation: the slice and its keyed map are
/// always consistent with each other.
struct Generation<T> {
    epoch: u64,
    items: Vec<T>,
    map: std::collections::HashMap<String, usize>,
}

impl<T: CatalogEntry> Generation<T> {
    fn build(epoch: u64, items: Vec<T>) -> Self {
        let mut map = std::collections::HashMap::new();
        for (ordinal, item) in items.iter().enumerate() {
            for key in item.lookup_keys() {
                map.insert(key, ordinal);
            }
        }
        Self { epoch, items, map }
    }
}

/// Catalog of one entry kind for one provider.
///
/// Writers publish a fresh generation under the write lock; readers
/// snapshot the current `Arc` under the read lock and never observe a
/// half-written state. The text index trails the generation: it is
/// rebuilt on a detached task and consulted only once its epoch matches
/// the published generation, with a substring scan covering the gap.
pub struct CatalogStore<T: CatalogEntry> {
    current: RwLock<Arc<Generation<T>>>,
    index: Arc<RwLock<Option<Arc<TextIndex>>>>,
    epochs: Arc<AtomicU64>,
}

impl<T: CatalogEntry> Default for CatalogStore<T> {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(Generation::build(0, Vec::new()))),
            index: Arc::new(RwLock::new(None)),
            epochs: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<T: CatalogEntry> CatalogStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the catalog contents and kick off an index rebuild.
    pub fn set(&self, items: Vec<T>) {
        let epoch = self.epochs.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = Arc::new(Generation::build(epoch, items));
        let documents: Vec<Vec<String>> = generation
            .items
            .iter()
            .map(CatalogEntry::search_text)
            .collect();

        *self.current.write().unwrap() = Arc::clone(&generation);

        let slot = Arc::clone(&self.index);
        let epochs = Arc::clone(&self.epochs);
        let rebuild = move || {
            let index = Arc::new(TextIndex::build(epoch, &documents));
            // A newer generation may have been published while we built;
            // stale indices are dropped rather than swapped in.
            if epochs.load(Ordering::SeqCst) == epoch {
                *slot.write().unwrap() = Some(index);
            } else {
                debug!(epoch, "discarding index for superseded generation");
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(rebuild);
            }
            // No runtime (plain unit tests, setup code): build inline.
            Err(_) => rebuild(),
        }
    }

    /// Append items to the current generation and republish. Duplicate
    /// keys are allowed; the latest occurrence wins the map slot.
    pub fn add(&self, items: Vec<T>) {
        let mut merged = self.snapshot().items.clone();
        merged.extend(items);
        self.set(merged);
    }

    fn snapshot(&self) -> Arc<Generation<T>> {
        Arc::clone(&self.current.read().unwrap())
    }

    /// O(1) keyed lookup; keys are matched case-insensitively.
    pub fn get(&self, key: &str) -> ThandResult<T> {
        let generation = self.snapshot();
        generation
            .map
            .get(&key.to_lowercase())
            .and_then(|ordinal| generation.items.get(*ordinal))
            .cloned()
            .ok_or_else(|| {
                CatalogError::NotFound {
                    kind: T::KIND,
                    key: key.to_string(),
                }
                .into()
            })
    }

    /// All items in publication order.
    pub fn all(&self) -> Vec<T> {
        self.snapshot().items.clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().items.is_empty()
    }

    /// Whether the index has caught up with the published generation.
    pub fn index_ready(&self) -> bool {
        let generation = self.snapshot();
        self.index
            .read()
            .unwrap()
            .as_ref()
            .map(|index| index.epoch() == generation.epoch)
            .unwrap_or(false)
    }

    /// List or search the catalog. An absent/empty request returns every
    /// item unscored; otherwise the index serves the query when it is
    /// current, with a substring fallback until it converges.
    pub fn list(&self, request: Option<&SearchRequest>) -> Vec<SearchResult<T>> {
        let generation = self.snapshot();

        let request = match request {
            Some(request) if !request.is_empty() => request,
            _ => {
                return generation
                    .items
                    .iter()
                    .cloned()
                    .map(SearchResult::unscored)
                    .collect();
            }
        };

        let index = self.index.read().unwrap().clone();
        if let Some(index) = index.filter(|index| index.epoch() == generation.epoch) {
            return index
                .search(request)
                .into_iter()
                .filter_map(|(ordinal, score)| {
                    generation.items.get(ordinal).map(|item| {
                        SearchResult::scored(item.clone(), score, item.result_id())
                    })
                })
                .collect();
        }

        self.substring_scan(&generation.items, request)
    }

    /// Fallback used while the index lags: conjunctive terms, disjunctive
    /// query, case-insensitive containment over the searchable text.
    fn substring_scan(&self, items: &[T], request: &SearchRequest) -> Vec<SearchResult<T>> {
        let terms: Vec<String> = request
            .terms
            .iter()
            .map(|term| term.trim().to_lowercase())
            .filter(|term| !term.is_empty())
            .collect();
        let query = request
            .query
            .as_deref()
            .map(|query| query.trim().to_lowercase())
            .filter(|query| !query.is_empty());

        let mut results = Vec::new();
        for item in items {
            let haystacks: Vec<String> = item
                .search_text()
                .iter()
                .map(|text| text.to_lowercase())
                .collect();
            let contains =
                |needle: &str| haystacks.iter().any(|haystack| haystack.contains(needle));

            let terms_hit = !terms.is_empty() && terms.iter().all(|term| contains(term));
            let query_hit = query.as_deref().map(contains).unwrap_or(false);

            if terms_hit || query_hit {
                results.push(SearchResult::scored(item.clone(), 0.0, item.result_id()));
                if results.len() >= request.effective_limit() {
                    break;
                }
            }
        }
        results
    }
}

impl<T: CatalogEntry> std::fmt::Debug for CatalogStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let generation = self.snapshot();
        f.debug_struct("CatalogStore")
            .field("epoch", &generation.epoch)
            .field("items", &generation.items.len())
            .field("index_ready", &self.index_ready())
            .finish()
    }
}
