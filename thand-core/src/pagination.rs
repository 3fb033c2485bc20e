//! Pagination request/response types

use serde::{Deserialize, Serialize};

/// Cursor for a paged provider call. The token is opaque to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Pagination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Pagination {
    /// Cursor for the first page with a provider-chosen page size.
    pub fn first() -> Self {
        Self::default()
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// An empty token means there is nothing left to fetch.
    pub fn is_terminal(&self) -> bool {
        self.token.as_deref().map_or(true, str::is_empty)
    }
}

/// One page of provider items plus the cursor for the next call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Paged<T> {
    pub items: Vec<T>,
    /// Absent on the last page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T> Paged<T> {
    /// A single terminal page.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            pagination: None,
        }
    }

    /// A page whose cursor points at more data.
    pub fn continued(items: Vec<T>, next: Pagination) -> Self {
        Self {
            items,
            pagination: Some(next),
        }
    }

    /// The paged loop stops when the response carries no pagination or an
    /// empty token.
    pub fn is_last_page(&self) -> bool {
        match &self.pagination {
            None => true,
            Some(pagination) => pagination.is_terminal(),
        }
    }
}

impl<T> Default for Paged<T> {
    fn default() -> Self {
        Self::last(Vec::new())
    }
}
