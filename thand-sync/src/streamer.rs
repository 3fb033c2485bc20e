//! The shared pagination streamer
//!
//! One loop used by every sync path, local or durable: fetch a page,
//! hand it to the forwarding sink, accumulate, continue until the
//! provider returns a terminal cursor. The `NotImplemented` sentinel is
//! success with no items; any other error stops the loop.

use std::future::Future;

use thand_core::{Pagination, Paged, ThandResult};

/// Drain every page of a paginated provider call.
pub async fn collect_pages<T, F, Fut>(fetch: F) -> ThandResult<Vec<T>>
where
    T: Clone,
    F: FnMut(Pagination) -> Fut,
    Fut: Future<Output = ThandResult<Paged<T>>>,
{
    collect_pages_with(fetch, |_page: Vec<T>| {}).await
}

/// Drain every page, handing each page to `forward` before accumulating
/// it. Page order is preserved both in the forwarded stream and in the
/// returned accumulation; each item is accumulated at most once.
pub async fn collect_pages_with<T, F, Fut, S>(mut fetch: F, mut forward: S) -> ThandResult<Vec<T>>
where
    T: Clone,
    F: FnMut(Pagination) -> Fut,
    Fut: Future<Output = ThandResult<Paged<T>>>,
    S: FnMut(Vec<T>),
{
    let mut items = Vec::new();
    let mut page = Pagination::first();

    loop {
        let response = match fetch(page).await {
            Ok(response) => response,
            // Capability not supported: success, no items.
            Err(err) if err.is_not_implemented() => return Ok(items),
            Err(err) => return Err(err),
        };

        if !response.items.is_empty() {
            forward(response.items.clone());
            items.extend(response.items);
        }

        // The cursor is opaque; an absent pagination or empty token is
        // the terminal condition.
        page = match response.pagination {
            Some(next) if !next.is_terminal() => next,
            _ => break,
        };
    }

    Ok(items)
}
