use std::future::Future;

use crate::error::CoreResult;

/// One page of a listing plus the continuation link, when more rows exist
/// past this window.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    /// Link for the next page, built from the template; None on the last page.
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        self.next.is_some()
    }
}

/// Generic pagination cursor shared by every list view. `fetch` is a
/// `(start, count) -> (items, total)` data function; `link` is a template
/// holding exactly one `$` placeholder that gets substituted with the next
/// offset. A negative start is clamped to 0.
pub async fn paginate<T, F, Fut>(
    start: i64,
    per_page: i64,
    link: &str,
    fetch: F,
) -> CoreResult<Page<T>>
where
    F: FnOnce(i64, i64) -> Fut,
    Fut: Future<Output = CoreResult<(Vec<T>, i64)>>,
{
    let start = start.max(0);
    let (items, total) = fetch(start, per_page).await?;
    let last_displayed = start + per_page;
    let next = if last_displayed < total {
        Some(link.replacen('$', &last_displayed.to_string(), 1))
    } else {
        None
    };
    Ok(Page { items, total, next })
}
