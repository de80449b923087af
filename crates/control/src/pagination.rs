//! Continuation-token pagination.
//!
//! [`page_stream`] yields pages lazily; [`collect`] and friends drive it to
//! exhaustion. Page order and item order are kept exactly as returned, with
//! no sorting or deduplication. The first failed fetch ends the listing and
//! its error is returned unchanged.

use std::future::Future;

use cloudctl_protocol::Page;
use futures_util::{Stream, TryStreamExt, stream};
use tracing::debug;

use crate::wildcard::NameFilter;

/// Arguments of one page fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Server-side name prefix filter.
    pub prefix: Option<String>,
    /// Token from the previous page, passed back unmodified. `None` on the
    /// first request.
    pub continuation: Option<String>,
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Lazily fetches pages until one arrives without a continuation token.
///
/// `prefix` is passed on every request. The stream ends after the last page
/// or right after yielding the first error.
pub fn page_stream<T, E, F, Fut>(
    prefix: Option<String>,
    fetch: F,
) -> impl Stream<Item = Result<Page<T>, E>>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    stream::try_unfold(
        (fetch, Cursor::Start, 1usize),
        move |(mut fetch, cursor, page_no)| {
            let prefix = prefix.clone();
            async move {
                let continuation = match cursor {
                    Cursor::Done => return Ok(None),
                    Cursor::Start => None,
                    Cursor::Next(token) => Some(token),
                };

                let page = fetch(PageRequest {
                    prefix,
                    continuation,
                })
                .await?;

                let next = page.next_token().map(str::to_string);
                debug!(
                    page = page_no,
                    items = page.items.len(),
                    has_more = next.is_some(),
                    "fetched page"
                );

                let cursor = match next {
                    Some(token) => Cursor::Next(token),
                    None => Cursor::Done,
                };
                Ok::<_, E>(Some((page, (fetch, cursor, page_no + 1))))
            }
        },
    )
}

/// Collects every item of every page, in order.
pub async fn collect<T, E, F, Fut>(fetch: F) -> Result<Vec<T>, E>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
{
    collect_filtered(fetch, |_| true).await
}

/// Collects the items accepted by `keep`.
///
/// The filter runs as each page arrives, so at most one page of rejected
/// items is held at a time.
pub async fn collect_filtered<T, E, F, Fut, K>(fetch: F, keep: K) -> Result<Vec<T>, E>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
    K: FnMut(&T) -> bool,
{
    drain(page_stream(None, fetch), keep).await
}

/// Lists items whose name matches a wildcard or prefix pattern.
///
/// The pattern's literal prefix narrows the server-side listing; the full
/// pattern is then matched against `name_of(item)`.
pub async fn list_matching<T, E, F, Fut, N>(
    pattern: Option<&str>,
    fetch: F,
    name_of: N,
) -> Result<Vec<T>, E>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<T>, E>>,
    N: Fn(&T) -> &str,
{
    let filter = NameFilter::new(pattern);
    debug!(
        prefix = ?filter.server_prefix(),
        pattern = ?filter.pattern(),
        "listing with name filter"
    );
    let pages = page_stream(filter.server_prefix().map(str::to_string), fetch);
    drain(pages, |item| filter.accepts(name_of(item))).await
}

async fn drain<T, E, S, K>(pages: S, mut keep: K) -> Result<Vec<T>, E>
where
    S: Stream<Item = Result<Page<T>, E>>,
    K: FnMut(&T) -> bool,
{
    let mut pages = std::pin::pin!(pages);
    let mut out = Vec::new();
    while let Some(page) = pages.try_next().await? {
        out.extend(page.items.into_iter().filter(|item| keep(item)));
    }
    Ok(out)
}
