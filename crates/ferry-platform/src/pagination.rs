//! Cursor-based pagination for list operations

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Opaque continuation token returned by a list call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(pub String);

/// One page of a list response
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub resources: Vec<T>,
    pub next: Option<Cursor>,
}

impl<T> Page<T> {
    /// A page with no continuation
    pub fn last(resources: Vec<T>) -> Self {
        Self {
            resources,
            next: None,
        }
    }
}

/// Follow continuation cursors until the last page, collecting every resource.
///
/// ```no_run
/// # use ferry_platform::{paginate, Platform, Result};
/// # async fn example(platform: &dyn Platform) -> Result<()> {
/// let shared = paginate(|cursor| platform.domains().list_shared(cursor)).await?;
/// # Ok(())
/// # }
/// ```
pub async fn paginate<T, F, Fut>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<Cursor>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut resources = Vec::new();
    let mut cursor = None;

    loop {
        let page = fetch(cursor).await?;
        resources.extend(page.resources);
        match page.next {
            Some(next) => cursor = Some(next),
            None => return Ok(resources),
        }
    }
}

/// Split an already filtered, ordered listing into pages of `size`.
///
/// The cursor is the offset of the next page.
pub fn page_of<T: Clone>(items: &[T], cursor: Option<&Cursor>, size: usize) -> Page<T> {
    let start = cursor
        .and_then(|c| c.0.parse::<usize>().ok())
        .unwrap_or(0)
        .min(items.len());
    let end = start.saturating_add(size.max(1)).min(items.len());
    let next = (end < items.len()).then(|| Cursor(end.to_string()));

    Page {
        resources: items[start..end].to_vec(),
        next,
    }
}
