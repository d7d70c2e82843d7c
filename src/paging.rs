//! Offset/limit pagination.
//!
//! [`fetch_pages`] requests fixed-size pages until one comes back shorter
//! than the page size. A rejected or failed page ends the walk without
//! raising; the caller inspects [`Paged::end`] to decide whether the result
//! is complete.

use anyhow::Result;
use std::future::Future;
use tracing::{debug, warn};

use crate::traits::Page;

/// Why a paged walk stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagingEnd {
    /// A short or empty page: the resource is exhausted.
    Exhausted,
    /// The remote refused a page with this HTTP status.
    Rejected(u16),
    /// The request itself failed.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct Paged<T> {
    pub items: Vec<T>,
    /// Offset of the first page not consumed: the resume point after a
    /// rejection or failure.
    pub next_offset: u64,
    pub end: PagingEnd,
}

impl<T> Paged<T> {
    pub fn is_complete(&self) -> bool {
        self.end == PagingEnd::Exhausted
    }
}

/// Walk a paged resource from `start`, `page_size` items at a time.
pub async fn fetch_pages<T, F, Fut>(start: u64, page_size: u64, mut fetch: F) -> Paged<T>
where
    F: FnMut(u64, u64) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut offset = start;

    loop {
        match fetch(offset, page_size).await {
            Ok(Page::Items(page)) => {
                let n = page.len() as u64;
                debug!(offset, n, "fetched page");
                items.extend(page);
                offset += page_size;
                if n < page_size {
                    return Paged {
                        items,
                        next_offset: offset,
                        end: PagingEnd::Exhausted,
                    };
                }
            }
            Ok(Page::Rejected(status)) => {
                warn!(offset, status, "page request rejected");
                return Paged {
                    items,
                    next_offset: offset,
                    end: PagingEnd::Rejected(status),
                };
            }
            Err(e) => {
                warn!(offset, error = %e, "page request failed");
                return Paged {
                    items,
                    next_offset: offset,
                    end: PagingEnd::Failed(e.to_string()),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn numbered(offset: u64, limit: u64, total: u64) -> Vec<u64> {
        (offset..(offset + limit).min(total)).collect()
    }

    #[tokio::test]
    async fn stops_on_short_page() {
        let calls = RefCell::new(Vec::new());
        let paged = fetch_pages(0, 10, |offset, limit| {
            calls.borrow_mut().push(offset);
            async move { Ok(Page::Items(numbered(offset, limit, 25))) }
        })
        .await;

        assert!(paged.is_complete());
        assert_eq!(paged.items, (0..25).collect::<Vec<_>>());
        assert_eq!(*calls.borrow(), vec![0, 10, 20]);
        assert_eq!(paged.next_offset, 30);
    }

    #[tokio::test]
    async fn exact_multiple_needs_one_empty_page() {
        let calls = RefCell::new(0);
        let paged = fetch_pages(0, 10, |offset, limit| {
            *calls.borrow_mut() += 1;
            async move { Ok(Page::Items(numbered(offset, limit, 20))) }
        })
        .await;

        assert!(paged.is_complete());
        assert_eq!(paged.items.len(), 20);
        assert_eq!(*calls.borrow(), 3);
    }

    #[tokio::test]
    async fn rejection_keeps_earlier_items() {
        let paged = fetch_pages(0, 10, |offset, limit| async move {
            if offset >= 10 {
                Ok(Page::Rejected(503))
            } else {
                Ok(Page::Items(numbered(offset, limit, 100)))
            }
        })
        .await;

        assert_eq!(paged.end, PagingEnd::Rejected(503));
        assert_eq!(paged.items.len(), 10);
        assert_eq!(paged.next_offset, 10);
        assert!(!paged.is_complete());
    }

    #[tokio::test]
    async fn transport_error_is_reported_not_raised() {
        let paged: Paged<u64> = fetch_pages(40, 10, |_, _| async move {
            Err(anyhow::anyhow!("connection reset"))
        })
        .await;

        assert!(matches!(paged.end, PagingEnd::Failed(ref m) if m.contains("connection reset")));
        assert!(paged.items.is_empty());
        assert_eq!(paged.next_offset, 40);
    }
}
