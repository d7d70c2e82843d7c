//! Account enumeration and lookup, plus the `harvest accounts` command.

use anyhow::Result;
use tracing::warn;

use crate::config::Config;
use crate::connector_rest::RestSource;
use crate::models::{dedup_accounts, Account};
use crate::paging::{fetch_pages, PagingEnd};
use crate::traits::{Page, PostSource};

/// Every account the remote lists, unique by handle, in listing order.
///
/// A rejected or failed page ends enumeration with whatever was listed so
/// far; the second value tells the caller whether the listing was complete.
pub async fn enumerate_accounts(
    source: &dyn PostSource,
    page_size: u64,
) -> (Vec<Account>, PagingEnd) {
    let paged = fetch_pages(0, page_size, |offset, limit| {
        source.accounts_page(offset, limit)
    })
    .await;

    let accounts = paged.items.iter().filter_map(Account::from_row).collect();
    (dedup_accounts(accounts), paged.end)
}

/// The first `limit` accounts, unique by handle.
///
/// Stops paging as soon as `limit` accounts are in hand. The second value is
/// `None` when the limit was reached, so more accounts may exist.
pub async fn list_accounts(
    source: &dyn PostSource,
    page_size: u64,
    limit: usize,
) -> (Vec<Account>, Option<PagingEnd>) {
    let mut accounts = Vec::new();
    let mut offset = 0;

    let end = loop {
        if accounts.len() >= limit {
            break None;
        }
        let rows = match source.accounts_page(offset, page_size).await {
            Ok(Page::Items(rows)) => rows,
            Ok(Page::Rejected(status)) => break Some(PagingEnd::Rejected(status)),
            Err(e) => break Some(PagingEnd::Failed(e.to_string())),
        };
        let n = rows.len() as u64;
        accounts.extend(rows.iter().filter_map(Account::from_row));
        accounts = dedup_accounts(accounts);
        offset += page_size;
        if n < page_size {
            break Some(PagingEnd::Exhausted);
        }
    };

    accounts.truncate(limit);
    (accounts, end)
}

/// Look up each handle. Unknown handles and failed lookups are logged and
/// skipped.
pub async fn resolve_accounts(source: &dyn PostSource, handles: &[String]) -> Vec<Account> {
    let mut found = Vec::with_capacity(handles.len());
    for handle in handles {
        match source.lookup_account(handle).await {
            Ok(Page::Items(rows)) => match rows.iter().find_map(Account::from_row) {
                Some(account) => found.push(account),
                None => warn!(handle = %handle, "account not found"),
            },
            Ok(Page::Rejected(status)) => {
                warn!(handle = %handle, status, "account lookup rejected")
            }
            Err(e) => warn!(handle = %handle, error = %e, "account lookup failed"),
        }
    }
    dedup_accounts(found)
}

/// List the first `limit` accounts, or look up `find` handles.
pub async fn run_accounts(config: &Config, find: &[String], limit: usize) -> Result<()> {
    let source = RestSource::new(&config.api)?;

    if !find.is_empty() {
        let found = resolve_accounts(&source, find).await;
        println!("accounts lookup");
        for handle in find {
            match found.iter().find(|a| &a.handle == handle) {
                Some(a) => println!("  found {}: {}", a.handle, a.id),
                None => println!("  missing {}", handle),
            }
        }
        println!("  found: {} / {}", found.len(), find.len());
        return Ok(());
    }

    let page_size = (limit as u64).clamp(1, config.api.page_size);
    let (accounts, end) = list_accounts(&source, page_size, limit).await;

    println!("accounts");
    for a in &accounts {
        println!("  {} ({})", a.handle, a.id);
    }
    println!("  listed: {}", accounts.len());
    match end {
        None => println!("  (limit reached; raise --limit to see more)"),
        Some(PagingEnd::Exhausted) => {}
        Some(PagingEnd::Rejected(status)) => println!("  listing stopped early: HTTP {}", status),
        Some(PagingEnd::Failed(msg)) => println!("  listing stopped early: {}", msg),
    }
    Ok(())
}
