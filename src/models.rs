//! Core data models used throughout the harvester.
//!
//! Posts are kept as the JSON objects the remote returns: the field set
//! belongs to the remote schema, and the CSV writer projects them onto a
//! fixed header.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Field holding the post body in remote rows.
pub const TEXT_FIELD: &str = "full_text";
/// Column added to every kept row with the account handle.
pub const USERNAME_FIELD: &str = "username";
/// Column added to every kept row with the collection timestamp.
pub const COLLECTED_AT_FIELD: &str = "collected_at";

/// A remote account: the handle people know and the identifier the posts
/// endpoint filters on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub handle: String,
    pub id: String,
}

impl Account {
    /// Build an account from a remote `account` row.
    ///
    /// Returns `None` when either `username` or `account_id` is missing or
    /// empty. The identifier may arrive as a string or a number.
    pub fn from_row(row: &Value) -> Option<Self> {
        let handle = row.get("username")?.as_str()?.trim();
        let id = match row.get("account_id")? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        if handle.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self {
            handle: handle.to_string(),
            id,
        })
    }
}

/// A post as returned by the remote, one JSON object per row.
pub type PostRow = Map<String, Value>;

/// Text of a post row, or `""` when the field is absent or not a string.
pub fn post_text(row: &PostRow) -> &str {
    row.get(TEXT_FIELD).and_then(Value::as_str).unwrap_or("")
}

/// Attach the handle and collection timestamp to a kept row.
pub fn decorate_post(row: &mut PostRow, handle: &str, collected_at: DateTime<Utc>) {
    row.insert(USERNAME_FIELD.to_string(), Value::String(handle.to_string()));
    row.insert(
        COLLECTED_AT_FIELD.to_string(),
        Value::String(collected_at.to_rfc3339()),
    );
}

/// Keep accounts unique by handle, preserving first-seen order.
///
/// A later row for an already-seen handle replaces its identifier in place.
pub fn dedup_accounts(accounts: Vec<Account>) -> Vec<Account> {
    let mut out: Vec<Account> = Vec::with_capacity(accounts.len());
    for account in accounts {
        match out.iter_mut().find(|a| a.handle == account.handle) {
            Some(existing) => existing.id = account.id,
            None => out.push(account),
        }
    }
    out
}
