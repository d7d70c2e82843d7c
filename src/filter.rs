//! Content filter for harvested posts.
//!
//! A pure predicate: the same text always yields the same [`Verdict`]. Rules
//! run on the trimmed text in a fixed order and the first one that matches is
//! reported:
//!
//! | Reason | Rule |
//! |--------|------|
//! | `Empty` | nothing but whitespace |
//! | `Repost` | starts with `RT @` |
//! | `TooShort` | fewer than `min_length` characters |
//! | `MentionHeavy` | more than `max_mention_ratio` of tokens start with `@` |
//! | `UrlOnly` | fewer than `min_text_without_urls` characters once URLs are removed |
//! | `HashtagHeavy` | more than `max_hashtag_ratio` of tokens start with `#` |

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::config::FilterConfig;

const REPOST_MARKER: &str = "RT @";

fn url_pattern() -> &'static Regex {
    static URL: OnceLock<Regex> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r"https?://\S+").expect("static URL pattern is valid"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Reject(Reason),
}

impl Verdict {
    pub fn is_keep(&self) -> bool {
        matches!(self, Verdict::Keep)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    Empty,
    Repost,
    TooShort,
    MentionHeavy,
    UrlOnly,
    HashtagHeavy,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Reason::Empty => "empty",
            Reason::Repost => "repost",
            Reason::TooShort => "too short",
            Reason::MentionHeavy => "mostly mentions",
            Reason::UrlOnly => "mostly links",
            Reason::HashtagHeavy => "mostly hashtags",
        };
        f.write_str(s)
    }
}

/// Decides whether a post is worth keeping.
#[derive(Debug, Clone)]
pub struct ContentFilter {
    config: FilterConfig,
}

impl ContentFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, text: &str) -> Verdict {
        let text = text.trim();
        if text.is_empty() {
            return Verdict::Reject(Reason::Empty);
        }

        if text.starts_with(REPOST_MARKER) {
            return Verdict::Reject(Reason::Repost);
        }

        if text.chars().count() < self.config.min_length {
            return Verdict::Reject(Reason::TooShort);
        }

        let words: Vec<&str> = text.split_whitespace().collect();

        if token_ratio(&words, '@') > self.config.max_mention_ratio {
            return Verdict::Reject(Reason::MentionHeavy);
        }

        let without_urls = url_pattern().replace_all(text, "");
        if without_urls.trim().chars().count() < self.config.min_text_without_urls {
            return Verdict::Reject(Reason::UrlOnly);
        }

        if token_ratio(&words, '#') > self.config.max_hashtag_ratio {
            return Verdict::Reject(Reason::HashtagHeavy);
        }

        Verdict::Keep
    }
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}

/// Share of `words` starting with `prefix`; `0.0` for no words.
fn token_ratio(words: &[&str], prefix: char) -> f64 {
    if words.is_empty() {
        return 0.0;
    }
    let hits = words.iter().filter(|w| w.starts_with(prefix)).count();
    hits as f64 / words.len() as f64
}
