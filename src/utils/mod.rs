//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod retry;

use regex::Regex;
use std::sync::OnceLock;
use tokio::sync::watch;
use url::Url;

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    re.replace_all(text.trim(), " ").to_string()
}

/// Resolve once the flag is raised or its sender is gone
pub async fn signalled(flag: &mut watch::Receiver<bool>) {
    loop {
        if *flag.borrow_and_update() {
            return;
        }
        if flag.changed().await.is_err() {
            return;
        }
    }
}

/// Resolve a possibly relative link against the page it was found on
///
/// Returns `None` for empty or unparseable links.
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    base.join(href).ok().map(String::from)
}

/// Truncate text to at most `max_chars` characters
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  hello   world  "), "hello world");
        assert_eq!(normalize_whitespace("a\n\tb\u{a0}c"), "a b c");
    }

    #[test]
    fn test_resolve_link() {
        let base = Url::parse("https://hh.ru/search/vacancy?text=rust").unwrap();
        assert_eq!(
            resolve_link(&base, "/vacancy/123").as_deref(),
            Some("https://hh.ru/vacancy/123")
        );
        assert_eq!(
            resolve_link(&base, "https://spb.hh.ru/vacancy/9").as_deref(),
            Some("https://spb.hh.ru/vacancy/9")
        );
        assert!(resolve_link(&base, "   ").is_none());
    }

    #[tokio::test]
    async fn test_signalled_when_sender_dropped() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        signalled(&mut rx).await;
    }

    #[tokio::test]
    async fn test_signalled_sees_earlier_raise() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        signalled(&mut rx).await;
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("Вакансия разработчика", 8), "Вакан...");
    }
}
