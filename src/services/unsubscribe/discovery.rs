//! Unsubscribe link discovery in message bodies.
//!
//! Two passes over the body, merged in order and deduplicated:
//! a pattern scan for URL-shaped text containing an unsubscribe keyword,
//! then an HTML pass for anchors whose visible text is unsubscribe-like.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// Keyword alternation used inside URLs.
const URL_KEYWORDS: &str =
    r"(?:unsubscribe|opt[-_]?out|opt[-_]?un|cancel[^\s<>()]*?subscription|stop[^\s<>()]*?emails?)";

/// A bare URL or `www.` host whose text mentions an unsubscribe keyword.
static BARE_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"(?i)(?:https?://|www\.)[^\s"'<>()]*?{URL_KEYWORDS}[^\s"'<>()]*"#
    ))
    .expect("bare url pattern")
});

/// An `href`/`src` attribute whose value mentions an unsubscribe keyword.
static ATTR_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"(?i)(?:href|src)\s*=\s*["']?([^\s"'<>()]*?{URL_KEYWORDS}[^\s"'<>()]*)"#
    ))
    .expect("attribute url pattern")
});

/// Visible anchor text that marks an unsubscribe control.
const ANCHOR_KEYWORDS: &[&str] = &[
    "unsubscribe",
    "opt out",
    "opt-out",
    "optout",
    "cancel subscription",
    "stop email",
    "email preferences",
    "manage preferences",
    "remove me",
    "unsub",
    "no thanks",
    "decline",
    "quit",
    "turn off",
    "disable",
    "cancel",
];

/// Returns true if `text` reads like an unsubscribe control label.
pub fn is_unsubscribe_text(text: &str) -> bool {
    let text = text.to_lowercase();
    ANCHOR_KEYWORDS.iter().any(|k| text.contains(k))
}

/// Normalizes a candidate into an absolute http(s) URL.
///
/// Scheme-less hosts get an `https://` prefix. Returns `None` for anything
/// without a host or with another scheme.
pub fn normalize_url(candidate: &str) -> Option<Url> {
    let candidate = html_escape::decode_html_entities(candidate.trim());
    let candidate = candidate.trim_matches(|c| c == '"' || c == '\'');
    if candidate.is_empty() {
        return None;
    }

    let lower = candidate.to_ascii_lowercase();
    let absolute = if lower.starts_with("http://") || lower.starts_with("https://") {
        candidate.to_string()
    } else if lower.contains("://") || lower.starts_with("mailto:") || lower.starts_with("//") {
        return None;
    } else {
        format!("https://{candidate}")
    };

    let url = Url::parse(&absolute).ok()?;
    match (url.scheme(), url.host_str()) {
        ("http" | "https", Some(host)) if host.contains('.') || host == "localhost" => Some(url),
        _ => None,
    }
}

/// Finds candidate unsubscribe URLs in a message body, in discovery order.
pub fn discover_links(body: &str) -> Vec<Url> {
    let mut raw: Vec<String> = Vec::new();

    raw.extend(BARE_URL_RE.find_iter(body).map(|m| m.as_str().to_string()));
    raw.extend(
        ATTR_URL_RE
            .captures_iter(body)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
    );
    raw.extend(anchor_links(body));

    let mut seen = std::collections::HashSet::new();
    raw.iter()
        .filter_map(|candidate| normalize_url(candidate))
        .filter(|url| seen.insert(url.as_str().to_string()))
        .collect()
}

fn anchor_links(body: &str) -> Vec<String> {
    let Ok(anchors) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let document = Html::parse_document(body);
    document
        .select(&anchors)
        .filter(|a| is_unsubscribe_text(&a.text().collect::<String>()))
        .filter_map(|a| a.value().attr("href").map(str::to_string))
        .collect()
}
