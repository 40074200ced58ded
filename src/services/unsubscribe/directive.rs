//! Model-suggested unsubscribe actions.
//!
//! The model's answer is untrusted text. Only the three shapes below are
//! accepted; anything else fails the candidate.

use std::fmt;

/// Page content beyond this many characters is not sent to the model.
const MAX_PAGE_CHARS: usize = 20_000;

/// An action the model told us to take on an unsubscribe page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Click the element matching this CSS selector.
    Click(String),
    /// Submit the form matching (or enclosing) this CSS selector.
    Form(String),
    /// The page already confirms the unsubscription.
    Confirmed,
}

impl Directive {
    /// Parses the first non-blank line of a model reply.
    ///
    /// Keywords are case-insensitive and a selector must be non-empty.
    /// Returns `None` for anything outside the closed set.
    pub fn parse(reply: &str) -> Option<Self> {
        let line = reply
            .lines()
            .map(|l| l.trim().trim_matches('`').trim())
            .find(|l| !l.is_empty())?;

        if line.eq_ignore_ascii_case("CONFIRMED") {
            return Some(Self::Confirmed);
        }

        let (keyword, selector) = line.split_once(':')?;
        let selector = selector.trim().trim_matches('"').trim();
        if selector.is_empty() {
            return None;
        }

        match keyword.trim().to_ascii_uppercase().as_str() {
            "CLICK" => Some(Self::Click(selector.to_string())),
            "FORM" => Some(Self::Form(selector.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Click(selector) => write!(f, "CLICK:{selector}"),
            Self::Form(selector) => write!(f, "FORM:{selector}"),
            Self::Confirmed => f.write_str("CONFIRMED"),
        }
    }
}

/// Builds the prompt asking the model how to unsubscribe on a page.
pub fn directive_prompt(page_url: &str, page: &str) -> String {
    let content = match page.char_indices().nth(MAX_PAGE_CHARS) {
        Some((cut, _)) => &page[..cut],
        None => page,
    };

    format!(
        "Analyze this unsubscribe page and provide the most likely way to unsubscribe.\n\n\
         Page URL: {page_url}\n\n\
         Page Content:\n{content}\n\n\
         Please respond with only the action to take in the format \"CLICK:selector\" or \
         \"FORM:submit_button_selector\" where selector is a CSS selector that would identify \
         the unsubscribe element. If the page already confirms unsubscription, respond with \
         \"CONFIRMED\"."
    )
}
