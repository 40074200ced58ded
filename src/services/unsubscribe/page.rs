//! HTML inspection of fetched unsubscribe pages.
//!
//! Parsed documents never leave these functions; callers get owned
//! [`PageAction`]s back.

use scraper::{ElementRef, Html, Selector};

use super::form::{FormField, PageForm};

/// What to do with a fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAction {
    SubmitForm(PageForm),
    /// Raw `href`, to be resolved against the page URL.
    FollowLink(String),
}

/// Words that mark a submit control as the unsubscribe one.
const CONTROL_KEYWORDS: &[&str] = &["unsub", "cancel", "opt"];

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn contains_keyword(text: &str) -> bool {
    let text = text.to_lowercase();
    CONTROL_KEYWORDS.iter().any(|k| text.contains(k))
}

fn parse_form(form: ElementRef<'_>) -> PageForm {
    let method = form
        .value()
        .attr("method")
        .map(|m| m.trim().to_uppercase())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "GET".to_string());

    let fields = selector("input")
        .map(|inputs| {
            form.select(&inputs)
                .filter_map(|input| {
                    let el = input.value();
                    let name = el.attr("name")?;
                    Some(FormField {
                        name: name.to_string(),
                        kind: el.attr("type").unwrap_or("text").to_lowercase(),
                        value: el.attr("value").map(str::to_string),
                        checked: el.attr("checked").is_some(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    PageForm {
        action: form.value().attr("action").unwrap_or("").trim().to_string(),
        method,
        fields,
    }
}

/// Nearest enclosing form, the element itself included.
fn closest_form(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    if element.value().name() == "form" {
        return Some(element);
    }
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "form")
}

fn as_link(element: ElementRef<'_>) -> Option<PageAction> {
    (element.value().name() == "a")
        .then(|| element.value().attr("href"))
        .flatten()
        .map(|href| PageAction::FollowLink(href.to_string()))
}

/// Decides what to do with a page without asking the model.
///
/// The first form on the page wins. Otherwise an unsubscribe-labelled
/// submit button (submitting its form) or anchor (followed) is used.
pub fn analyze(html: &str) -> Option<PageAction> {
    let document = Html::parse_document(html);

    if let Some(form) = selector("form").and_then(|s| document.select(&s).next()) {
        return Some(PageAction::SubmitForm(parse_form(form)));
    }

    let inputs = selector("input")?;
    let buttons = selector("button")?;
    let anchors = selector("a[href]")?;

    let labelled_inputs = document.select(&inputs).filter(|e| {
        e.value()
            .attr("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("submit"))
            && contains_keyword(e.value().attr("value").unwrap_or(""))
    });
    let labelled_buttons = document.select(&buttons).filter(|e| {
        contains_keyword(e.value().attr("value").unwrap_or(""))
            || contains_keyword(&e.text().collect::<String>())
    });

    if let Some(form) = labelled_inputs.chain(labelled_buttons).find_map(closest_form) {
        return Some(PageAction::SubmitForm(parse_form(form)));
    }

    document
        .select(&anchors)
        .find(|a| {
            a.text()
                .collect::<String>()
                .to_lowercase()
                .contains("unsubscribe")
        })
        .and_then(as_link)
}

/// Resolves a model-suggested CSS selector to an action.
///
/// With `prefer_link`, a matched anchor is followed; otherwise (or when the
/// match is not an anchor) the nearest enclosing form is submitted.
/// `Err` carries a selector parse error; `Ok(None)` means nothing actionable
/// matched.
pub fn select_target(
    html: &str,
    css: &str,
    prefer_link: bool,
) -> Result<Option<PageAction>, String> {
    let selector = Selector::parse(css).map_err(|e| format!("invalid selector {css:?}: {e}"))?;
    let document = Html::parse_document(html);

    let Some(element) = document.select(&selector).next() else {
        return Ok(None);
    };

    if prefer_link {
        if let Some(link) = as_link(element) {
            return Ok(Some(link));
        }
    }

    Ok(closest_form(element).map(|form| PageAction::SubmitForm(parse_form(form))))
}
