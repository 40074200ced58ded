//! Message body decoding.
//!
//! Remote messages arrive as a tree of MIME parts whose payloads are
//! base64url-encoded. [`decode_body`] turns that tree into one canonical
//! HTML string:
//!
//! 1. A single-part `text/html` message is decoded as-is.
//! 2. In a multipart message the first `text/html` part found in document
//!    order wins, looking through nested multiparts too.
//! 3. Failing that, the first `text/plain` part is converted with
//!    [`text_to_html`].
//! 4. Failing that, the root payload, the first direct `text/plain` part,
//!    or the first direct part carrying any data is decoded verbatim.
//! 5. Otherwise the body is empty.
//!
//! A part that fails to decode does not fail the message; it is skipped and
//! recorded in [`DecodedBody::degraded`].

use base64::engine::{self, DecodePaddingMode, GeneralPurposeConfig};
use base64::{alphabet, Engine as _};

/// Gmail pads some payloads and not others.
const URL_SAFE_LENIENT: engine::GeneralPurpose = engine::GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const TEXT_HTML: &str = "text/html";
const TEXT_PLAIN: &str = "text/plain";

/// Provider-neutral MIME part.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MimePart {
    pub mime_type: String,
    /// Encoded payload, if the part carries one inline.
    pub data: Option<String>,
    pub parts: Vec<MimePart>,
}

impl MimePart {
    pub fn leaf(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: Some(data.into()),
            parts: Vec::new(),
        }
    }

    pub fn multipart(mime_type: impl Into<String>, parts: Vec<MimePart>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: None,
            parts,
        }
    }

    fn is(&self, mime: &str) -> bool {
        self.mime_type.eq_ignore_ascii_case(mime)
    }

    fn payload(&self) -> Option<&str> {
        self.data.as_deref().filter(|d| !d.is_empty())
    }
}

/// Decoded body plus a record of anything that could not be decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedBody {
    pub html: String,
    /// One entry per part that failed to decode.
    pub degraded: Vec<String>,
}

impl DecodedBody {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

/// Decodes a base64url payload into text. Invalid UTF-8 is replaced, not
/// rejected.
pub fn decode_data(data: &str) -> Result<String, base64::DecodeError> {
    let bytes = URL_SAFE_LENIENT.decode(data.trim())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Decodes a message body tree into canonical HTML.
pub fn decode_body(root: &MimePart) -> DecodedBody {
    let mut degraded = Vec::new();

    if root.parts.is_empty() {
        if root.is(TEXT_HTML) {
            if let Some(data) = root.payload() {
                match decode_data(data) {
                    Ok(html) => return DecodedBody { html, degraded },
                    Err(e) => degraded.push(format!("{TEXT_HTML}: {e}")),
                }
            }
        }
    } else {
        let mut found = Found::default();
        collect(&root.parts, &mut found, &mut degraded);

        if let Some(html) = found.html {
            return DecodedBody { html, degraded };
        }
        if let Some(text) = found.text {
            return DecodedBody {
                html: text_to_html(&text),
                degraded,
            };
        }
    }

    let html = fallback_text(root, &mut degraded).unwrap_or_default();
    DecodedBody { html, degraded }
}

#[derive(Default)]
struct Found {
    html: Option<String>,
    text: Option<String>,
}

fn collect(parts: &[MimePart], found: &mut Found, degraded: &mut Vec<String>) {
    for part in parts {
        if found.html.is_some() {
            return;
        }

        if let (true, Some(data)) = (part.is(TEXT_HTML), part.payload()) {
            match decode_data(data) {
                Ok(html) => found.html = Some(html),
                Err(e) => degraded.push(format!("{TEXT_HTML}: {e}")),
            }
        } else if let (true, Some(data)) = (part.is(TEXT_PLAIN), part.payload()) {
            if found.text.is_none() {
                match decode_data(data) {
                    Ok(text) => found.text = Some(text),
                    Err(e) => degraded.push(format!("{TEXT_PLAIN}: {e}")),
                }
            }
        } else if !part.parts.is_empty() {
            collect(&part.parts, found, degraded);
        }
    }
}

/// Last resort: root payload, first direct plain part, first direct part
/// with any data.
fn fallback_text(root: &MimePart, degraded: &mut Vec<String>) -> Option<String> {
    let candidates = root
        .payload()
        .into_iter()
        .chain(
            root.parts
                .iter()
                .filter(|p| p.is(TEXT_PLAIN))
                .filter_map(MimePart::payload)
                .take(1),
        )
        .chain(root.parts.iter().filter_map(MimePart::payload).take(1));

    for data in candidates {
        match decode_data(data) {
            Ok(text) => return Some(text),
            Err(e) => degraded.push(format!("fallback: {e}")),
        }
    }
    None
}

/// Converts plain text into paragraph HTML.
///
/// Each non-empty trimmed line becomes an escaped `<p>`; a blank line that
/// is neither first nor last becomes a `<p>&nbsp;</p>` spacer.
pub fn text_to_html(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let last = lines.len().saturating_sub(1);
    let mut html = String::with_capacity(text.len() + lines.len() * 7);

    for (i, line) in lines.iter().enumerate() {
        let line = line.trim();
        if !line.is_empty() {
            html.push_str("<p>");
            html.push_str(&html_escape::encode_quoted_attribute(line));
            html.push_str("</p>");
        } else if i > 0 && i < last {
            html.push_str("<p>&nbsp;</p>");
        }
    }
    html
}
