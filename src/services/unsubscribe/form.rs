//! Unsubscribe form model and field filling.

/// One `<input>` of a parsed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    /// Lowercased `type` attribute; `text` when absent.
    pub kind: String,
    pub value: Option<String>,
    pub checked: bool,
}

/// A form lifted out of a parsed page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageForm {
    /// Raw `action` attribute; empty means the page itself.
    pub action: String,
    /// Uppercased `method` attribute; `GET` when absent.
    pub method: String,
    pub fields: Vec<FormField>,
}

impl PageForm {
    pub fn is_post(&self) -> bool {
        self.method == "POST"
    }
}

/// Builds the submission for a form.
///
/// Submit controls are skipped. Checkboxes and radios are sent only when
/// already checked or when their name suggests confirmation. Other fields
/// keep their value, or get one inferred from their name.
pub fn fill_form(form: &PageForm) -> Vec<(String, String)> {
    form.fields
        .iter()
        .filter_map(|field| match field.kind.as_str() {
            "submit" | "button" => None,
            "checkbox" | "radio" => {
                let name = field.name.to_lowercase();
                (field.checked || name.contains("confirm") || name.contains("agree")).then(|| {
                    (
                        field.name.clone(),
                        field.value.clone().unwrap_or_else(|| "on".to_string()),
                    )
                })
            }
            _ => Some((
                field.name.clone(),
                field
                    .value
                    .clone()
                    .unwrap_or_else(|| infer_field_value(&field.name).to_string()),
            )),
        })
        .collect()
}

/// Guesses a value for an empty field from its name.
pub fn infer_field_value(name: &str) -> &'static str {
    let name = name.to_lowercase();
    match name.as_str() {
        "email" => "user@example.com",
        "confirm" => "on",
        "agreed" | "optout" | "unsubscribe" | "unsub" => "true",
        "accept" | "receive" | "marketing" | "newsletter" => "false",
        _ if name.contains("unsub") || name.contains("opt") || name.contains("cancel") => "true",
        _ => "",
    }
}
