//! Utility functions and helpers.

pub mod http;
pub mod log;

use std::sync::OnceLock;

use regex::Regex;

/// Make a string safe to use as a single path component.
///
/// Anything outside `[A-Za-z0-9._ -]` becomes `_`, leading dots are
/// replaced, and the result is never empty.
pub fn sanitize_component(raw: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars =
        UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._ \-]").expect("valid regex literal"));

    let cleaned = unsafe_chars.replace_all(raw.trim(), "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Percent-encode everything except `A-Za-z0-9*-._`.
///
/// Reversible, so distinct inputs never collide. The output is safe both
/// as a URL path segment or query value and as a file name.
pub fn encode_component(raw: &str) -> String {
    // form encoding writes spaces as '+' and a literal '+' as %2B
    url::form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Fill `{name}` placeholders in a URL template with encoded values.
pub fn fill_template(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{}}}", name), &encode_component(value))
    })
}
