//! Message formatting with ICU-style placeholders.
//!
//! Supports plain `{name}` substitution and `{count, number}` number
//! formatting. Anything fancier (plural, select, date skeletons) is not
//! implemented; when a message uses one of those, or a referenced parameter
//! is missing or the wrong type, formatting degrades to literal `{name}`
//! substitution and unmatched placeholders are left verbatim. Formatting
//! never fails the caller.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Named parameters supplied by the caller.
pub type Params = serde_json::Map<String, Value>;

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX.get_or_init(|| {
        Regex::new(r"\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*(?:,\s*([^{}]*?)\s*)?\}")
            .expect("placeholder regex is valid")
    })
}

/// Extract the ordered, deduplicated set of placeholder identifiers from a
/// message, ignoring any ICU type suffix (`{count, number}` yields `count`).
pub fn extract_placeholders(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for caps in placeholder_regex().captures_iter(text) {
        if let Some(name) = caps.get(1) {
            let name = name.as_str().to_string();
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
    }
    seen
}

/// Format a message with the given parameters.
pub fn format_message(text: &str, params: &Params) -> String {
    match try_format(text, params) {
        Ok(formatted) => formatted,
        Err(_) => literal_substitute(text, params),
    }
}

enum FormatError {
    MissingParam,
    TypeMismatch,
    Unsupported,
}

fn try_format(text: &str, params: &Params) -> Result<String, FormatError> {
    let regex = placeholder_regex();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in regex.captures_iter(text) {
        let Some(full) = caps.get(0) else { continue };
        let Some(name) = caps.get(1) else { continue };
        out.push_str(&text[last..full.start()]);
        last = full.end();

        let value = params.get(name.as_str()).ok_or(FormatError::MissingParam)?;
        let kind = caps
            .get(2)
            .map(|g| g.as_str())
            .and_then(|spec| spec.split(',').next())
            .map(str::trim);

        match kind {
            None | Some("") => out.push_str(&value_to_display(value)),
            Some("number") => match value {
                Value::Number(n) => out.push_str(&format_number(n)),
                _ => return Err(FormatError::TypeMismatch),
            },
            Some(_) => return Err(FormatError::Unsupported),
        }
    }

    out.push_str(&text[last..]);
    Ok(out)
}

/// Replace each `{name}` occurrence with the corresponding parameter value,
/// leaving anything unmatched in place.
fn literal_substitute(text: &str, params: &Params) -> String {
    let mut out = text.to_string();
    for (name, value) in params {
        out = out.replace(&format!("{{{name}}}"), &value_to_display(value));
    }
    out
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Format a number with thousands separators on the integer part.
fn format_number(n: &serde_json::Number) -> String {
    let raw = n.to_string();
    let (sign, rest) = raw.strip_prefix('-').map_or(("", raw.as_str()), |r| ("-", r));
    let (int_part, frac_part) = match rest.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (rest, None),
    };

    let mut grouped = String::new();
    let digits: Vec<char> = int_part.chars().collect();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }

    match frac_part {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}
