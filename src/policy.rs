//! Redaction and truncation policy
//!
//! Pure functions applied once, while an event is being built.

use std::collections::HashMap;

/// Header names that never leave the process, compared case-insensitively
pub const SENSITIVE_HEADERS: [&str; 6] = [
    "authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "x-auth-token",
    "proxy-authorization",
];

/// Appended to bodies cut at the size budget
pub const TRUNCATION_MARKER: &str = "... [TRUNCATED]";

/// Whether a header name is on the denylist
pub fn is_sensitive_header(name: &str) -> bool {
    SENSITIVE_HEADERS
        .iter()
        .any(|sensitive| sensitive.eq_ignore_ascii_case(name))
}

/// Join multi-valued headers with `", "` and drop sensitive names
///
/// Returns an empty map when `include` is false. Names keep the casing they
/// arrived with; repeated names are grouped by exact spelling.
pub fn filter_headers<K, V>(
    headers: impl IntoIterator<Item = (K, V)>,
    include: bool,
) -> HashMap<String, String>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut filtered: HashMap<String, String> = HashMap::new();
    if !include {
        return filtered;
    }

    for (name, value) in headers {
        let name = name.as_ref();
        if is_sensitive_header(name) {
            continue;
        }
        filtered
            .entry(name.to_string())
            .and_modify(|joined| {
                joined.push_str(", ");
                joined.push_str(value.as_ref());
            })
            .or_insert_with(|| value.as_ref().to_string());
    }

    filtered
}

/// Bound a body to `max_size` characters
///
/// Oversized bodies keep their first `max_size` characters followed by
/// [`TRUNCATION_MARKER`]. Counting characters keeps the cut on a UTF-8
/// boundary.
pub fn truncate_body(body: Option<&str>, max_size: usize, include: bool) -> Option<String> {
    if !include {
        return None;
    }
    let body = body?;

    match body.char_indices().nth(max_size) {
        Some((cut, _)) => {
            let mut truncated = String::with_capacity(cut + TRUNCATION_MARKER.len());
            truncated.push_str(&body[..cut]);
            truncated.push_str(TRUNCATION_MARKER);
            Some(truncated)
        }
        None => Some(body.to_string()),
    }
}

/// Whether a body with this content type is worth buffering as text
///
/// Binary payloads and bodies without a content type are never captured.
pub fn is_text_content_type(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return false;
    };
    let content_type = content_type.to_ascii_lowercase();

    content_type.starts_with("text/")
        || content_type.contains("json")
        || content_type.contains("xml")
        || content_type.contains("x-www-form-urlencoded")
        || content_type.contains("graphql")
}
