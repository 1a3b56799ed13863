//! Post-generation cleanup and displayable error fragments.
//!
//! Reports are embedded directly into clinical documents, so anything the
//! orchestrator returns must already be safe to drop into HTML.

use std::sync::LazyLock;

use regex::Regex;

use super::NarrativeError;

/// Recognizable marker at the start of every error fragment.
pub const ERROR_LABEL: &str = "<b>AI report unavailable:</b>";

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z]*").expect("valid regex"));
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));

/// Strip code fences, HTML comments and stray asterisks, then trim.
pub fn sanitize_report(raw: &str) -> String {
    let text = FENCE_RE.replace_all(raw.trim(), "");
    let text = COMMENT_RE.replace_all(&text, "");
    text.replace('*', "").trim().to_string()
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Labeled fragment for a routine failure described in plain words.
pub fn error_fragment(message: &str) -> String {
    format!("{ERROR_LABEL}<br>{}", escape_html(message))
}

/// Labeled fragment carrying a provider error verbatim.
pub fn provider_error_fragment(error: &NarrativeError) -> String {
    format!("{ERROR_LABEL}<br><pre>{}</pre>", escape_html(&error.to_string()))
}

/// Labeled fragment for a response withheld by the provider's safety filter.
pub fn blocked_fragment(reason: Option<&str>) -> String {
    let message = match reason {
        Some(reason) => format!(
            "The request was blocked by the provider's safety filter ('{reason}'). \
             This can be a false positive caused by the clinical nature of the images. \
             Try different images if the problem persists."
        ),
        None => "The AI produced no response. The request may have been blocked by the \
                 provider's safety filter."
            .to_string(),
    };
    error_fragment(&message)
}

pub fn is_error_fragment(text: &str) -> bool {
    text.starts_with(ERROR_LABEL)
}
