//! Filter-call syntax adapter
//!
//! Inventories written for other Jinja dialects pass filter arguments with a
//! colon (`{{ name | default:"web" }}`). MiniJinja only understands the call
//! form (`{{ name | default("web") }}`), so colon arguments inside template
//! tags are rewritten. Call-form filters and text outside tags are untouched.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{\{.*?\}\}|\{%.*?%\}").expect("valid regex"));

static COLON_FILTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\|\s*(\w+)\s*:\s*("(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|-?[\w.]+)"#,
    )
    .expect("valid regex")
});

/// Rewrite colon-argument filters into call form
pub fn adapt_filter_syntax(template: &str) -> Cow<'_, str> {
    if !template.contains(':') {
        return Cow::Borrowed(template);
    }
    TAG_RE.replace_all(template, |tag: &Captures| {
        COLON_FILTER_RE
            .replace_all(&tag[0], "| ${1}(${2})")
            .into_owned()
    })
}
