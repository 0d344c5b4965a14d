//! Answer formatting.
//!
//! Backend answers carry a small markdown subset: `**bold**`, `*italic*` and
//! hard newlines. They are turned into an HTML fragment for display, and into
//! plain text for speech output.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("Invalid bold regex"));
static ITALIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*(.*?)\*").expect("Invalid italic regex"));
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*?\]\(.*?\)").expect("Invalid link regex"));
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("Invalid tag regex"));

/// How untrusted answer text is treated before emphasis conversion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizePolicy {
    /// Escape HTML metacharacters so only the generated tags are markup.
    #[default]
    Escape,
    /// Pass the answer through untouched. Only for a trusted backend.
    Passthrough,
}

/// Escape the five HTML metacharacters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Convert an answer to an HTML fragment.
///
/// `**x**` becomes `<strong>x</strong>`, then `*x*` becomes `<em>x</em>`,
/// then every newline becomes `<br>`. All other characters are kept.
pub fn render_answer(text: &str, policy: SanitizePolicy) -> String {
    let base = match policy {
        SanitizePolicy::Escape => escape_html(text),
        SanitizePolicy::Passthrough => text.to_string(),
    };
    let bolded = BOLD_RE.replace_all(&base, "<strong>$1</strong>");
    let emphasised = ITALIC_RE.replace_all(&bolded, "<em>$1</em>");
    emphasised.replace('\n', "<br>")
}

/// Strip formatting so a reply can be read aloud.
pub fn speakable_text(text: &str) -> String {
    let text = text.replace("**", "").replace('*', "");
    let text = LINK_RE.replace_all(&text, "");
    let text = TAG_RE.replace_all(&text, "");
    text.replace('\n', " ")
}
