//! Speech markup helpers used by the response builder.
//!
//! Output speech always travels inside a single `<speak>` envelope. Cards
//! render as plain text, so their fields get every tag removed.

use regex::Regex;
use std::sync::OnceLock;

const OPEN: &str = "<speak>";
const CLOSE: &str = "</speak>";

#[allow(clippy::expect_used)]
fn speak_tags() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</?speak\s*/?>").expect("static pattern"))
}

#[allow(clippy::expect_used)]
fn markup_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"</?[A-Za-z][^<>]*>").expect("static pattern"))
}

/// Remove `<speak>` wrappers, keeping inner markup.
pub fn unwrap(markup: &str) -> String {
    speak_tags().replace_all(markup, "").into_owned()
}

/// Wrap `text` in one `<speak>` pair, dropping any wrappers it already has.
pub fn wrap(text: &str) -> String {
    format!("{OPEN}{}{CLOSE}", unwrap(text))
}

/// Append `text` to already-wrapped `current` and re-wrap the result.
pub fn append(current: Option<&str>, text: &str) -> String {
    let mut body = current.map(unwrap).unwrap_or_default();
    body.push_str(&unwrap(text));
    format!("{OPEN}{body}{CLOSE}")
}

/// Strip markup tags. A removed tag that sat between two words leaves one
/// space; all other text, line breaks included, is kept as written.
pub fn cleanse(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for tag in markup_tag().find_iter(text) {
        out.push_str(&text[last..tag.start()]);
        let before = out.chars().next_back();
        let after = text[tag.end()..].chars().next();
        let between_words = before.is_some_and(|c| !c.is_whitespace())
            && after.is_some_and(|c| !c.is_whitespace());
        if between_words {
            out.push(' ');
        }
        last = tag.end();
    }
    out.push_str(&text[last..]);
    out.trim().to_string()
}
