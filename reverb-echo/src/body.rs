//! The text that goes back to the sender.

use std::{borrow::Cow, sync::LazyLock};

use regex::{Captures, Regex};

use crate::decode::{DecodedMessage, Disposition};

#[allow(clippy::expect_used)]
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"));

#[allow(clippy::expect_used)]
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#([0-9]{1,7})|#[xX]([0-9a-fA-F]{1,6})|(amp|lt|gt|quot|apos|nbsp));")
        .expect("entity pattern is valid")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyBody {
    pub plain: String,
    pub html: String,
}

impl ReplyBody {
    /// Collects inline text and HTML from `message`, with `raw` as the
    /// fallback when no part yields anything.
    ///
    /// `plain` is non-empty on return whenever the message had any text.
    pub fn extract(message: &DecodedMessage, raw: &[u8]) -> Self {
        let mut plain = Vec::new();
        let mut html = Vec::new();

        for part in &message.parts {
            if part.disposition == Disposition::Attachment || part.text.is_empty() {
                continue;
            }

            match part.content_type.as_deref() {
                None | Some("" | "text/plain") => plain.push(part.text.as_str()),
                Some("text/html") => html.push(part.text.as_str()),
                Some(_) => {}
            }
        }

        let mut body = Self {
            plain: plain.join("\n\n"),
            html: html.join("\n\n"),
        };

        if body.plain.is_empty() && body.html.is_empty() {
            let fallback = raw_body(raw);

            if message.content_type.as_deref() == Some("text/html") {
                body.plain = html_to_text(&fallback);
                body.html = fallback.into_owned();
            } else {
                body.plain = fallback.into_owned();
            }
        }

        if body.plain.is_empty() && !body.html.is_empty() {
            body.plain = html_to_text(&body.html);
        }

        body
    }
}

/// Everything after the first blank line.
pub fn raw_body(raw: &[u8]) -> Cow<'_, str> {
    let start = find(raw, b"\r\n\r\n")
        .map(|index| index + 4)
        .or_else(|| find(raw, b"\n\n").map(|index| index + 2));

    start.map_or(Cow::Borrowed(""), |start| String::from_utf8_lossy(&raw[start..]))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn entity(captures: &Captures<'_>) -> String {
    let decimal = captures.get(1).map(|m| (m.as_str(), 10));
    let hex = captures.get(2).map(|m| (m.as_str(), 16));

    if let Some((digits, radix)) = decimal.or(hex) {
        return u32::from_str_radix(digits, radix)
            .ok()
            .and_then(char::from_u32)
            .filter(|ch| *ch != '\0')
            .unwrap_or(char::REPLACEMENT_CHARACTER)
            .to_string();
    }

    match captures.get(3).map(|m| m.as_str()) {
        Some("amp") => "&",
        Some("lt") => "<",
        Some("gt") => ">",
        Some("quot") => "\"",
        Some("apos") => "'",
        Some("nbsp") => "\u{a0}",
        _ => "",
    }
    .to_string()
}

/// Tags become spaces, entities are decoded and whitespace is collapsed.
pub fn html_to_text(html: &str) -> String {
    let without_tags = TAG.replace_all(html, " ");
    let decoded = ENTITY.replace_all(&without_tags, entity);

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
