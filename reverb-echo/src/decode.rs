//! Raw payload to headers plus the leaf parts of the MIME tree.

use mailparse::{DispositionType, MailHeader, MailHeaderMap, MailParseError, ParsedMail};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("parse inbound message: {0}")]
    Message(#[source] MailParseError),

    #[error("read message part {index}: {source}")]
    Part {
        index: usize,
        #[source]
        source: MailParseError,
    },
}

/// One header as it appeared, plus its RFC 2047 decoded value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
    pub raw: String,
}

impl From<&MailHeader<'_>> for HeaderField {
    fn from(header: &MailHeader<'_>) -> Self {
        Self {
            name: header.get_key(),
            value: header.get_value(),
            raw: String::from_utf8_lossy(header.get_value_raw()).into_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
}

/// A leaf of the MIME tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyPart {
    pub headers: Vec<HeaderField>,
    pub disposition: Disposition,
    /// `type/subtype`, lowercased. `None` when the part carries no
    /// Content-Type header.
    pub content_type: Option<String>,
    /// Transfer and charset decoded. Left empty for attachments, which are
    /// never decoded.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub headers: Vec<HeaderField>,
    /// Declared type of the top-level entity.
    pub content_type: Option<String>,
    /// Leaves in depth-first order. Multipart containers never appear here.
    pub parts: Vec<BodyPart>,
}

impl DecodedMessage {
    fn field(&self, name: &str) -> Option<&HeaderField> {
        self.headers
            .iter()
            .find(|header| header.name.eq_ignore_ascii_case(name))
    }

    /// First header called `name`, decoded.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.field(name).map(|header| header.value.as_str())
    }

    /// First header called `name`, as written on the wire.
    pub fn raw_header(&self, name: &str) -> Option<&str> {
        self.field(name).map(|header| header.raw.as_str())
    }
}

fn declared_type(parsed: &ParsedMail<'_>) -> Option<String> {
    parsed
        .headers
        .get_first_header("Content-Type")
        .map(|_| parsed.ctype.mimetype.to_ascii_lowercase())
}

fn collect_leaves(parsed: &ParsedMail<'_>, parts: &mut Vec<BodyPart>) -> Result<(), DecodeError> {
    if !parsed.subparts.is_empty() {
        for subpart in &parsed.subparts {
            collect_leaves(subpart, parts)?;
        }
        return Ok(());
    }

    // A multipart entity with no parts is still a container.
    if parsed.ctype.mimetype.starts_with("multipart/") {
        return Ok(());
    }

    let disposition = match parsed.get_content_disposition().disposition {
        DispositionType::Attachment => Disposition::Attachment,
        _ => Disposition::Inline,
    };

    let text = match disposition {
        Disposition::Attachment => String::new(),
        Disposition::Inline => parsed.get_body().map_err(|source| DecodeError::Part {
            index: parts.len(),
            source,
        })?,
    };

    parts.push(BodyPart {
        headers: parsed.headers.iter().map(HeaderField::from).collect(),
        disposition,
        content_type: declared_type(parsed),
        text,
    });

    Ok(())
}

/// # Errors
///
/// [`DecodeError`] if the payload is not a parseable message or an inline
/// part's body cannot be decoded.
pub fn decode(raw: &[u8]) -> Result<DecodedMessage, DecodeError> {
    let parsed = mailparse::parse_mail(raw).map_err(DecodeError::Message)?;

    let mut parts = Vec::new();
    collect_leaves(&parsed, &mut parts)?;

    Ok(DecodedMessage {
        headers: parsed.headers.iter().map(HeaderField::from).collect(),
        content_type: declared_type(&parsed),
        parts,
    })
}
