//! RFC 5321 address parsing.
//!
//! Used for MAIL/RCPT paths on the inbound side and to decide whether a
//! candidate reply target is a usable `local@domain` mailbox.
//!
//! ```text
//! Reverse-path   = Path / "<>"
//! Forward-path   = Path
//! Path           = "<" [ A-d-l ":" ] Mailbox ">"
//! Mailbox        = Local-part "@" ( Domain / address-literal )
//! Local-part     = Dot-string / Quoted-string
//! Domain         = sub-domain *("." sub-domain)
//! sub-domain     = Let-dig [Ldh-str]
//! ```
//!
//! Size limits: path 256 octets, local-part 64, domain 255.

use std::net::{Ipv4Addr, Ipv6Addr};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AddressError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("Empty address")]
    Empty,
    #[error("Path exceeds 256 octets")]
    PathTooLong,
    #[error("Local-part exceeds 64 octets")]
    LocalPartTooLong,
    #[error("Domain exceeds 255 octets")]
    DomainTooLong,
    #[error("Missing opening angle bracket '<'")]
    MissingOpenBracket,
    #[error("Missing closing angle bracket '>'")]
    MissingCloseBracket,
    #[error("Missing '@' separator in mailbox")]
    MissingAtSign,
    #[error("Invalid local-part: {0}")]
    InvalidLocalPart(String),
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),
    #[error("Invalid address literal: {0}")]
    InvalidAddressLiteral(String),
    #[error("Unclosed quoted string in local-part")]
    UnclosedQuotedString,
    #[error("Invalid quoted string: {0}")]
    InvalidQuotedString(String),
}

/// A parsed `local-part@domain`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Mailbox {
    pub local_part: String,
    pub domain: String,
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

/// Parse a reverse-path (MAIL FROM argument). `<>` is the null sender.
///
/// A bare mailbox without angle brackets is tolerated, since plenty of
/// clients send one.
pub fn parse_reverse_path(input: &str) -> Result<Option<Mailbox>> {
    let trimmed = bounded(input)?;

    if trimmed == "<>" {
        return Ok(None);
    }

    parse_path_lenient(trimmed).map(Some)
}

/// Parse a forward-path (RCPT TO argument).
pub fn parse_forward_path(input: &str) -> Result<Mailbox> {
    parse_path_lenient(bounded(input)?)
}

/// Parse a bare `local-part@domain` with no surrounding brackets.
pub fn parse_mailbox(input: &str) -> Result<Mailbox> {
    let trimmed = bounded(input)?;
    mailbox(trimmed)
}

/// Checks `input` against the RFC 5321 `Domain` production.
pub fn validate_domain(input: &str) -> Result<()> {
    if input.len() > 255 {
        return Err(AddressError::DomainTooLong);
    }
    domain(input).map(|_| ())
}

fn bounded(input: &str) -> Result<&str> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(AddressError::Empty);
    }

    if trimmed.len() > 256 {
        return Err(AddressError::PathTooLong);
    }

    Ok(trimmed)
}

fn parse_path_lenient(input: &str) -> Result<Mailbox> {
    if input.starts_with('<') {
        path(input)
    } else if input.ends_with('>') {
        Err(AddressError::MissingOpenBracket)
    } else {
        mailbox(input)
    }
}

/// `<mailbox>` or `<source-route:mailbox>`. Source routes are accepted and dropped.
fn path(input: &str) -> Result<Mailbox> {
    let content = input
        .strip_prefix('<')
        .ok_or(AddressError::MissingOpenBracket)?
        .strip_suffix('>')
        .ok_or(AddressError::MissingCloseBracket)?;

    let mailbox_str =
        source_route_colon(content).map_or(content, |colon_pos| &content[colon_pos + 1..]);

    mailbox(mailbox_str)
}

fn source_route_colon(input: &str) -> Option<usize> {
    let mut in_brackets = false;
    let mut last_colon = None;

    for (i, ch) in input.char_indices() {
        match ch {
            '[' => in_brackets = true,
            ']' => in_brackets = false,
            ':' if !in_brackets => last_colon = Some(i),
            _ => {}
        }
    }

    last_colon
}

fn mailbox(input: &str) -> Result<Mailbox> {
    let at_pos = unquoted_at(input)?;

    let local_part = &input[..at_pos];
    let domain_part = &input[at_pos + 1..];

    if local_part.len() > 64 {
        return Err(AddressError::LocalPartTooLong);
    }
    if domain_part.len() > 255 {
        return Err(AddressError::DomainTooLong);
    }

    Ok(Mailbox {
        local_part: local(local_part)?,
        domain: if domain_part.starts_with('[') {
            address_literal(domain_part)?
        } else {
            domain(domain_part)?
        },
    })
}

/// Position of the '@' outside any quoted string or address literal.
fn unquoted_at(input: &str) -> Result<usize> {
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut escaped = false;

    for (i, ch) in input.char_indices() {
        match ch {
            '"' if !escaped && !in_brackets => in_quotes = !in_quotes,
            '[' if !in_quotes => in_brackets = true,
            ']' if !in_quotes => in_brackets = false,
            '@' if !in_quotes && !in_brackets => return Ok(i),
            _ => {}
        }

        escaped = ch == '\\' && !escaped;
    }

    Err(AddressError::MissingAtSign)
}

fn local(input: &str) -> Result<String> {
    if input.is_empty() {
        return Err(AddressError::InvalidLocalPart(
            "Empty local-part".to_string(),
        ));
    }

    if input.starts_with('"') {
        quoted_string(input)
    } else {
        dot_string(input)
    }
}

fn dot_string(input: &str) -> Result<String> {
    if input.starts_with('.') || input.ends_with('.') {
        return Err(AddressError::InvalidLocalPart(
            "Dot-string cannot start or end with '.'".to_string(),
        ));
    }

    if input.contains("..") {
        return Err(AddressError::InvalidLocalPart(
            "Dot-string cannot contain consecutive dots".to_string(),
        ));
    }

    if let Some(ch) = input.chars().find(|&ch| ch != '.' && !is_atext(ch)) {
        return Err(AddressError::InvalidLocalPart(format!(
            "Invalid character '{ch}' in atom"
        )));
    }

    Ok(input.to_string())
}

fn quoted_string(input: &str) -> Result<String> {
    if input.len() < 2 || !input.ends_with('"') {
        return Err(AddressError::UnclosedQuotedString);
    }

    let mut chars = input[1..input.len() - 1].chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(next) if next.is_ascii_graphic() || next == ' ' => {}
                Some(next) => {
                    return Err(AddressError::InvalidQuotedString(format!(
                        "Invalid quoted-pair: \\{next}"
                    )));
                }
                None => {
                    return Err(AddressError::InvalidQuotedString(
                        "Backslash at end of quoted string".to_string(),
                    ));
                }
            }
        } else if !is_qtext_smtp(ch) {
            return Err(AddressError::InvalidQuotedString(format!(
                "Invalid character '{ch}' in quoted string"
            )));
        }
    }

    Ok(input.to_string())
}

fn domain(input: &str) -> Result<String> {
    if input.is_empty() {
        return Err(AddressError::InvalidDomain("Empty domain".to_string()));
    }

    if input.starts_with('.') || input.ends_with('.') {
        return Err(AddressError::InvalidDomain(
            "Domain cannot start or end with '.'".to_string(),
        ));
    }

    for label in input.split('.') {
        subdomain(label)?;
    }

    Ok(input.to_string())
}

/// `Let-dig [Ldh-str]`
fn subdomain(input: &str) -> Result<()> {
    let (Some(first), Some(last)) = (input.chars().next(), input.chars().last()) else {
        return Err(AddressError::InvalidDomain("Empty subdomain".to_string()));
    };

    if !first.is_ascii_alphanumeric() {
        return Err(AddressError::InvalidDomain(format!(
            "Subdomain must start with letter or digit, got '{first}'"
        )));
    }

    if !last.is_ascii_alphanumeric() {
        return Err(AddressError::InvalidDomain(format!(
            "Subdomain must end with letter or digit, got '{last}'"
        )));
    }

    if let Some(ch) = input
        .chars()
        .find(|&ch| !ch.is_ascii_alphanumeric() && ch != '-')
    {
        return Err(AddressError::InvalidDomain(format!(
            "Invalid character '{ch}' in subdomain"
        )));
    }

    Ok(())
}

/// `[IPv4]`, `[IPv6:...]` or `[tag:value]`
fn address_literal(input: &str) -> Result<String> {
    let Some(content) = input.strip_prefix('[').and_then(|s| s.strip_suffix(']')) else {
        return Err(AddressError::InvalidAddressLiteral(
            "Address literal must be enclosed in brackets".to_string(),
        ));
    };

    if content.parse::<Ipv4Addr>().is_ok() {
        return Ok(input.to_string());
    }

    if let Some(ipv6) = content.strip_prefix("IPv6:")
        && ipv6.parse::<Ipv6Addr>().is_ok()
    {
        return Ok(input.to_string());
    }

    if let Some((tag, value)) = content.split_once(':')
        && !tag.is_empty()
        && !value.is_empty()
    {
        return Ok(input.to_string());
    }

    Err(AddressError::InvalidAddressLiteral(format!(
        "Invalid address literal format: {content}"
    )))
}

#[inline]
const fn is_atext(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '!' | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '-'
                | '/'
                | '='
                | '?'
                | '^'
                | '_'
                | '`'
                | '{'
                | '|'
                | '}'
                | '~'
        )
}

/// Printable ASCII except backslash and quote.
#[inline]
const fn is_qtext_smtp(ch: char) -> bool {
    matches!(ch as u32, 32..=33 | 35..=91 | 93..=126)
}
