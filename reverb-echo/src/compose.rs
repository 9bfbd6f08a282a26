//! Assembles the reply with `mail-builder`.

use mail_builder::{
    MessageBuilder,
    headers::{address::Address, date::Date},
};
use mailparse::{MailAddr, SingleInfo};
use reverb_common::address::validate_domain;
use thiserror::Error;
use ulid::Ulid;

use crate::{
    ReplierIdentity,
    body::{ReplyBody, html_to_text},
    thread::ThreadMetadata,
};

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("invalid configured from_address: {0}")]
    FromAddress(String),

    #[error("invalid recipient address: {0}")]
    Recipient(String),

    #[error("write reply: {0}")]
    Write(#[from] std::io::Error),
}

fn single(value: &str) -> Option<SingleInfo> {
    match mailparse::addrparse(value).ok()?.as_slice() {
        [MailAddr::Single(info)] if !info.addr.is_empty() => Some(info.clone()),
        _ => None,
    }
}

/// Whether `value` is usable as the reply's From header.
pub fn is_single_address(value: &str) -> bool {
    single(value).is_some()
}

/// `<ulid>@<hostname>`, or `None` when `hostname` is not a domain.
fn message_id(hostname: &str) -> Option<String> {
    validate_domain(hostname)
        .ok()
        .map(|()| format!("{}@{hostname}", Ulid::new()))
}

/// Builds the reply as it will go on the wire, dated now.
///
/// # Errors
///
/// [`ComposeError`] if the configured from address or `recipient` do not
/// parse as a single address.
pub fn compose(
    identity: &ReplierIdentity,
    recipient: &str,
    thread: &ThreadMetadata,
    body: &ReplyBody,
) -> Result<Vec<u8>, ComposeError> {
    compose_at(identity, recipient, thread, body, chrono::Utc::now().timestamp())
}

pub(crate) fn compose_at(
    identity: &ReplierIdentity,
    recipient: &str,
    thread: &ThreadMetadata,
    body: &ReplyBody,
    timestamp: i64,
) -> Result<Vec<u8>, ComposeError> {
    let from = single(&identity.from_address)
        .ok_or_else(|| ComposeError::FromAddress(identity.from_address.clone()))?;
    // A leniently accepted sender goes out as-is; delivery judges its domain.
    let to = single(recipient).map_or_else(|| recipient.trim().to_string(), |info| info.addr);
    if to.is_empty() || to.chars().any(char::is_whitespace) {
        return Err(ComposeError::Recipient(recipient.to_string()));
    }

    let name = identity
        .from_name
        .clone()
        .or(from.display_name)
        .filter(|name| !name.is_empty());

    let mut builder = MessageBuilder::new()
        .date(Date::new(timestamp))
        .subject(thread.reply_subject())
        .from(Address::new_address(name, from.addr))
        .to(Address::new_address(None::<String>, to));

    if let Some(id) = &thread.message_id {
        builder = builder
            .in_reply_to(id.clone())
            .references(thread.references.clone());
    }

    if let Some(id) = message_id(&identity.hostname) {
        builder = builder.message_id(id);
    }

    builder = if body.html.is_empty() {
        let plain = if body.plain.is_empty() {
            "\n".to_string()
        } else {
            body.plain.clone()
        };
        builder.text_body(plain)
    } else {
        let plain = if body.plain.is_empty() {
            Some(html_to_text(&body.html))
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| "\n".to_string())
        } else {
            body.plain.clone()
        };
        builder.text_body(plain).html_body(body.html.clone())
    };

    Ok(builder.write_to_vec()?)
}
