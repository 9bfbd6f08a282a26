//! Who a reply goes to.
//!
//! The envelope sender wins, then Reply-To, then From. Each candidate must
//! reduce to a single `local@domain`.

use mailparse::{MailAddr, SingleInfo};
use reverb_common::address::parse_mailbox;

use crate::decode::DecodedMessage;

/// A single address that also passes the RFC 5321 mailbox grammar.
fn strict(candidate: &str) -> Option<String> {
    match mailparse::addrparse(candidate).ok()?.as_slice() {
        [MailAddr::Single(SingleInfo { addr, .. })] if parse_mailbox(addr).is_ok() => {
            Some(addr.clone())
        }
        _ => None,
    }
}

/// Exactly one `@` and no whitespace. Either side may be empty; delivery
/// rejects those when it derives the domain.
fn lenient(candidate: &str) -> Option<String> {
    (candidate.matches('@').count() == 1 && !candidate.chars().any(char::is_whitespace))
        .then(|| candidate.to_string())
}

/// The envelope sender, without surrounding brackets, if it is usable.
pub fn normalize_sender(sender: &str) -> Option<String> {
    let trimmed = sender.trim();
    let trimmed = trimmed.strip_prefix('<').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix('>').unwrap_or(trimmed);

    if trimmed.is_empty() {
        None
    } else {
        strict(trimmed).or_else(|| lenient(trimmed))
    }
}

/// First syntactically valid address in an address-list header. Group
/// members count.
fn first_in_header(message: &DecodedMessage, name: &str) -> Option<String> {
    let list = mailparse::addrparse(message.raw_header(name)?).ok()?;

    list.iter()
        .flat_map(|entry| match entry {
            MailAddr::Single(single) => vec![single],
            MailAddr::Group(group) => group.addrs.iter().collect(),
        })
        .find_map(|single| strict(&single.addr))
}

pub fn select_recipient(sender: &str, message: &DecodedMessage) -> Option<String> {
    normalize_sender(sender)
        .or_else(|| first_in_header(message, "Reply-To"))
        .or_else(|| first_in_header(message, "From"))
}
