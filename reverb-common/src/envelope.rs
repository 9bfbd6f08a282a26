use std::sync::Arc;

use crate::{address::Mailbox, message::InboundMessage};

/// The transaction record for one inbound connection.
///
/// Owned by exactly one session. Starting a new transaction (MAIL, RSET, or
/// the end of DATA) swaps in a fresh record instead of clearing this one.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// `None` is the null reverse-path `<>`.
    sender: Option<Mailbox>,
    recipients: Vec<Mailbox>,
}

impl Envelope {
    /// A fresh record for a transaction opened by `MAIL FROM`.
    #[must_use]
    pub const fn with_sender(sender: Option<Mailbox>) -> Self {
        Self {
            sender,
            recipients: Vec::new(),
        }
    }

    #[inline]
    pub const fn sender(&self) -> Option<&Mailbox> {
        self.sender.as_ref()
    }

    #[inline]
    pub fn recipients(&self) -> &[Mailbox] {
        &self.recipients
    }

    pub fn add_recipient(&mut self, recipient: Mailbox) {
        self.recipients.push(recipient);
    }

    /// Consumes the record, pairing it with the payload read during DATA.
    #[must_use]
    pub fn into_message(self, data: impl Into<Arc<[u8]>>) -> InboundMessage {
        InboundMessage {
            sender: self.sender.map(|s| s.to_string()).unwrap_or_default(),
            recipients: self.recipients.iter().map(ToString::to_string).collect(),
            data: data.into(),
        }
    }
}
