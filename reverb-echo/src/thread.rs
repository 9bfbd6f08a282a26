use crate::decode::DecodedMessage;

/// Where a reply sits in its conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadMetadata {
    pub subject: String,
    /// Without angle brackets.
    pub message_id: Option<String>,
    /// Ends with `message_id` when there is one.
    pub references: Vec<String>,
}

impl ThreadMetadata {
    pub fn from_message(message: &DecodedMessage) -> Self {
        let subject = message.header("Subject").unwrap_or_default().to_string();

        let message_id = message
            .raw_header("Message-ID")
            .and_then(|value| message_ids(value).into_iter().next());

        let mut references = message
            .raw_header("References")
            .map(message_ids)
            .unwrap_or_default();

        if let Some(id) = &message_id
            && references.last() != Some(id)
        {
            references.push(id.clone());
        }

        Self {
            subject,
            message_id,
            references,
        }
    }

    /// The subject of a reply to this message.
    pub fn reply_subject(&self) -> String {
        let trimmed = self.subject.trim();

        if trimmed.is_empty() {
            "Re:".to_string()
        } else if trimmed
            .get(..3)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("re:"))
        {
            trimmed.to_string()
        } else {
            format!("Re: {trimmed}")
        }
    }
}

/// Identifiers in a Message-ID style header; empty when unparseable.
fn message_ids(value: &str) -> Vec<String> {
    mailparse::msgidparse(value)
        .map(|ids| {
            ids.iter()
                .filter(|id| !id.is_empty())
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}
