use std::sync::Arc;

/// One message as accepted at the end of DATA.
///
/// Built once per transaction and handed to a [`Processor`](crate::traits::Processor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Envelope sender; empty for the null reverse-path.
    pub sender: String,
    /// Envelope recipients in the order they were accepted. Not deduplicated.
    pub recipients: Vec<String>,
    /// The raw payload, dot-unstuffed, without the terminating `.` line.
    pub data: Arc<[u8]>,
}

impl InboundMessage {
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
