use std::sync::Arc;

use async_trait::async_trait;
use reverb_common::{CancelScope, InboundMessage, internal, traits::Processor};
use reverb_delivery::Deliver;
use tracing::info;

use crate::{
    EchoError, ReplierIdentity,
    body::ReplyBody,
    compose::compose,
    decode::decode,
    dkim::Signer,
    recipient::select_recipient,
    thread::ThreadMetadata,
};

/// Turns each inbound message into a reply and sends it back.
pub struct Replier<D> {
    identity: Arc<ReplierIdentity>,
    signer: Option<Arc<Signer>>,
    delivery: D,
}

impl<D: Deliver> Replier<D> {
    pub fn new(identity: ReplierIdentity, delivery: D) -> Self {
        Self {
            identity: Arc::new(identity),
            signer: None,
            delivery,
        }
    }

    /// Signs every reply with `signer`. Without one, replies go out unsigned.
    #[must_use]
    pub fn with_signer(mut self, signer: Signer) -> Self {
        self.signer = Some(Arc::new(signer));
        self
    }

    pub fn identity(&self) -> &ReplierIdentity {
        &self.identity
    }

    /// The recipient and the bytes to send, signed when a signer is set.
    ///
    /// # Errors
    ///
    /// Whichever step failed first. Nothing is sent.
    pub fn build_reply(&self, message: &InboundMessage) -> Result<(String, Vec<u8>), EchoError> {
        let decoded = decode(&message.data)?;

        let recipient =
            select_recipient(&message.sender, &decoded).ok_or(EchoError::NoRecipient)?;
        let thread = ThreadMetadata::from_message(&decoded);
        let body = ReplyBody::extract(&decoded, &message.data);

        let reply = compose(&self.identity, &recipient, &thread, &body)?;

        let reply = match &self.signer {
            Some(signer) => signer.sign(&reply)?,
            None => reply,
        };

        Ok((recipient, reply))
    }
}

#[async_trait]
impl<D: Deliver> Processor for Replier<D> {
    type Error = EchoError;

    #[tracing::instrument(level = tracing::Level::DEBUG, skip_all, fields(sender = %message.sender))]
    async fn echo(&self, message: InboundMessage, scope: CancelScope) -> Result<(), EchoError> {
        let (recipient, reply) = self.build_reply(&message)?;

        internal!(
            "Reply to {recipient} composed ({} bytes, signed: {})",
            reply.len(),
            self.signer.is_some()
        );

        let delivered = self.delivery.deliver(&recipient, &reply, &scope).await?;

        info!(to = %recipient, via = %delivered.host, bytes = reply.len(), "Sent echo reply");
        Ok(())
    }
}
